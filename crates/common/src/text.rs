//! Length bounds for strings that leave the process (reasons, explanations, prompts).

/// Longest `reason` an evaluator may attach to its output.
pub const MAX_REASON_CHARS: usize = 500;

/// Longest final explanation carried by a recommendation.
pub const MAX_EXPLANATION_CHARS: usize = 280;

/// Trim and cut `s` to at most `max_chars` characters, marking the cut with `…`.
pub fn shorten(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let cut: String = s.chars().take(max_chars - 1).collect();
    format!("{}…", cut.trim_end())
}

/// Join non-empty reasons with the pipe separator used across agent explanations.
pub fn join_reasons<'a>(reasons: impl IntoIterator<Item = &'a str>) -> String {
    reasons
        .into_iter()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
