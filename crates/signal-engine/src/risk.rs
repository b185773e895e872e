//! Execution-quality gate.
//!
//! Five independent checks each produce a sub-score in [0,1] (1 = healthy,
//! 0 = veto). The combined score is the minimum. The gate never picks a side:
//! it either vetoes (`NO_TRADE`) or abstains.

use common::text::join_reasons;
use common::{AgentOutput, MarketContext};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const AGENT_NAME: &str = "RiskAgent";

/// Sub-score used when the inputs for a check are missing.
const MISSING_DATA_SCORE: f64 = 0.7;
/// Cap applied by soft failures (one-sided inactivity, thin liquidity).
const SOFT_FAIL_SCORE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Worst-side spread (probability units) where caution starts.
    pub spread_warn: f64,
    pub spread_veto: f64,
    pub min_volume_24h: i64,
    pub min_open_interest: i64,
    pub min_liquidity_dollars: f64,
    pub quote_age_warn_s: f64,
    pub quote_age_veto_s: f64,
    /// `yes_ask + no_ask` above this means the book is broken.
    pub ask_sum_veto: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            spread_warn: 0.05,
            spread_veto: 0.10,
            min_volume_24h: 1,
            min_open_interest: 1,
            min_liquidity_dollars: 1000.0,
            quote_age_warn_s: 600.0,
            quote_age_veto_s: 1800.0,
            ask_sum_veto: 1.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    WideSpreadVeto,
    WideSpreadWarn,
    InactiveMarket,
    LowLiquidity,
    StaleQuoteVeto,
    StaleQuoteWarn,
    PricingSanityFailed,
}

/// One check's verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub score: f64,
    pub reasons: Vec<String>,
}

impl Check {
    fn new(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            reasons: vec![reason.into()],
        }
    }
}

/// Map a value in the warn..veto zone linearly onto 0.6..0.1.
fn warn_zone_score(value: f64, warn: f64, veto: f64) -> f64 {
    let span = veto - warn;
    let frac = if span > 0.0 { (value - warn) / span } else { 1.0 };
    (0.6 - 0.5 * frac).max(0.1)
}

pub fn check_pricing_sanity(ctx: &MarketContext, cfg: &RiskConfig) -> Check {
    let (Some(yes_ask), Some(no_ask)) = (ctx.yes_ask, ctx.no_ask) else {
        return Check::new(MISSING_DATA_SCORE, "Ask prices missing (yes_ask/no_ask).");
    };

    let ask_sum = yes_ask + no_ask;
    if ask_sum > cfg.ask_sum_veto {
        return Check::new(
            0.0,
            format!(
                "Pricing sanity failed (yes_ask+no_ask={:.2} > {:.2}).",
                ask_sum, cfg.ask_sum_veto
            ),
        );
    }
    Check::new(1.0, format!("Pricing sanity ok (yes_ask+no_ask={:.2}).", ask_sum))
}

pub fn check_spreads(ctx: &MarketContext, cfg: &RiskConfig) -> Check {
    let (Some(yes_spread), Some(no_spread)) = (ctx.yes_spread, ctx.no_spread) else {
        return Check::new(MISSING_DATA_SCORE, "Spread data missing.");
    };

    let worst = yes_spread.max(no_spread);
    if worst >= cfg.spread_veto {
        return Check::new(0.0, format!("Spreads are very wide (worst_spread={:.2}).", worst));
    }
    if worst >= cfg.spread_warn {
        return Check::new(
            warn_zone_score(worst, cfg.spread_warn, cfg.spread_veto),
            format!("Spreads are somewhat wide (worst_spread={:.2}).", worst),
        );
    }
    Check::new(1.0, format!("Spreads are tight (worst_spread={:.2}).", worst))
}

pub fn check_activity(ctx: &MarketContext, cfg: &RiskConfig) -> Check {
    let (Some(vol_24h), Some(oi)) = (ctx.volume_24h, ctx.open_interest) else {
        return Check::new(
            MISSING_DATA_SCORE,
            "Activity data missing (volume_24h/open_interest).",
        );
    };

    let thin_volume = vol_24h < cfg.min_volume_24h;
    let no_positions = oi < cfg.min_open_interest;

    if thin_volume && no_positions {
        return Check::new(0.0, "Zero recent volume and zero open interest (inactive market).");
    }

    let mut check = Check {
        score: 1.0,
        reasons: Vec::new(),
    };
    if thin_volume {
        check.reasons.push("Zero 24h volume (thin trading).".into());
        check.score = SOFT_FAIL_SCORE;
    }
    if no_positions {
        check.reasons.push("Zero open interest (no positions exist).".into());
        check.score = SOFT_FAIL_SCORE;
    }
    if check.reasons.is_empty() {
        check
            .reasons
            .push("Market shows recent activity (volume/open interest).".into());
    }
    check
}

pub fn check_liquidity(ctx: &MarketContext, cfg: &RiskConfig) -> Check {
    match ctx.liquidity_dollars {
        None => Check::new(MISSING_DATA_SCORE, "Liquidity data missing."),
        Some(liq) if liq < cfg.min_liquidity_dollars => {
            Check::new(SOFT_FAIL_SCORE, format!("Low liquidity (${:.2}).", liq))
        }
        Some(liq) => Check::new(1.0, format!("Liquidity looks ok (${:.2}).", liq)),
    }
}

pub fn check_staleness(ctx: &MarketContext, cfg: &RiskConfig) -> Check {
    let Some(age) = ctx.quote_age_s else {
        return Check::new(MISSING_DATA_SCORE, "Quote age missing.");
    };

    if age >= cfg.quote_age_veto_s {
        return Check::new(0.0, format!("Quotes are stale (quote_age_s={:.0}s).", age));
    }
    if age >= cfg.quote_age_warn_s {
        return Check::new(
            warn_zone_score(age, cfg.quote_age_warn_s, cfg.quote_age_veto_s),
            format!("Quotes somewhat old (quote_age_s={:.0}s).", age),
        );
    }
    Check::new(1.0, format!("Quotes are fresh (quote_age_s={:.0}s).", age))
}

pub fn collect_flags(ctx: &MarketContext, cfg: &RiskConfig) -> Vec<RiskFlag> {
    let mut flags = Vec::new();

    if let (Some(y), Some(n)) = (ctx.yes_spread, ctx.no_spread) {
        let worst = y.max(n);
        if worst >= cfg.spread_veto {
            flags.push(RiskFlag::WideSpreadVeto);
        } else if worst >= cfg.spread_warn {
            flags.push(RiskFlag::WideSpreadWarn);
        }
    }

    if let (Some(vol), Some(oi)) = (ctx.volume_24h, ctx.open_interest) {
        if vol < cfg.min_volume_24h && oi < cfg.min_open_interest {
            flags.push(RiskFlag::InactiveMarket);
        }
    }

    if ctx.liquidity_dollars.is_some_and(|liq| liq < cfg.min_liquidity_dollars) {
        flags.push(RiskFlag::LowLiquidity);
    }

    if let Some(age) = ctx.quote_age_s {
        if age >= cfg.quote_age_veto_s {
            flags.push(RiskFlag::StaleQuoteVeto);
        } else if age >= cfg.quote_age_warn_s {
            flags.push(RiskFlag::StaleQuoteWarn);
        }
    }

    if let (Some(y), Some(n)) = (ctx.yes_ask, ctx.no_ask) {
        if y + n > cfg.ask_sum_veto {
            flags.push(RiskFlag::PricingSanityFailed);
        }
    }

    flags
}

fn is_key_reason(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    ["failed", "very wide", "zero", "stale"]
        .iter()
        .any(|kw| lower.contains(kw))
}

/// Run every check and combine them weakest-link.
pub fn evaluate(ctx: &MarketContext, cfg: &RiskConfig) -> AgentOutput {
    let sanity = check_pricing_sanity(ctx, cfg);
    let spread = check_spreads(ctx, cfg);
    let activity = check_activity(ctx, cfg);
    let liquidity = check_liquidity(ctx, cfg);
    let staleness = check_staleness(ctx, cfg);

    let score = [&sanity, &spread, &activity, &liquidity, &staleness]
        .iter()
        .map(|c| c.score)
        .fold(1.0_f64, f64::min);
    let veto = score <= 0.0;

    // Severity order for the summary: sanity, spread, activity, liquidity, staleness.
    let all_reasons: Vec<&str> = [&sanity, &spread, &activity, &liquidity, &staleness]
        .iter()
        .flat_map(|c| c.reasons.iter().map(String::as_str))
        .collect();
    let mut key: Vec<&str> = all_reasons
        .iter()
        .copied()
        .filter(|r| is_key_reason(r))
        .collect();
    if key.is_empty() {
        key = all_reasons.iter().copied().take(2).collect();
    }
    let mut reason = join_reasons(key.into_iter().take(2));
    if reason.is_empty() {
        reason = if veto {
            "Execution risk too high.".into()
        } else {
            "Market quality looks acceptable.".into()
        };
    }

    let signals = json!({
        "pricing_sanity_score": sanity.score,
        "spread_score": spread.score,
        "activity_score": activity.score,
        "liquidity_score": liquidity.score,
        "staleness_score": staleness.score,
        "thresholds": cfg,
        "observed": {
            "yes_spread": ctx.yes_spread,
            "no_spread": ctx.no_spread,
            "volume_24h": ctx.volume_24h,
            "open_interest": ctx.open_interest,
            "liquidity_dollars": ctx.liquidity_dollars,
            "quote_age_s": ctx.quote_age_s,
            "yes_ask": ctx.yes_ask,
            "no_ask": ctx.no_ask,
        },
        "flags": collect_flags(ctx, cfg),
    });
    let raw = json!({
        "checks": {
            "pricing_sanity": sanity,
            "spread": spread,
            "activity": activity,
            "liquidity": liquidity,
            "staleness": staleness,
        }
    });

    let out = if veto {
        AgentOutput::no_trade(AGENT_NAME, score, reason)
    } else {
        AgentOutput::abstain(AGENT_NAME, score, reason)
    };
    out.with_signals(signals).with_raw(raw)
}
