//! Append-only audit trail of evaluations.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use common::{Action, Recommendation, Side};
use serde::Serialize;
use uuid::Uuid;

use crate::config::JournalConfig;

/// `ADVISOR_JOURNAL_DIR` when set, otherwise `[journal].dir`.
pub fn resolve_journal_dir(config: &JournalConfig) -> PathBuf {
    if let Ok(raw) = std::env::var("ADVISOR_JOURNAL_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(&config.dir)
}

/// One line of the journal. Serialized with a `kind` tag.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEvent<'a> {
    EvaluationStart {
        evaluation_id: Uuid,
        ticker: &'a str,
        candles: usize,
        offline: bool,
    },
    /// Full agent outputs, `raw` included.
    Recommendation {
        evaluation_id: Uuid,
        ticker: &'a str,
        action: Action,
        direction: Option<Side>,
        confidence: f64,
        recommendation: &'a Recommendation,
    },
}

impl<'a> JournalEvent<'a> {
    pub fn recommendation(evaluation_id: Uuid, ticker: &'a str, rec: &'a Recommendation) -> Self {
        JournalEvent::Recommendation {
            evaluation_id,
            ticker,
            action: rec.action(),
            direction: rec.direction(),
            confidence: rec.confidence(),
            recommendation: rec,
        }
    }
}

#[derive(Serialize)]
struct Line<'e, 'a> {
    ts: String,
    #[serde(flatten)]
    event: &'e JournalEvent<'a>,
}

/// JSONL file per UTC day: `recommendations-YYYY-MM-DD.jsonl`.
pub struct RecommendationJournal {
    dir: PathBuf,
    day: NaiveDate,
    file: File,
}

impl RecommendationJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day = Utc::now().date_naive();
        let file = open_day_file(&dir, day)?;
        Ok(Self { dir, day, file })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Failures are logged and otherwise ignored.
    pub fn record(&mut self, event: &JournalEvent<'_>) {
        self.record_at(event, Utc::now());
    }

    fn record_at(&mut self, event: &JournalEvent<'_>, at: DateTime<Utc>) {
        if let Err(e) = self.append(event, at) {
            tracing::warn!("journal write failed: {}", e);
        }
    }

    fn append(&mut self, event: &JournalEvent<'_>, at: DateTime<Utc>) -> std::io::Result<()> {
        let day = at.date_naive();
        if day != self.day {
            self.file = open_day_file(&self.dir, day)?;
            self.day = day;
        }
        let line = Line {
            ts: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        serde_json::to_writer(&mut self.file, &line)?;
        self.file.write_all(b"\n")?;
        self.file.flush()
    }
}

fn day_file(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("recommendations-{}.jsonl", day.format("%Y-%m-%d")))
}

fn open_day_file(dir: &Path, day: NaiveDate) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(day_file(dir, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::AgentOutput;
    use serde_json::{json, Value};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("market-advisor-journal-{}-{}", tag, Uuid::new_v4()))
    }

    fn read_lines(path: PathBuf) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn events_append_as_tagged_json_lines() {
        let dir = temp_dir("append");
        let mut journal = RecommendationJournal::open(dir.clone()).unwrap();
        let id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2026, 3, 16, 12, 0, 0).unwrap();

        let agents = vec![AgentOutput::buy("PricingBaselineAgent", Side::Yes, 0.9, "cheap")
            .with_raw(json!({"gap": 0.22}))];
        let rec = Recommendation::buy(Side::Yes, 0.6, "Looks good.", agents);

        journal.record_at(
            &JournalEvent::EvaluationStart {
                evaluation_id: id,
                ticker: "KXTEST-1",
                candles: 0,
                offline: true,
            },
            at,
        );
        journal.record_at(&JournalEvent::recommendation(id, "KXTEST-1", &rec), at);

        let lines = read_lines(day_file(&dir, at.date_naive()));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "evaluation_start");
        assert_eq!(lines[0]["ts"], "2026-03-16T12:00:00.000Z");
        assert_eq!(lines[0]["offline"], true);
        assert_eq!(lines[1]["kind"], "recommendation");
        assert_eq!(lines[1]["evaluation_id"], lines[0]["evaluation_id"]);
        assert_eq!(lines[1]["action"], "BUY");
        assert_eq!(lines[1]["direction"], "YES");
        assert_eq!(lines[1]["recommendation"]["agents"][0]["raw"]["gap"], 0.22);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn crossing_midnight_starts_a_new_file() {
        let dir = temp_dir("rotate");
        let mut journal = RecommendationJournal::open(dir.clone()).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 16, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 17, 0, 0, 1).unwrap();
        let rec = Recommendation::no_trade(0.0, "Stale quote.", Vec::new());

        journal.record_at(&JournalEvent::recommendation(Uuid::new_v4(), "A", &rec), before);
        journal.record_at(&JournalEvent::recommendation(Uuid::new_v4(), "B", &rec), after);

        let first = read_lines(day_file(&dir, before.date_naive()));
        let second = read_lines(day_file(&dir, after.date_naive()));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0]["ticker"], "A");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["ticker"], "B");
        assert_eq!(second[0]["action"], "NO_TRADE");
        assert_eq!(second[0]["direction"], Value::Null);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn config_dir_used_without_override() {
        if std::env::var("ADVISOR_JOURNAL_DIR").is_ok() {
            return;
        }
        let cfg = JournalConfig {
            enabled: true,
            dir: "audit/out".into(),
        };
        assert_eq!(resolve_journal_dir(&cfg), PathBuf::from("audit/out"));
    }
}
