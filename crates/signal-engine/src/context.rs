//! Raw market record → [`MarketContext`].
//!
//! Pure conversion. Any field that is absent, mistyped or out of range comes out
//! as `None`; nothing here fails the whole record.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::{MarketContext, RawMarket};
use serde_json::Value;

/// Normalize `raw` against the current wall clock.
pub fn build_market_context(raw: &RawMarket) -> MarketContext {
    build_market_context_at(raw, Utc::now())
}

/// Normalize `raw` as seen at `now`. Time-derived fields are relative to `now`.
pub fn build_market_context_at(raw: &RawMarket, now: DateTime<Utc>) -> MarketContext {
    let yes_ask = price(raw, "yes_ask");
    let yes_bid = price(raw, "yes_bid");
    let no_ask = price(raw, "no_ask");
    let no_bid = price(raw, "no_bid");

    let close_time = text(raw, "close_time");
    let updated_time = text(raw, "updated_time");

    let time_to_close_h = close_time
        .as_deref()
        .and_then(parse_timestamp)
        .map(|close| (close - now).num_milliseconds() as f64 / 3_600_000.0);

    let quote_age_s = updated_time
        .as_deref()
        .and_then(parse_timestamp)
        .map(|updated| ((now - updated).num_milliseconds() as f64 / 1000.0).max(0.0));

    MarketContext {
        ticker: text(raw, "ticker"),
        event_ticker: text(raw, "event_ticker"),
        title: text(raw, "title"),
        subtitle: text(raw, "subtitle"),
        status: text(raw, "status"),
        market_type: text(raw, "market_type"),

        rules_primary: text(raw, "rules_primary"),
        rules_secondary: text(raw, "rules_secondary"),
        yes_label: text(raw, "yes_sub_title"),
        no_label: text(raw, "no_sub_title"),
        strike_type: text(raw, "strike_type"),
        custom_strike: raw
            .get("custom_strike")
            .filter(|v| !v.is_null())
            .cloned(),

        yes_ask,
        yes_bid,
        no_ask,
        no_bid,
        last_price: price(raw, "last_price"),

        yes_spread: spread(yes_ask, yes_bid),
        no_spread: spread(no_ask, no_bid),

        volume: count(raw, "volume"),
        volume_24h: count(raw, "volume_24h"),
        open_interest: count(raw, "open_interest"),
        liquidity_dollars: liquidity(raw),

        close_time,
        updated_time,
        time_to_close_h,
        quote_age_s,
    }
}

/// Parse an ISO-8601 timestamp as Kalshi emits it.
///
/// Fractional seconds of any length are padded or cut to 6 digits and a `Z`
/// suffix is rewritten to `+00:00` before parsing. Timestamps with no offset are
/// read as UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let normalized = normalize_timestamp(ts.trim())?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn normalize_timestamp(ts: &str) -> Option<String> {
    if ts.is_empty() {
        return None;
    }

    let ts = match ts.strip_suffix('Z').or_else(|| ts.strip_suffix('z')) {
        Some(head) => format!("{}+00:00", head),
        None => ts.to_string(),
    };

    // Only a dot after the time separator starts a fraction.
    let time_start = ts.find('T').or_else(|| ts.find(' '))?;
    let Some(dot) = ts[time_start..].find('.').map(|i| i + time_start) else {
        return Some(ts);
    };

    let head = &ts[..dot];
    let tail = &ts[dot + 1..];
    let frac_len = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());
    let (frac, offset) = tail.split_at(frac_len);

    let mut digits: String = frac.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }

    Some(format!("{}.{}{}", head, digits, offset))
}

fn text(raw: &RawMarket, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

/// Integer cents → probability, falling back to the `<key>_dollars` field.
fn price(raw: &RawMarket, key: &str) -> Option<f64> {
    let cents = raw.get(key).and_then(Value::as_f64).map(|c| c / 100.0);
    let dollars = || raw.get(&format!("{}_dollars", key)).and_then(number);

    cents
        .or_else(dollars)
        .filter(|p| (0.0..=1.0).contains(p))
}

fn spread(ask: Option<f64>, bid: Option<f64>) -> Option<f64> {
    match (ask, bid) {
        (Some(ask), Some(bid)) => Some(ask - bid),
        _ => None,
    }
}

fn count(raw: &RawMarket, key: &str) -> Option<i64> {
    let v = raw.get(key)?;
    v.as_i64()
        .or_else(|| number(v).filter(|x| x.fract() == 0.0).map(|x| x as i64))
}

fn liquidity(raw: &RawMarket) -> Option<f64> {
    raw.get("liquidity_dollars")
        .and_then(number)
        .or_else(|| raw.get("liquidity").and_then(number).map(|c| c / 100.0))
        .filter(|x| *x >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawMarket {
        serde_json::from_value(value).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, h, m, s).unwrap()
    }

    #[test]
    fn parses_all_timestamp_variants() {
        let base = at(21, 4, 39);
        let cases = [
            ("2026-02-15T21:04:39Z", 0),
            ("2026-02-15T21:04:39+00:00", 0),
            ("2026-02-15T21:04:39.299Z", 299_000),
            ("2026-02-15T21:04:39.29951+00:00", 299_510),
            ("2026-02-15T21:04:39.299510Z", 299_510),
            ("2026-02-15T21:04:39.2995101234Z", 299_510),
        ];
        for (input, micros) in cases {
            let parsed = parse_timestamp(input).unwrap_or_else(|| panic!("failed: {input}"));
            assert_eq!(
                parsed,
                base + chrono::Duration::microseconds(micros),
                "input {input}"
            );
        }
    }

    #[test]
    fn parses_explicit_non_utc_offset() {
        let parsed = parse_timestamp("2026-02-15T16:04:39.5-05:00").unwrap();
        assert_eq!(parsed, at(21, 4, 39) + chrono::Duration::milliseconds(500));
    }

    #[test]
    fn naive_timestamp_is_utc() {
        assert_eq!(parse_timestamp("2026-02-15T21:04:39"), Some(at(21, 4, 39)));
    }

    #[test]
    fn garbage_timestamps_are_none() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("tomorrow"), None);
        assert_eq!(parse_timestamp("2026-13-45T99:00:00Z"), None);
    }

    #[test]
    fn converts_cents_and_derives_spreads() {
        let ctx = build_market_context_at(
            &raw(json!({
                "ticker": "KXTEST-1",
                "yes_ask": 56, "yes_bid": 52,
                "no_ask": 48, "no_bid": 44,
                "last_price": 54,
                "volume_24h": 120, "open_interest": 900,
                "liquidity": 250000
            })),
            at(12, 0, 0),
        );
        assert_eq!(ctx.yes_ask, Some(0.56));
        assert_eq!(ctx.no_bid, Some(0.44));
        assert!((ctx.yes_spread.unwrap() - 0.04).abs() < 1e-9);
        assert!((ctx.no_spread.unwrap() - 0.04).abs() < 1e-9);
        assert_eq!(ctx.volume_24h, Some(120));
        assert_eq!(ctx.liquidity_dollars, Some(2500.0));
    }

    #[test]
    fn spread_missing_when_either_side_missing() {
        let ctx = build_market_context_at(&raw(json!({"yes_ask": 40})), at(0, 0, 0));
        assert_eq!(ctx.yes_spread, None);
        assert_eq!(ctx.no_spread, None);
    }

    #[test]
    fn dollar_fields_fill_missing_cents() {
        let ctx = build_market_context_at(
            &raw(json!({"yes_ask_dollars": "0.3100", "liquidity_dollars": "1520.50"})),
            at(0, 0, 0),
        );
        assert_eq!(ctx.yes_ask, Some(0.31));
        assert_eq!(ctx.liquidity_dollars, Some(1520.5));
    }

    #[test]
    fn prices_stay_in_probability_range() {
        let ctx = build_market_context_at(
            &raw(json!({
                "yes_ask": 150, "yes_bid": -3, "no_ask": "cheap", "no_bid": 0, "last_price": 100
            })),
            at(0, 0, 0),
        );
        for p in [ctx.yes_ask, ctx.yes_bid, ctx.no_ask, ctx.no_bid, ctx.last_price] {
            assert!(p.map_or(true, |v| (0.0..=1.0).contains(&v)));
        }
        assert_eq!(ctx.yes_ask, None);
        assert_eq!(ctx.no_ask, None);
        assert_eq!(ctx.no_bid, Some(0.0));
        assert_eq!(ctx.last_price, Some(1.0));
    }

    #[test]
    fn timing_is_relative_to_now() {
        let ctx = build_market_context_at(
            &raw(json!({
                "close_time": "2026-02-16T00:00:00Z",
                "updated_time": "2026-02-15T11:50:00.123Z"
            })),
            at(12, 0, 0),
        );
        assert_eq!(ctx.time_to_close_h, Some(12.0));
        assert!((ctx.quote_age_s.unwrap() - 599.877).abs() < 1e-6);

        let closed = build_market_context_at(
            &raw(json!({"close_time": "2026-02-15T06:00:00Z"})),
            at(12, 0, 0),
        );
        assert_eq!(closed.time_to_close_h, Some(-6.0));
    }

    #[test]
    fn unparsable_close_time_keeps_text_but_no_hours() {
        let ctx = build_market_context_at(&raw(json!({"close_time": "soon"})), at(0, 0, 0));
        assert_eq!(ctx.close_time.as_deref(), Some("soon"));
        assert_eq!(ctx.time_to_close_h, None);
    }

    #[test]
    fn empty_record_is_all_none() {
        let ctx = build_market_context_at(&RawMarket::new(), at(0, 0, 0));
        assert_eq!(ctx, MarketContext::default());
    }

    #[test]
    fn labels_come_from_sub_titles() {
        let ctx = build_market_context_at(
            &raw(json!({"yes_sub_title": "Duke", "no_sub_title": "Not Duke", "custom_strike": null})),
            at(0, 0, 0),
        );
        assert_eq!(ctx.yes_label.as_deref(), Some("Duke"));
        assert_eq!(ctx.no_label.as_deref(), Some("Not Duke"));
        assert_eq!(ctx.custom_strike, None);
    }
}
