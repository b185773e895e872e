//! Candlestick momentum evaluator.
//!
//! Directional only when long momentum and the moving-average gap agree and
//! both clear their strength floors.

use common::text::join_reasons;
use common::{AgentOutput, Candle, MarketContext, Side};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const AGENT_NAME: &str = "TrendCandlesAgent";

/// Long momentum of this size counts as a full-strength move.
const STRONG_MOMENTUM: f64 = 0.10;
/// MA gap of this size (probability units) counts as a full-strength trend.
const STRONG_MA_GAP: f64 = 0.05;

const BASE_SCORE: f64 = 0.55;
const STRENGTH_WEIGHT: f64 = 0.35;
const VOLUME_BONUS: f64 = 0.05;
const VOLATILITY_PENALTY: f64 = 0.07;

/// Window sizes are counted in candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_candles: usize,
    pub mom_short_n: usize,
    pub mom_long_n: usize,
    pub ma_short_n: usize,
    pub ma_long_n: usize,
    /// Minimum |long momentum| (fractional return) to call a trend.
    pub mom_long_min_abs: f64,
    /// Minimum |MA gap| in probability units.
    pub trend_min_abs: f64,
    pub vol_confirm_ratio: f64,
    pub volatility_window: usize,
    /// Std of single-step returns above which the series is noisy.
    pub volatility_warn: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_candles: 48,
            mom_short_n: 24,
            mom_long_n: 72,
            ma_short_n: 12,
            ma_long_n: 48,
            mom_long_min_abs: 0.02,
            trend_min_abs: 0.01,
            vol_confirm_ratio: 1.20,
            volatility_window: 48,
            volatility_warn: 0.03,
        }
    }
}

/// Candles with a close, split into parallel columns.
struct Series {
    end_ts: Vec<i64>,
    closes: Vec<f64>,
    volumes: Vec<i64>,
    open_interest: Vec<i64>,
}

impl Series {
    fn from_candles(candles: &[Candle]) -> Self {
        let mut series = Series {
            end_ts: Vec::with_capacity(candles.len()),
            closes: Vec::with_capacity(candles.len()),
            volumes: Vec::with_capacity(candles.len()),
            open_interest: Vec::with_capacity(candles.len()),
        };
        for c in candles {
            let Some(close) = c.close.filter(|x| x.is_finite()) else {
                continue;
            };
            series.end_ts.push(c.end_ts);
            series.closes.push(close);
            series.volumes.push(c.volume);
            series.open_interest.push(c.open_interest);
        }
        series
    }
}

fn pct_return(a: f64, b: f64) -> Option<f64> {
    (b != 0.0).then(|| a / b - 1.0)
}

fn mean(xs: &[f64]) -> Option<f64> {
    (!xs.is_empty()).then(|| xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation.
fn std_dev(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// Fractional return of the last close over the close `n` candles earlier.
pub fn momentum(closes: &[f64], n: usize) -> Option<f64> {
    if closes.len() <= n {
        return None;
    }
    let last = closes[closes.len() - 1];
    pct_return(last, closes[closes.len() - 1 - n])
}

/// Short moving average minus long moving average over the most recent closes.
pub fn ma_gap(closes: &[f64], short_n: usize, long_n: usize) -> Option<f64> {
    if short_n == 0 || long_n == 0 || closes.len() < short_n.max(long_n) {
        return None;
    }
    let short = mean(&closes[closes.len() - short_n..])?;
    let long = mean(&closes[closes.len() - long_n..])?;
    Some(short - long)
}

/// Volume of the latest window over the window before it.
pub fn volume_ratio(volumes: &[i64], window: usize) -> Option<f64> {
    if window == 0 || volumes.len() < 2 * window {
        return None;
    }
    let n = volumes.len();
    let last: i64 = volumes[n - window..].iter().sum();
    let prev: i64 = volumes[n - 2 * window..n - window].iter().sum();
    (prev > 0).then(|| last as f64 / prev as f64)
}

/// Std of single-step returns over the last `window` steps.
pub fn volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let returns: Vec<f64> = (closes.len() - window..closes.len())
        .filter_map(|i| pct_return(closes[i], closes[i - 1]))
        .collect();
    std_dev(&returns)
}

pub fn evaluate(ctx: &MarketContext, candles: &[Candle], cfg: &TrendConfig) -> AgentOutput {
    if ctx.ticker_str().is_empty() {
        return AgentOutput::abstain(AGENT_NAME, 0.0, "Missing market ticker.")
            .with_signals(json!({"missing": ["ticker"]}));
    }

    if candles.is_empty() {
        return AgentOutput::abstain(AGENT_NAME, 0.3, "No candlestick data provided.")
            .with_signals(json!({"n": 0}));
    }

    let series = Series::from_candles(candles);
    let closes = &series.closes;
    let n = closes.len();

    if n < cfg.min_candles {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.4,
            format!("Insufficient candlestick history (n={}).", n),
        )
        .with_signals(json!({"n": n, "min_candles": cfg.min_candles}))
        .with_raw(json!({"candles_n_raw": candles.len()}));
    }

    let mom_short = momentum(closes, cfg.mom_short_n);
    let mom_long = momentum(closes, cfg.mom_long_n);
    let gap = ma_gap(closes, cfg.ma_short_n, cfg.ma_long_n);
    let vol_ratio = volume_ratio(&series.volumes, cfg.mom_short_n);
    let volat = volatility(closes, cfg.volatility_window);

    let (Some(mom_long), Some(gap)) = (mom_long, gap) else {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.5,
            "Not enough data to compute momentum/trend reliably.",
        )
        .with_signals(json!({"mom_long": mom_long, "ma_gap": gap, "n": n}));
    };

    let indicators = json!({
        "mom_short": mom_short,
        "mom_long": mom_long,
        "ma_gap": gap,
        "vol_ratio": vol_ratio,
        "volatility": volat,
        "n": n,
    });

    if mom_long.abs() < cfg.mom_long_min_abs || gap.abs() < cfg.trend_min_abs {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.55,
            "No strong directional trend in recent candles.",
        )
        .with_signals(indicators);
    }

    let (side, base_reason) = if mom_long > 0.0 && gap > 0.0 {
        (
            Side::Yes,
            format!("Uptrend: mom_long={:.2}%, ma_gap={:.2}.", mom_long * 100.0, gap),
        )
    } else if mom_long < 0.0 && gap < 0.0 {
        (
            Side::No,
            format!("Downtrend: mom_long={:.2}%, ma_gap={:.2}.", mom_long * 100.0, gap),
        )
    } else {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.55,
            "Signals conflict (momentum vs moving averages).",
        )
        .with_signals(indicators);
    };

    let mom_strength = (mom_long.abs() / STRONG_MOMENTUM).min(1.0);
    let gap_strength = (gap.abs() / STRONG_MA_GAP).min(1.0);
    let strength = 0.5 * mom_strength + 0.5 * gap_strength;

    let mut score = BASE_SCORE + STRENGTH_WEIGHT * strength;
    let mut reasons = vec![base_reason];

    if let Some(ratio) = vol_ratio {
        if ratio >= cfg.vol_confirm_ratio {
            score += VOLUME_BONUS;
            reasons.push(format!("Volume confirms move (vol_ratio={:.2}).", ratio));
        } else {
            reasons.push(format!(
                "Volume not strongly confirming (vol_ratio={:.2}).",
                ratio
            ));
        }
    }

    if let Some(v) = volat.filter(|v| *v >= cfg.volatility_warn) {
        score -= VOLATILITY_PENALTY;
        reasons.push(format!(
            "High volatility (std_ret={:.2}%) lowers confidence.",
            v * 100.0
        ));
    }

    let mut signals = indicators;
    signals["thresholds"] = json!(cfg);
    signals["observed"] = json!({
        "last_close": closes.last(),
        "first_close": closes.first(),
        "n_candles": n,
        "last_open_interest": series.open_interest.last(),
        "last_end_ts": series.end_ts.last(),
    });

    let tail = n.saturating_sub(5);
    AgentOutput::buy(
        AGENT_NAME,
        side,
        score.clamp(0.0, 1.0),
        join_reasons(reasons.iter().take(2).map(String::as_str)),
    )
    .with_signals(signals)
    .with_raw(json!({
        "last_5_closes": &closes[tail..],
        "last_5_volumes": &series.volumes[tail..],
    }))
}
