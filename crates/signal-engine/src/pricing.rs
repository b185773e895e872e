//! Cheapest-side baseline: weak directional evidence from the asks alone.

use common::{AgentOutput, MarketContext, Side};
use serde_json::json;

pub const AGENT_NAME: &str = "PricingBaselineAgent";

/// Asks closer than this are treated as equal.
const EQUAL_TOLERANCE: f64 = 1e-6;

/// Step function from ask gap to score. Bigger separation, stronger signal.
pub fn gap_to_score(gap: f64) -> f64 {
    if gap < 0.02 {
        0.30
    } else if gap < 0.05 {
        0.50
    } else if gap < 0.10 {
        0.65
    } else if gap < 0.20 {
        0.80
    } else {
        0.90
    }
}

pub fn evaluate(ctx: &MarketContext) -> AgentOutput {
    let (Some(yes_ask), Some(no_ask)) = (ctx.yes_ask, ctx.no_ask) else {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.0,
            "Missing yes_ask or no_ask; cannot choose a direction.",
        )
        .with_signals(json!({"yes_ask": ctx.yes_ask, "no_ask": ctx.no_ask}));
    };

    let gap = (yes_ask - no_ask).abs();
    if gap < EQUAL_TOLERANCE {
        return AgentOutput::abstain(
            AGENT_NAME,
            0.2,
            "YES and NO asks are equal; no clear price-based direction.",
        )
        .with_signals(json!({"yes_ask": yes_ask, "no_ask": no_ask, "gap": gap}));
    }

    let (side, cheaper, dearer) = if yes_ask < no_ask {
        (Side::Yes, yes_ask, no_ask)
    } else {
        (Side::No, no_ask, yes_ask)
    };

    AgentOutput::buy(
        AGENT_NAME,
        side,
        gap_to_score(gap),
        format!(
            "{} is cheaper to buy (ask {:.2} vs {:.2}); price gap={:.2}.",
            side, cheaper, dearer, gap
        ),
    )
    .with_signals(json!({
        "yes_ask": yes_ask,
        "no_ask": no_ask,
        "gap": gap,
        "cheaper_side": side,
    }))
    .with_raw(json!({"rule": "Pick the side with the lower ask price (cheaper to buy)."}))
}
