//! Token bookkeeping and cost for finalized turns.

use bridge_protocol::TokenUsage;
use exec_events::TurnUsage;

use crate::pricing::ModelInfo;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;
const CHARS_PER_TOKEN: usize = 4;

/// USD cost of a turn from net input and output tokens.
pub fn compute_cost(model: &ModelInfo, net_input_tokens: u64, output_tokens: u64) -> f64 {
    (net_input_tokens as f64 / TOKENS_PER_MILLION) * model.input_price
        + (output_tokens as f64 / TOKENS_PER_MILLION) * model.output_price
}

/// Rough token count of what the user literally typed.
///
/// Returns `None` for blank input so the display falls back to net input.
pub fn estimate_typed_tokens(text: &str) -> Option<u64> {
    if text.trim().is_empty() {
        return None;
    }

    let estimate = text.chars().count() / CHARS_PER_TOKEN;
    Some(estimate.max(1) as u64)
}

/// Builds the persisted token bundle. A typed estimate overrides the display count.
pub fn token_usage(usage: &TurnUsage, typed_input_tokens: Option<u64>) -> TokenUsage {
    let net_input_tokens = usage.net_input_tokens();

    TokenUsage {
        input_tokens: usage.input_tokens,
        cached_input_tokens: usage.cached_input_tokens,
        net_input_tokens,
        display_input_tokens: typed_input_tokens.unwrap_or(net_input_tokens),
        typed_input_tokens,
        output_tokens: usage.output_tokens,
        reasoning_tokens: usage.reasoning_tokens,
    }
}
