use rust_decimal::Decimal;
use serde::Deserialize;

/// Token usage as reported by the Messages API. `rig`'s own client
/// abstraction discards this, which is why this crate issues the HTTP call
/// directly instead of going through `rig::providers::anthropic`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_input_tokens: i64,
}

impl Usage {
    /// Dollar cost for this call given a model's per-million-token input/output
    /// rates. `input_tokens` as reported by the Messages API already excludes
    /// `cache_read_input_tokens`; cached input is billed at half the
    /// uncached rate (§6 External Interfaces: "cost = non-cached-input ×
    /// rate + cached-input × (rate/2) + output × out-rate").
    pub fn cost(&self, input_rate_per_million: Decimal, output_rate_per_million: Decimal) -> Decimal {
        let million = Decimal::new(1_000_000, 0);
        let uncached_input_cost = Decimal::from(self.input_tokens) * input_rate_per_million / million;
        let cached_input_cost = Decimal::from(self.cache_read_input_tokens) * input_rate_per_million
            / Decimal::new(2, 0)
            / million;
        let output_cost = Decimal::from(self.output_tokens) * output_rate_per_million / million;
        uncached_input_cost + cached_input_cost + output_cost
    }

    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens + self.cache_read_input_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_tokens_bill_at_half_the_input_rate() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 0,
            cache_read_input_tokens: 1_000_000,
        };
        let cost = usage.cost(Decimal::new(3, 0), Decimal::new(15, 0));
        // 1M uncached @ $3/M + 1M cached @ $1.50/M = $4.50
        assert_eq!(cost, Decimal::new(450, 2));
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}
