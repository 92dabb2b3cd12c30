//! Cost computation for provider calls
//!
//! The pricing table maps model identifiers to a USD rate per million
//! tokens, loaded once from configuration at startup and shared read-only
//! across all task executions. A model referenced by any routing rule but
//! absent here is rejected during config validation, so lookups at request
//! time only fail on programmer error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::router::ModelId;

/// Immutable model -> USD-per-million-tokens table
#[derive(Debug, Clone)]
pub struct PricingTable {
    rates: Arc<HashMap<ModelId, f64>>,
}

impl PricingTable {
    /// Build the table from validated configuration
    pub fn from_config(config: &Config) -> Self {
        let rates = config
            .pricing()
            .iter()
            .map(|(model, rate)| (ModelId::new(model.clone()), *rate))
            .collect();
        Self {
            rates: Arc::new(rates),
        }
    }

    /// Build a table directly from (model, rate) pairs
    pub fn from_rates(rates: impl IntoIterator<Item = (ModelId, f64)>) -> Self {
        Self {
            rates: Arc::new(rates.into_iter().collect()),
        }
    }

    /// Compute the cost of one call in USD
    ///
    /// `cost = (total_tokens / 1_000_000) * rate`. Returns `None` if the
    /// model has no configured rate.
    pub fn cost(&self, model: &ModelId, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        self.rates.get(model).map(|rate| {
            let total_tokens = f64::from(input_tokens) + f64::from(output_tokens);
            (total_tokens / 1_000_000.0) * rate
        })
    }

    /// Check if a model has a configured rate
    pub fn has_rate(&self, model: &ModelId) -> bool {
        self.rates.contains_key(model)
    }

    /// Get the raw per-million-tokens rate for a model
    pub fn rate(&self, model: &ModelId) -> Option<f64> {
        self.rates.get(model).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table() -> PricingTable {
        PricingTable::from_rates([
            (ModelId::from("deepseek-v3"), 0.9),
            (ModelId::from("claude-opus-4"), 45.0),
            (ModelId::from("free-local"), 0.0),
        ])
    }

    #[test]
    fn test_cost_per_million_tokens() {
        let pricing = test_table();

        // 1M total tokens at $0.9/M = $0.9
        let cost = pricing.cost(&ModelId::from("deepseek-v3"), 600_000, 400_000);
        assert_eq!(cost, Some(0.9));

        // 2000 total tokens at $45/M = $0.09
        let cost = pricing.cost(&ModelId::from("claude-opus-4"), 1_500, 500);
        assert_eq!(cost, Some(0.09));
    }

    #[test]
    fn test_zero_rate_model_costs_nothing() {
        let pricing = test_table();
        let cost = pricing.cost(&ModelId::from("free-local"), 10_000, 10_000);
        assert_eq!(cost, Some(0.0));
    }

    #[test]
    fn test_unknown_model_has_no_cost() {
        let pricing = test_table();
        assert_eq!(pricing.cost(&ModelId::from("unknown-model"), 1000, 500), None);
        assert!(!pricing.has_rate(&ModelId::from("unknown-model")));
    }

    #[test]
    fn test_cost_is_non_negative() {
        let pricing = test_table();
        for (input, output) in [(0, 0), (1, 0), (0, 1), (123_456, 654_321)] {
            let cost = pricing
                .cost(&ModelId::from("claude-opus-4"), input, output)
                .expect("rate exists");
            assert!(cost >= 0.0, "cost must never be negative, got {}", cost);
        }
    }

    #[test]
    fn test_rate_lookup() {
        let pricing = test_table();
        assert_eq!(pricing.rate(&ModelId::from("deepseek-v3")), Some(0.9));
        assert_eq!(pricing.rate(&ModelId::from("missing")), None);
    }
}
