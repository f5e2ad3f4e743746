use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::decline::DeclineCatalog;
use crate::processor::{ProcessorAdapter, ProcessorResult};

/// Deterministic stand-in for a payment processor. Success probability comes
/// from the strategy's calibrated per-attempt rates; a fixed seed replays
/// the same outcome sequence. The PRNG sits behind its own mutex so
/// concurrent calls draw a linearizable sequence from one seed.
pub struct ProcessorSimulator {
    catalog: Arc<DeclineCatalog>,
    rng: Mutex<StdRng>,
}

impl ProcessorSimulator {
    pub fn new(catalog: Arc<DeclineCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ProcessorAdapter for ProcessorSimulator {
    async fn process(
        &self,
        decline_code: &str,
        attempt_number: u32,
        processor: &str,
    ) -> ProcessorResult {
        let success_rate = match self.catalog.strategy(decline_code) {
            Some(strategy) if !strategy.per_attempt_rates.is_empty() => {
                let idx = (attempt_number as usize)
                    .saturating_sub(1)
                    .min(strategy.per_attempt_rates.len() - 1);
                strategy.per_attempt_rates[idx]
            }
            _ => {
                return ProcessorResult {
                    success: false,
                    response_code: "HARD_DECLINE".to_string(),
                    response_message: "Transaction not retryable".to_string(),
                }
            }
        };

        let roll = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen::<f64>()
        };

        if roll < success_rate {
            ProcessorResult {
                success: true,
                response_code: "APPROVED".to_string(),
                response_message: format!(
                    "Transaction approved by {processor} on attempt {attempt_number}"
                ),
            }
        } else {
            ProcessorResult {
                success: false,
                response_code: format!("DECLINE_{decline_code}"),
                response_message: format!(
                    "Retry attempt {attempt_number} failed via {processor}: {decline_code} persists"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(seed: u64) -> ProcessorSimulator {
        ProcessorSimulator::new(Arc::new(DeclineCatalog::with_defaults()), seed)
    }

    #[tokio::test]
    async fn unknown_code_is_hard_decline() {
        let sim = simulator(42);
        let result = sim.process("mystery_code", 1, "stripe_latam").await;
        assert!(!result.success);
        assert_eq!(result.response_code, "HARD_DECLINE");
    }

    #[tokio::test]
    async fn same_seed_replays_same_outcomes() {
        let a = simulator(42);
        let b = simulator(42);
        for attempt in 1..=3 {
            let ra = a.process("issuer_timeout", attempt, "stripe_latam").await;
            let rb = b.process("issuer_timeout", attempt, "stripe_latam").await;
            assert_eq!(ra.success, rb.success, "attempt {attempt}");
            assert_eq!(ra.response_code, rb.response_code, "attempt {attempt}");
        }
    }

    #[tokio::test]
    async fn certain_rate_always_succeeds() {
        let mut catalog = DeclineCatalog::with_defaults();
        catalog.mutate_strategy("issuer_timeout").per_attempt_rates = vec![1.0];
        let sim = ProcessorSimulator::new(Arc::new(catalog), 7);

        for attempt in 1..=5 {
            let result = sim.process("issuer_timeout", attempt, "adyen_apac").await;
            assert!(result.success);
            assert_eq!(result.response_code, "APPROVED");
        }
    }

    #[tokio::test]
    async fn zero_rate_always_declines() {
        let mut catalog = DeclineCatalog::with_defaults();
        catalog.mutate_strategy("issuer_timeout").per_attempt_rates = vec![0.0];
        let sim = ProcessorSimulator::new(Arc::new(catalog), 7);

        let result = sim.process("issuer_timeout", 1, "adyen_apac").await;
        assert!(!result.success);
        assert_eq!(result.response_code, "DECLINE_issuer_timeout");
    }

    #[tokio::test]
    async fn attempt_past_rate_table_uses_last_rate() {
        let mut catalog = DeclineCatalog::with_defaults();
        catalog.mutate_strategy("issuer_timeout").per_attempt_rates = vec![0.0, 1.0];
        let sim = ProcessorSimulator::new(Arc::new(catalog), 7);

        let result = sim.process("issuer_timeout", 9, "adyen_apac").await;
        assert!(result.success);
    }
}
