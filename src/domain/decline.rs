use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::transaction::{DeclineCategory, RetryPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Static delays, each an absolute offset from the submission time.
    Fixed,
    /// base_delay * multiplier^attempt, cumulated so attempts are strictly later.
    Exponential,
    /// Fixed-style candidate snapped into the configured business-hours window.
    BusinessHours,
}

/// How a specific decline code should be retried.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub decline_code: String,
    pub category: DeclineCategory,
    pub max_attempts: u32,
    pub backoff_type: BackoffType,
    pub delays: Vec<Duration>,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub business_hours_start: u32,
    pub business_hours_end: u32,
    pub per_attempt_rates: Vec<f64>,
    pub use_alt_processor: bool,
    pub description: String,
}

impl RetryStrategy {
    fn soft(code: &str) -> Self {
        Self {
            decline_code: code.to_string(),
            category: DeclineCategory::Soft,
            max_attempts: 0,
            backoff_type: BackoffType::Fixed,
            delays: Vec::new(),
            base_delay: Duration::zero(),
            backoff_multiplier: 0.0,
            business_hours_start: 0,
            business_hours_end: 0,
            per_attempt_rates: Vec::new(),
            use_alt_processor: false,
            description: String::new(),
        }
    }
}

/// Static decline knowledge: which codes are terminal, how each soft code is
/// retried, and which processors exist for failover routing. Built once at
/// startup (defaults plus any config overrides) and immutable afterwards;
/// the engine and simulator share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeclineCatalog {
    hard_codes: BTreeMap<String, String>,
    strategies: BTreeMap<String, RetryStrategy>,
    processors: Vec<String>,
}

impl DeclineCatalog {
    /// Catalog with the calibrated default strategy table. Delays and
    /// success rates match observed recovery data:
    /// insufficient_funds ~42% cumulative recovery, issuer_timeout ~68%,
    /// do_not_honor ~31%, processor_error ~60%, authentication_failed ~25%.
    pub fn with_defaults() -> Self {
        let mut hard_codes = BTreeMap::new();
        hard_codes.insert("stolen_card".to_string(), "Card has been reported as stolen".to_string());
        hard_codes.insert("fraud_suspected".to_string(), "Issuer suspects fraudulent activity".to_string());
        hard_codes.insert("invalid_card".to_string(), "Card number does not exist".to_string());
        hard_codes.insert("expired_card".to_string(), "Card is past its expiration date".to_string());

        let mut strategies = BTreeMap::new();
        strategies.insert(
            "insufficient_funds".to_string(),
            RetryStrategy {
                max_attempts: 3,
                delays: vec![Duration::hours(2), Duration::hours(24), Duration::hours(48)],
                per_attempt_rates: vec![0.12, 0.17, 0.22],
                use_alt_processor: false,
                description: "Customer may add funds; retry with increasing delays".to_string(),
                ..RetryStrategy::soft("insufficient_funds")
            },
        );
        strategies.insert(
            "issuer_timeout".to_string(),
            RetryStrategy {
                max_attempts: 3,
                delays: vec![Duration::zero(), Duration::minutes(5), Duration::minutes(30)],
                per_attempt_rates: vec![0.40, 0.30, 0.25],
                use_alt_processor: true,
                description: "Network issue; retry immediately via alternative processor".to_string(),
                ..RetryStrategy::soft("issuer_timeout")
            },
        );
        strategies.insert(
            "do_not_honor".to_string(),
            RetryStrategy {
                max_attempts: 3,
                delays: vec![Duration::hours(24), Duration::hours(48), Duration::hours(72)],
                per_attempt_rates: vec![0.12, 0.15, 0.10],
                use_alt_processor: false,
                description: "Generic decline with temporary risk flags; retry after cool-down".to_string(),
                ..RetryStrategy::soft("do_not_honor")
            },
        );
        strategies.insert(
            "processor_error".to_string(),
            RetryStrategy {
                max_attempts: 3,
                delays: vec![Duration::zero(), Duration::minutes(5), Duration::hours(1)],
                per_attempt_rates: vec![0.35, 0.25, 0.20],
                use_alt_processor: true,
                description: "Technical failure on processor side; retry via alternative processor".to_string(),
                ..RetryStrategy::soft("processor_error")
            },
        );
        strategies.insert(
            "authentication_failed".to_string(),
            RetryStrategy {
                max_attempts: 2,
                delays: vec![Duration::hours(1), Duration::hours(6)],
                per_attempt_rates: vec![0.15, 0.12],
                use_alt_processor: false,
                description: "3DS verification incomplete; retry with fresh auth window".to_string(),
                ..RetryStrategy::soft("authentication_failed")
            },
        );

        Self {
            hard_codes,
            strategies,
            processors: vec![
                "stripe_latam".to_string(),
                "adyen_apac".to_string(),
                "dlocal_br".to_string(),
                "payu_mx".to_string(),
                "mercadopago_co".to_string(),
            ],
        }
    }

    /// Classify a decline code. Unknown codes fail closed as hard declines.
    pub fn classify(&self, code: &str) -> (DeclineCategory, String) {
        if let Some(reason) = self.hard_codes.get(code) {
            return (DeclineCategory::Hard, reason.clone());
        }
        if let Some(strategy) = self.strategies.get(code) {
            return (DeclineCategory::Soft, strategy.description.clone());
        }
        (
            DeclineCategory::Hard,
            "Unknown decline code, treating as hard decline for safety".to_string(),
        )
    }

    pub fn is_hard(&self, code: &str) -> bool {
        self.hard_codes.contains_key(code)
    }

    /// Retry strategy for a decline code. None for hard or unknown codes.
    pub fn strategy(&self, code: &str) -> Option<&RetryStrategy> {
        self.strategies.get(code)
    }

    /// Processors available for failover, excluding the original, in the
    /// roster's stable order.
    pub fn alternative_processors(&self, exclude: &str) -> Vec<String> {
        self.processors.iter().filter(|p| p.as_str() != exclude).cloned().collect()
    }

    /// All known decline codes, split by category.
    pub fn codes_by_category(&self) -> (Vec<String>, Vec<String>) {
        let hard = self.hard_codes.keys().cloned().collect();
        let soft = self.strategies.keys().cloned().collect();
        (hard, soft)
    }

    pub fn mutate_strategy(&mut self, code: &str) -> &mut RetryStrategy {
        self.strategies
            .entry(code.to_string())
            .or_insert_with(|| RetryStrategy::soft(code))
    }

    /// Build the retry plan for a soft-declined transaction. Returns None
    /// for codes without a strategy (hard or unknown).
    ///
    /// Fixed delays are absolute offsets from `base_time`; exponential
    /// delays are cumulative sums. The asymmetry is deliberate and carried
    /// from the calibrated recovery schedules, so observable plans stay
    /// stable.
    pub fn build_plan(
        &self,
        decline_code: &str,
        original_processor: &str,
        base_time: DateTime<Utc>,
    ) -> Option<RetryPlan> {
        let strategy = self.strategies.get(decline_code)?;

        let scheduled_times = scheduled_times(strategy, base_time);

        let alternatives = self.alternative_processors(original_processor);
        let mut processors = Vec::with_capacity(strategy.max_attempts as usize);
        for i in 0..strategy.max_attempts as usize {
            if strategy.use_alt_processor && i > 0 && !alternatives.is_empty() {
                processors.push(alternatives[(i - 1) % alternatives.len()].clone());
            } else {
                processors.push(original_processor.to_string());
            }
        }

        Some(RetryPlan {
            max_attempts: strategy.max_attempts,
            strategy: strategy.description.clone(),
            decline_code: decline_code.to_string(),
            scheduled_times,
            processors,
        })
    }
}

fn scheduled_times(strategy: &RetryStrategy, base_time: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let attempts = strategy.max_attempts as usize;
    match strategy.backoff_type {
        BackoffType::Fixed => (0..attempts).map(|i| base_time + fixed_delay(strategy, i)).collect(),
        BackoffType::Exponential => {
            let base_ms = if strategy.base_delay > Duration::zero() {
                strategy.base_delay.num_milliseconds()
            } else {
                Duration::minutes(5).num_milliseconds()
            };
            let multiplier = if strategy.backoff_multiplier > 0.0 {
                strategy.backoff_multiplier
            } else {
                2.0
            };
            let mut cumulative_ms: i64 = 0;
            (0..attempts)
                .map(|i| {
                    cumulative_ms += (base_ms as f64 * multiplier.powi(i as i32)) as i64;
                    base_time + Duration::milliseconds(cumulative_ms)
                })
                .collect()
        }
        BackoffType::BusinessHours => {
            let (start, end) =
                if strategy.business_hours_start == 0 && strategy.business_hours_end == 0 {
                    (9, 17)
                } else {
                    (strategy.business_hours_start, strategy.business_hours_end)
                };
            (0..attempts)
                .map(|i| snap_to_business_hours(base_time + fixed_delay(strategy, i), start, end))
                .collect()
        }
    }
}

fn fixed_delay(strategy: &RetryStrategy, slot: usize) -> Duration {
    if strategy.delays.is_empty() {
        return Duration::zero();
    }
    strategy.delays[slot.min(strategy.delays.len() - 1)]
}

/// Move a candidate instant into the `[start, end)` hour window: before the
/// window it snaps to `start:00:00` the same day, at or past the window's
/// end it snaps to `start:00:00` the next day.
fn snap_to_business_hours(candidate: DateTime<Utc>, start: u32, end: u32) -> DateTime<Utc> {
    let hour = candidate.hour();
    if hour >= start && hour < end {
        return candidate;
    }
    let day = if hour < start {
        candidate.date_naive()
    } else {
        candidate.date_naive() + chrono::Days::new(1)
    };
    match day.and_hms_opt(start, 0, 0) {
        Some(naive) => DateTime::from_naive_utc_and_offset(naive, Utc),
        None => candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DateTime<Utc> {
        "2025-01-01T12:00:00Z".parse().expect("valid timestamp")
    }

    #[test]
    fn hard_codes_classify_hard() {
        let catalog = DeclineCatalog::with_defaults();
        for code in ["stolen_card", "fraud_suspected", "invalid_card", "expired_card"] {
            let (category, reason) = catalog.classify(code);
            assert_eq!(category, DeclineCategory::Hard, "{code}");
            assert!(!reason.is_empty());
        }
    }

    #[test]
    fn soft_codes_classify_soft() {
        let catalog = DeclineCatalog::with_defaults();
        for code in [
            "insufficient_funds",
            "issuer_timeout",
            "do_not_honor",
            "processor_error",
            "authentication_failed",
        ] {
            let (category, reason) = catalog.classify(code);
            assert_eq!(category, DeclineCategory::Soft, "{code}");
            assert!(!reason.is_empty());
        }
    }

    #[test]
    fn unknown_code_fails_closed() {
        let catalog = DeclineCatalog::with_defaults();
        let (category, _) = catalog.classify("mystery_code");
        assert_eq!(category, DeclineCategory::Hard);
        assert!(catalog.strategy("mystery_code").is_none());
        assert!(catalog.is_hard("stolen_card"));
        assert!(!catalog.is_hard("insufficient_funds"));
        assert!(!catalog.is_hard("mystery_code"));
    }

    #[test]
    fn default_strategies_are_well_formed() {
        let catalog = DeclineCatalog::with_defaults();
        let (_, soft) = catalog.codes_by_category();
        for code in soft {
            let strategy = catalog.strategy(&code).expect("strategy exists");
            assert!(strategy.max_attempts > 0);
            assert_eq!(strategy.delays.len(), strategy.max_attempts as usize);
            assert_eq!(strategy.per_attempt_rates.len(), strategy.max_attempts as usize);
        }
    }

    #[test]
    fn fixed_plan_uses_absolute_offsets() {
        let catalog = DeclineCatalog::with_defaults();
        let plan = catalog.build_plan("insufficient_funds", "stripe_latam", base()).expect("plan");

        assert_eq!(plan.max_attempts, 3);
        assert_eq!(plan.scheduled_times[0], base() + Duration::hours(2));
        assert_eq!(plan.scheduled_times[1], base() + Duration::hours(24));
        assert_eq!(plan.scheduled_times[2], base() + Duration::hours(48));
        assert_eq!(plan.processors, vec!["stripe_latam"; 3]);
    }

    #[test]
    fn hard_code_produces_no_plan() {
        let catalog = DeclineCatalog::with_defaults();
        assert!(catalog.build_plan("stolen_card", "stripe_latam", base()).is_none());
    }

    #[test]
    fn alt_processors_rotate_in_roster_order() {
        let catalog = DeclineCatalog::with_defaults();
        let plan = catalog.build_plan("issuer_timeout", "stripe_latam", base()).expect("plan");

        assert_eq!(plan.processors[0], "stripe_latam");
        assert_eq!(plan.processors[1], "adyen_apac");
        assert_eq!(plan.processors[2], "dlocal_br");
    }

    #[test]
    fn alternatives_exclude_original() {
        let catalog = DeclineCatalog::with_defaults();
        let alternatives = catalog.alternative_processors("dlocal_br");
        assert_eq!(alternatives.len(), 4);
        assert!(!alternatives.contains(&"dlocal_br".to_string()));
    }

    #[test]
    fn exponential_plan_cumulates_delays() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("issuer_timeout");
            strategy.backoff_type = BackoffType::Exponential;
            strategy.base_delay = Duration::minutes(10);
            strategy.backoff_multiplier = 2.0;
        }

        let plan = catalog.build_plan("issuer_timeout", "stripe_latam", base()).expect("plan");
        // 10m, then +20m, then +40m: cumulative 10m / 30m / 70m.
        assert_eq!(plan.scheduled_times[0], base() + Duration::minutes(10));
        assert_eq!(plan.scheduled_times[1], base() + Duration::minutes(30));
        assert_eq!(plan.scheduled_times[2], base() + Duration::minutes(70));
    }

    #[test]
    fn exponential_plan_is_strictly_increasing() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("processor_error");
            strategy.backoff_type = BackoffType::Exponential;
            strategy.base_delay = Duration::seconds(30);
            strategy.backoff_multiplier = 1.5;
            strategy.max_attempts = 5;
        }

        let plan = catalog.build_plan("processor_error", "payu_mx", base()).expect("plan");
        for pair in plan.scheduled_times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn exponential_zero_config_uses_defaults() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("processor_error");
            strategy.backoff_type = BackoffType::Exponential;
            strategy.base_delay = Duration::zero();
            strategy.backoff_multiplier = 0.0;
            strategy.max_attempts = 2;
        }

        let plan = catalog.build_plan("processor_error", "stripe_latam", base()).expect("plan");
        // Defaults 5m base, 2.0 multiplier: cumulative 5m / 15m.
        assert_eq!(plan.scheduled_times[0], base() + Duration::minutes(5));
        assert_eq!(plan.scheduled_times[1], base() + Duration::minutes(15));
    }

    #[test]
    fn business_hours_snaps_outside_window() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("insufficient_funds");
            strategy.backoff_type = BackoffType::BusinessHours;
            strategy.business_hours_start = 9;
            strategy.business_hours_end = 17;
            strategy.max_attempts = 2;
            strategy.delays = vec![Duration::hours(2), Duration::hours(24)];
        }

        let base: DateTime<Utc> = "2025-01-01T16:00:00Z".parse().expect("valid timestamp");
        let plan = catalog.build_plan("insufficient_funds", "stripe_latam", base).expect("plan");

        // 16:00 + 2h = 18:00 is past the window, so next day 09:00.
        let first: DateTime<Utc> = "2025-01-02T09:00:00Z".parse().expect("valid timestamp");
        assert_eq!(plan.scheduled_times[0], first);
        // 16:00 + 24h lands inside the window untouched.
        let second: DateTime<Utc> = "2025-01-02T16:00:00Z".parse().expect("valid timestamp");
        assert_eq!(plan.scheduled_times[1], second);
    }

    #[test]
    fn business_hours_plan_stays_in_window() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("do_not_honor");
            strategy.backoff_type = BackoffType::BusinessHours;
            strategy.business_hours_start = 9;
            strategy.business_hours_end = 17;
        }

        let base: DateTime<Utc> = "2025-03-10T22:45:00Z".parse().expect("valid timestamp");
        let plan = catalog.build_plan("do_not_honor", "adyen_apac", base).expect("plan");
        for t in &plan.scheduled_times {
            assert!((9..17).contains(&t.hour()), "{t} outside window");
        }
    }

    #[test]
    fn business_hours_zero_window_defaults_to_nine_to_five() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("insufficient_funds");
            strategy.backoff_type = BackoffType::BusinessHours;
            strategy.max_attempts = 1;
            strategy.delays = vec![Duration::zero()];
        }

        let base: DateTime<Utc> = "2025-01-01T03:00:00Z".parse().expect("valid timestamp");
        let plan = catalog.build_plan("insufficient_funds", "stripe_latam", base).expect("plan");
        assert_eq!(plan.scheduled_times[0].hour(), 9);
    }

    #[test]
    fn snap_cases() {
        let cases = [
            // (hour, expected hour, expected day)
            (12, 12, 1),
            (9, 9, 1),
            (7, 9, 1),
            (17, 9, 2),
            (20, 9, 2),
            (0, 9, 1),
        ];
        for (hour, want_hour, want_day) in cases {
            let input: DateTime<Utc> =
                format!("2025-01-01T{hour:02}:30:00Z").parse().expect("valid timestamp");
            let snapped = snap_to_business_hours(input, 9, 17);
            assert_eq!(snapped.hour(), want_hour, "hour {hour}");
            assert_eq!(chrono::Datelike::day(&snapped), want_day, "hour {hour}");
        }
    }

    #[test]
    fn short_delay_list_repeats_last_entry() {
        let mut catalog = DeclineCatalog::with_defaults();
        {
            let strategy = catalog.mutate_strategy("do_not_honor");
            strategy.max_attempts = 4;
            strategy.delays = vec![Duration::hours(1), Duration::hours(3)];
        }

        let plan = catalog.build_plan("do_not_honor", "stripe_latam", base()).expect("plan");
        assert_eq!(plan.scheduled_times[1], base() + Duration::hours(3));
        assert_eq!(plan.scheduled_times[2], base() + Duration::hours(3));
        assert_eq!(plan.scheduled_times[3], base() + Duration::hours(3));
    }
}
