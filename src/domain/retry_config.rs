use std::collections::BTreeMap;

use chrono::Duration;
use serde::Deserialize;

use crate::domain::decline::{BackoffType, DeclineCatalog};
use crate::error::{RetryError, RetryResult};

/// Top-level strategy override file: `{ "strategies": { code: override } }`.
#[derive(Debug, Default, Deserialize)]
pub struct RetryConfigFile {
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyOverride>,
}

/// JSON representation of a per-code strategy override. Omitted or
/// zero-valued fields leave the default strategy untouched; an unknown code
/// registers a new soft-decline strategy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyOverride {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub delays: Option<Vec<String>>,
    #[serde(default)]
    pub per_attempt_rates: Option<Vec<f64>>,
    #[serde(default)]
    pub use_alt_processor: Option<bool>,
    #[serde(default)]
    pub backoff_type: Option<String>,
    #[serde(default)]
    pub base_delay: Option<String>,
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
    #[serde(default)]
    pub business_hours_start: Option<u32>,
    #[serde(default)]
    pub business_hours_end: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Read and parse an override file. I/O and JSON failures surface as
/// `ConfigInvalid` so the caller can fall back to the defaults.
pub fn load_retry_config(path: &str) -> RetryResult<RetryConfigFile> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| RetryError::ConfigInvalid(format!("reading {path}: {e}")))?;
    serde_json::from_str(&data)
        .map_err(|e| RetryError::ConfigInvalid(format!("parsing {path}: {e}")))
}

/// Merge overrides into the catalog, validating as it goes. The catalog is
/// left partially updated on error; callers apply overrides to a scratch
/// clone and promote it only on success.
pub fn apply_strategy_overrides(
    catalog: &mut DeclineCatalog,
    overrides: &BTreeMap<String, StrategyOverride>,
) -> RetryResult<()> {
    for (code, cfg) in overrides {
        validate_override(code, cfg)?;

        let mut delays = None;
        if let Some(raw) = &cfg.delays {
            if !raw.is_empty() {
                let mut parsed = Vec::with_capacity(raw.len());
                for d in raw {
                    parsed.push(parse_duration(d).map_err(|e| {
                        RetryError::ConfigInvalid(format!("invalid delay {d:?} for {code}: {e}"))
                    })?);
                }
                delays = Some(parsed);
            }
        }
        let base_delay = match &cfg.base_delay {
            Some(raw) if !raw.is_empty() => Some(parse_duration(raw).map_err(|e| {
                RetryError::ConfigInvalid(format!("invalid base_delay {raw:?} for {code}: {e}"))
            })?),
            _ => None,
        };
        let backoff_type = match cfg.backoff_type.as_deref() {
            None | Some("") => None,
            Some("fixed") => Some(BackoffType::Fixed),
            Some("exponential") => Some(BackoffType::Exponential),
            Some("business_hours") => Some(BackoffType::BusinessHours),
            Some(other) => {
                return Err(RetryError::ConfigInvalid(format!(
                    "invalid backoff_type {other:?} for {code}"
                )))
            }
        };

        let strategy = catalog.mutate_strategy(code);
        if let Some(n) = cfg.max_attempts {
            if n > 0 {
                strategy.max_attempts = n;
            }
        }
        if let Some(delays) = delays {
            strategy.delays = delays;
        }
        if let Some(rates) = &cfg.per_attempt_rates {
            if !rates.is_empty() {
                strategy.per_attempt_rates = rates.clone();
            }
        }
        if cfg.use_alt_processor == Some(true) {
            strategy.use_alt_processor = true;
        }
        if let Some(description) = &cfg.description {
            if !description.is_empty() {
                strategy.description = description.clone();
            }
        }
        if let Some(backoff_type) = backoff_type {
            strategy.backoff_type = backoff_type;
        }
        if let Some(base_delay) = base_delay {
            strategy.base_delay = base_delay;
        }
        if let Some(multiplier) = cfg.backoff_multiplier {
            strategy.backoff_multiplier = multiplier;
        }
        let bh_start = cfg.business_hours_start.unwrap_or(0);
        let bh_end = cfg.business_hours_end.unwrap_or(0);
        if bh_start > 0 || bh_end > 0 {
            strategy.business_hours_start = bh_start;
            strategy.business_hours_end = bh_end;
        }
    }
    Ok(())
}

fn validate_override(code: &str, cfg: &StrategyOverride) -> RetryResult<()> {
    if let Some(multiplier) = cfg.backoff_multiplier {
        if multiplier <= 1.0 {
            return Err(RetryError::ConfigInvalid(format!(
                "backoff_multiplier must be > 1.0 for {code}, got {multiplier}"
            )));
        }
    }
    let bh_start = cfg.business_hours_start.unwrap_or(0);
    let bh_end = cfg.business_hours_end.unwrap_or(0);
    if bh_start > 0 || bh_end > 0 {
        if bh_end > 23 {
            return Err(RetryError::ConfigInvalid(format!(
                "business hours out of range for {code}: end={bh_end}"
            )));
        }
        if bh_start >= bh_end {
            return Err(RetryError::ConfigInvalid(format!(
                "business_hours_start must be before end for {code}: {bh_start}..{bh_end}"
            )));
        }
    }
    if let Some(rates) = &cfg.per_attempt_rates {
        for rate in rates {
            if !(0.0..=1.0).contains(rate) {
                return Err(RetryError::ConfigInvalid(format!(
                    "per_attempt_rates must be within [0, 1] for {code}, got {rate}"
                )));
            }
        }
    }
    Ok(())
}

/// Parse a compact duration string: an integer or decimal count followed by
/// `ms`, `s`, `m`, `h` or `d`, with compound forms like `"1h30m"`. A bare
/// `"0"` is accepted.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::zero());
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_ms = 0.0_f64;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').count();
        if digits == 0 {
            return Err(format!("missing count in {s:?}"));
        }
        let value: f64 = rest[..digits].parse().map_err(|_| format!("bad count in {s:?}"))?;
        rest = &rest[digits..];

        let (unit_ms, consumed) = if let Some(stripped) = rest.strip_prefix("ms") {
            (1.0, rest.len() - stripped.len())
        } else if rest.starts_with('s') {
            (1_000.0, 1)
        } else if rest.starts_with('m') {
            (60_000.0, 1)
        } else if rest.starts_with('h') {
            (3_600_000.0, 1)
        } else if rest.starts_with('d') {
            (86_400_000.0, 1)
        } else {
            return Err(format!("unknown unit in {s:?}"));
        };
        rest = &rest[consumed..];
        total_ms += value * unit_ms;
    }

    Ok(Duration::milliseconds(total_ms.round() as i64))
}

/// Render a duration back to the compact form used in API listings.
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    if secs == 0 {
        return "0s".to_string();
    }
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overrides(code: &str, cfg: StrategyOverride) -> BTreeMap<String, StrategyOverride> {
        let mut map = BTreeMap::new();
        map.insert(code.to_string(), cfg);
        map
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("2h").expect("2h"), Duration::hours(2));
        assert_eq!(parse_duration("5m").expect("5m"), Duration::minutes(5));
        assert_eq!(parse_duration("45s").expect("45s"), Duration::seconds(45));
        assert_eq!(parse_duration("250ms").expect("250ms"), Duration::milliseconds(250));
        assert_eq!(parse_duration("2d").expect("2d"), Duration::days(2));
        assert_eq!(parse_duration("1h30m").expect("1h30m"), Duration::minutes(90));
        assert_eq!(parse_duration("1.5h").expect("1.5h"), Duration::minutes(90));
        assert_eq!(parse_duration("0").expect("0"), Duration::zero());
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        for bad in ["", "h", "5x", "not_a_duration", "5m3"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn format_duration_round_trips_common_values() {
        assert_eq!(format_duration(Duration::hours(2)), "2h");
        assert_eq!(format_duration(Duration::minutes(30)), "30m");
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::zero()), "0s");
    }

    #[test]
    fn override_replaces_fields() {
        let mut catalog = DeclineCatalog::with_defaults();
        apply_strategy_overrides(
            &mut catalog,
            &overrides(
                "insufficient_funds",
                StrategyOverride {
                    max_attempts: Some(5),
                    delays: Some(vec![
                        "1h".into(),
                        "4h".into(),
                        "12h".into(),
                        "24h".into(),
                        "48h".into(),
                    ]),
                    description: Some("Custom strategy from config".into()),
                    ..StrategyOverride::default()
                },
            ),
        )
        .expect("apply");

        let strategy = catalog.strategy("insufficient_funds").expect("strategy");
        assert_eq!(strategy.max_attempts, 5);
        assert_eq!(strategy.delays.len(), 5);
        assert_eq!(strategy.delays[0], Duration::hours(1));
        assert_eq!(strategy.description, "Custom strategy from config");
        // Untouched fields keep their defaults.
        assert_eq!(strategy.per_attempt_rates, vec![0.12, 0.17, 0.22]);
    }

    #[test]
    fn override_registers_new_soft_code() {
        let mut catalog = DeclineCatalog::with_defaults();
        apply_strategy_overrides(
            &mut catalog,
            &overrides(
                "custom_decline",
                StrategyOverride {
                    max_attempts: Some(2),
                    delays: Some(vec!["30m".into(), "2h".into()]),
                    per_attempt_rates: Some(vec![0.20, 0.15]),
                    ..StrategyOverride::default()
                },
            ),
        )
        .expect("apply");

        let strategy = catalog.strategy("custom_decline").expect("registered");
        assert_eq!(strategy.max_attempts, 2);
        assert_eq!(strategy.category, crate::domain::transaction::DeclineCategory::Soft);
        let (category, _) = catalog.classify("custom_decline");
        assert_eq!(category, crate::domain::transaction::DeclineCategory::Soft);
    }

    #[test]
    fn exponential_override_applies() {
        let mut catalog = DeclineCatalog::with_defaults();
        apply_strategy_overrides(
            &mut catalog,
            &overrides(
                "issuer_timeout",
                StrategyOverride {
                    backoff_type: Some("exponential".into()),
                    base_delay: Some("5m".into()),
                    backoff_multiplier: Some(2.0),
                    max_attempts: Some(4),
                    per_attempt_rates: Some(vec![0.40, 0.35, 0.30, 0.25]),
                    ..StrategyOverride::default()
                },
            ),
        )
        .expect("apply");

        let strategy = catalog.strategy("issuer_timeout").expect("strategy");
        assert_eq!(strategy.backoff_type, BackoffType::Exponential);
        assert_eq!(strategy.base_delay, Duration::minutes(5));
        assert_eq!(strategy.backoff_multiplier, 2.0);
        assert_eq!(strategy.max_attempts, 4);
    }

    #[test]
    fn validation_rejects_bad_overrides() {
        let cases: Vec<(&str, StrategyOverride)> = vec![
            (
                "invalid backoff type",
                StrategyOverride { backoff_type: Some("random".into()), ..Default::default() },
            ),
            (
                "multiplier too low",
                StrategyOverride { backoff_multiplier: Some(0.5), ..Default::default() },
            ),
            (
                "multiplier exactly 1.0",
                StrategyOverride { backoff_multiplier: Some(1.0), ..Default::default() },
            ),
            (
                "business hours start >= end",
                StrategyOverride {
                    business_hours_start: Some(17),
                    business_hours_end: Some(9),
                    ..Default::default()
                },
            ),
            (
                "business hours end out of range",
                StrategyOverride {
                    business_hours_start: Some(9),
                    business_hours_end: Some(25),
                    ..Default::default()
                },
            ),
            (
                "rate above 1.0",
                StrategyOverride {
                    per_attempt_rates: Some(vec![0.5, 1.5]),
                    ..Default::default()
                },
            ),
            (
                "rate negative",
                StrategyOverride { per_attempt_rates: Some(vec![-0.1]), ..Default::default() },
            ),
            (
                "unparseable delay",
                StrategyOverride {
                    delays: Some(vec!["not_a_duration".into()]),
                    ..Default::default()
                },
            ),
        ];

        for (name, cfg) in cases {
            let mut catalog = DeclineCatalog::with_defaults();
            let err = apply_strategy_overrides(&mut catalog, &overrides("test_validation", cfg));
            assert!(
                matches!(err, Err(RetryError::ConfigInvalid(_))),
                "{name}: expected ConfigInvalid, got {err:?}"
            );
        }
    }

    #[test]
    fn validation_accepts_good_overrides() {
        let cases: Vec<StrategyOverride> = vec![
            StrategyOverride {
                backoff_type: Some("exponential".into()),
                backoff_multiplier: Some(2.0),
                base_delay: Some("5m".into()),
                max_attempts: Some(3),
                ..Default::default()
            },
            StrategyOverride {
                backoff_type: Some("business_hours".into()),
                business_hours_start: Some(9),
                business_hours_end: Some(17),
                ..Default::default()
            },
            StrategyOverride {
                backoff_type: Some("fixed".into()),
                per_attempt_rates: Some(vec![0.0, 0.5, 1.0]),
                ..Default::default()
            },
            StrategyOverride { backoff_multiplier: Some(1.5), ..Default::default() },
        ];

        for cfg in cases {
            let mut catalog = DeclineCatalog::with_defaults();
            apply_strategy_overrides(&mut catalog, &overrides("test_valid", cfg))
                .expect("valid override");
        }
    }

    #[test]
    fn load_rejects_missing_and_malformed_files() {
        assert!(matches!(
            load_retry_config("/nonexistent/path.json"),
            Err(RetryError::ConfigInvalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{invalid json").expect("write");
        let path = file.path().to_string_lossy().to_string();
        assert!(matches!(load_retry_config(&path), Err(RetryError::ConfigInvalid(_))));
    }

    #[test]
    fn load_parses_valid_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"{
                "strategies": {
                    "insufficient_funds": {
                        "max_attempts": 5,
                        "delays": ["1h", "4h", "12h", "24h", "48h"]
                    }
                }
            }"#,
        )
        .expect("write");

        let path = file.path().to_string_lossy().to_string();
        let config = load_retry_config(&path).expect("load");
        assert_eq!(config.strategies.len(), 1);
        assert_eq!(
            config.strategies["insufficient_funds"].max_attempts,
            Some(5)
        );
    }
}
