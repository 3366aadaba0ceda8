//! Loading and validation of [`WarehouseConfig`].
//!
//! Configuration comes from an optional TOML file; any field the file
//! omits keeps its default. A config is validated once, up front, so the
//! builders can assume every hour has a bucket and every threshold is in
//! range.

use std::collections::BTreeSet;
use std::path::Path;

use accident_warehouse_models::WarehouseConfig;

use crate::WarehouseError;

/// Parses a TOML string into a config, without validating it.
///
/// # Errors
///
/// Returns [`WarehouseError::ConfigParse`] if the TOML is malformed or a
/// field has the wrong type.
pub fn parse_config(toml_str: &str, origin: &str) -> Result<WarehouseConfig, WarehouseError> {
    toml::from_str(toml_str).map_err(|e| WarehouseError::ConfigParse {
        path: origin.to_string(),
        source: e,
    })
}

/// Loads and validates the effective configuration.
///
/// With no path the defaults are used.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// resulting config fails [`validate_config`].
pub fn load_config(path: Option<&Path>) -> Result<WarehouseConfig, WarehouseError> {
    let config = match path {
        Some(path) => {
            let contents =
                std::fs::read_to_string(path).map_err(|e| WarehouseError::io(path, e))?;
            log::info!("Loaded config from {}", path.display());
            parse_config(&contents, &path.display().to_string())?
        }
        None => {
            log::debug!("No config file given, using defaults");
            WarehouseConfig::default()
        }
    };

    validate_config(&config)?;
    Ok(config)
}

/// Checks that a config is internally consistent.
///
/// # Errors
///
/// Returns [`WarehouseError::Config`] describing the first problem found.
pub fn validate_config(config: &WarehouseConfig) -> Result<(), WarehouseError> {
    for bucket in &config.time_period_buckets {
        check_hour_range(&format!("time period {:?}", bucket.name), bucket.start, bucket.end)?;
    }
    for range in &config.peak_hours {
        check_hour_range("peak hours", range.start, range.end)?;
    }

    let uncovered: Vec<u32> = (0..24)
        .filter(|h| config.time_period(*h).is_none())
        .collect();
    if !uncovered.is_empty() {
        return Err(invalid(format!(
            "time_period_buckets do not cover hours {uncovered:?}"
        )));
    }

    let threshold = config.pareto_threshold;
    if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
        return Err(invalid(format!(
            "pareto_threshold must be in (0, 1], got {}",
            config.pareto_threshold
        )));
    }

    let mut seen = BTreeSet::new();
    for flag in &config.infra_flags {
        if !seen.insert(*flag) {
            return Err(invalid(format!("infra flag {flag} listed more than once")));
        }
    }

    if !(0.0..=1.0).contains(&config.max_warning_fraction) {
        return Err(invalid(format!(
            "max_warning_fraction must be in [0, 1], got {}",
            config.max_warning_fraction
        )));
    }

    if !(1..=4).contains(&config.high_severity_threshold) {
        return Err(invalid(format!(
            "high_severity_threshold must be in 1-4, got {}",
            config.high_severity_threshold
        )));
    }

    let tolerance = config.duration_tolerance_minutes;
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(invalid(format!(
            "duration_tolerance_minutes must be non-negative, got {}",
            config.duration_tolerance_minutes
        )));
    }

    Ok(())
}

/// Renders a config as pretty TOML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn config_to_toml(config: &WarehouseConfig) -> Result<String, WarehouseError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Returns a stable fingerprint of the effective configuration.
///
/// # Errors
///
/// Returns an error if the config cannot be rendered as TOML.
pub fn config_fingerprint(config: &WarehouseConfig) -> Result<String, WarehouseError> {
    let rendered = config_to_toml(config)?;
    Ok(format!("{:x}", md5::compute(rendered.as_bytes())))
}

fn check_hour_range(what: &str, start: u8, end: u8) -> Result<(), WarehouseError> {
    if end > 24 || start >= end {
        return Err(invalid(format!(
            "{what} range {start}..{end} must satisfy 0 <= start < end <= 24"
        )));
    }
    Ok(())
}

fn invalid(message: String) -> WarehouseError {
    WarehouseError::Config { message }
}

#[cfg(test)]
mod tests {
    use accident_warehouse_accident_models::InfraFlag;
    use accident_warehouse_models::TimePeriodBucket;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate_config(&WarehouseConfig::default()).unwrap();
    }

    #[test]
    fn rejects_uncovered_hours() {
        let mut config = WarehouseConfig::default();
        config.time_period_buckets.pop();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("20, 21, 22, 23"), "{err}");
    }

    #[test]
    fn rejects_empty_or_out_of_range_buckets() {
        let mut config = WarehouseConfig::default();
        config
            .time_period_buckets
            .push(TimePeriodBucket::new("Broken", 5, 5));
        assert!(validate_config(&config).is_err());

        let mut config = WarehouseConfig::default();
        config.time_period_buckets[6].end = 25;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_bad_thresholds() {
        let mut config = WarehouseConfig::default();
        config.pareto_threshold = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = WarehouseConfig::default();
        config.pareto_threshold = 1.0;
        validate_config(&config).unwrap();

        let mut config = WarehouseConfig::default();
        config.max_warning_fraction = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_duplicate_flags() {
        let mut config = WarehouseConfig::default();
        config.infra_flags.push(InfraFlag::Stop);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("stop"), "{err}");
    }

    #[test]
    fn parses_partial_file() {
        let config = parse_config(
            "time_granularity = \"hour\"\ninfra_flags = [\"crossing\", \"traffic_signal\"]\n",
            "inline",
        )
        .unwrap();
        assert_eq!(
            config.infra_flags,
            vec![InfraFlag::Crossing, InfraFlag::TrafficSignal]
        );
        validate_config(&config).unwrap();
    }

    #[test]
    fn toml_round_trip_preserves_fingerprint() {
        let config = WarehouseConfig::default();
        let rendered = config_to_toml(&config).unwrap();
        let reparsed = parse_config(&rendered, "rendered").unwrap();
        assert_eq!(reparsed, config);
        assert_eq!(
            config_fingerprint(&reparsed).unwrap(),
            config_fingerprint(&config).unwrap()
        );
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.toml");
        std::fs::write(&path, "partition_by_year = true\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!(config.partition_by_year);
    }
}
