#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row and configuration types for the accident star-schema warehouse.
//!
//! Every table the warehouse writes has a row struct here whose serde field
//! names are the CSV column names. Configuration, data-quality, and
//! manifest types live here too so that the engine, the CLI, and the
//! verification step agree on a single shape.

use std::collections::BTreeMap;

use accident_warehouse_accident_models::{InfraFlag, WeatherCategory};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

// ── Configuration ────────────────────────────────────────────────────────

/// Key granularity of the time dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    /// One row per calendar date (`YYYY-MM-DD`).
    #[default]
    Date,
    /// One row per date and hour (`YYYY-MM-DDTHH`).
    Hour,
}

impl std::fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date => write!(f, "date"),
            Self::Hour => write!(f, "hour"),
        }
    }
}

/// A half-open range of hours, `start..end`, with `0 <= start < end <= 24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    /// First hour included.
    pub start: u8,
    /// First hour excluded.
    pub end: u8,
}

impl HourRange {
    /// Creates a new hour range.
    #[must_use]
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `hour` falls inside this range.
    #[must_use]
    pub const fn contains(&self, hour: u32) -> bool {
        hour >= self.start as u32 && hour < self.end as u32
    }
}

/// A named slice of the day used to label hours (e.g. `Morning_Rush`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriodBucket {
    /// Label written to the `time_period` column.
    pub name: String,
    /// First hour included.
    pub start: u8,
    /// First hour excluded.
    pub end: u8,
}

impl TimePeriodBucket {
    /// Creates a new bucket.
    #[must_use]
    pub fn new(name: &str, start: u8, end: u8) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
        }
    }

    /// Returns the hour range covered by this bucket.
    #[must_use]
    pub const fn range(&self) -> HourRange {
        HourRange::new(self.start, self.end)
    }
}

/// Tunables passed explicitly into every builder and aggregator.
///
/// Missing fields in a TOML file fall back to [`WarehouseConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Hour ranges considered peak traffic.
    pub peak_hours: Vec<HourRange>,
    /// Labelled hour buckets; together they must cover all 24 hours.
    pub time_period_buckets: Vec<TimePeriodBucket>,
    /// Cumulative share that closes the Pareto prefix, in `(0, 1]`.
    pub pareto_threshold: f64,
    /// Infrastructure flags to summarize, in output order.
    pub infra_flags: Vec<InfraFlag>,
    /// Key granularity of the time dimension.
    pub time_granularity: TimeGranularity,
    /// Severity at or above which an accident counts as high severity.
    pub high_severity_threshold: u8,
    /// Abort when warnings / records exceeds this fraction.
    pub max_warning_fraction: f64,
    /// Allowed gap between the computed and supplied duration, in minutes.
    pub duration_tolerance_minutes: f64,
    /// Build location and weather partials per calendar year.
    pub partition_by_year: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            peak_hours: vec![HourRange::new(7, 10), HourRange::new(16, 19)],
            time_period_buckets: vec![
                TimePeriodBucket::new("Night", 0, 6),
                TimePeriodBucket::new("Morning_Rush", 6, 9),
                TimePeriodBucket::new("Late_Morning", 9, 12),
                TimePeriodBucket::new("Lunch", 12, 14),
                TimePeriodBucket::new("Afternoon", 14, 17),
                TimePeriodBucket::new("Evening_Rush", 17, 20),
                TimePeriodBucket::new("Night", 20, 24),
            ],
            pareto_threshold: 0.8,
            infra_flags: InfraFlag::all().to_vec(),
            time_granularity: TimeGranularity::Date,
            high_severity_threshold: 3,
            max_warning_fraction: 0.05,
            duration_tolerance_minutes: 1.0,
            partition_by_year: false,
        }
    }
}

impl WarehouseConfig {
    /// Returns the label of the first bucket containing `hour`.
    #[must_use]
    pub fn time_period(&self, hour: u32) -> Option<&str> {
        self.time_period_buckets
            .iter()
            .find(|b| b.range().contains(hour))
            .map(|b| b.name.as_str())
    }

    /// Returns `true` if `hour` falls inside any configured peak range.
    #[must_use]
    pub fn is_peak(&self, hour: u32) -> bool {
        self.peak_hours.iter().any(|r| r.contains(hour))
    }
}

// ── Dimensions ───────────────────────────────────────────────────────────

/// One row of `dim_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDimensionRow {
    /// `YYYY-MM-DD` or `YYYY-MM-DDTHH`.
    pub date_key: String,
    pub date: NaiveDate,
    pub day: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    /// Present only under hourly granularity.
    pub hour: Option<u32>,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub day_name: String,
    pub is_weekend: bool,
    /// Present only under hourly granularity.
    pub time_period: Option<String>,
    /// Present only under hourly granularity.
    pub is_peak: Option<bool>,
}

/// One row of `dim_location`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDimensionRow {
    /// Escaped `street|city` composite key.
    pub location_key: String,
    pub street: String,
    pub city: String,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub timezone: Option<String>,
    pub count_amenity: u64,
    pub count_crossing: u64,
    pub count_junction: u64,
    pub count_stop: u64,
    pub count_traffic_signal: u64,
}

impl LocationDimensionRow {
    /// Returns the counter for the given flag.
    #[must_use]
    pub const fn counter(&self, flag: InfraFlag) -> u64 {
        match flag {
            InfraFlag::Amenity => self.count_amenity,
            InfraFlag::Crossing => self.count_crossing,
            InfraFlag::Junction => self.count_junction,
            InfraFlag::Stop => self.count_stop,
            InfraFlag::TrafficSignal => self.count_traffic_signal,
        }
    }

    /// Returns a mutable reference to the counter for the given flag.
    pub const fn counter_mut(&mut self, flag: InfraFlag) -> &mut u64 {
        match flag {
            InfraFlag::Amenity => &mut self.count_amenity,
            InfraFlag::Crossing => &mut self.count_crossing,
            InfraFlag::Junction => &mut self.count_junction,
            InfraFlag::Stop => &mut self.count_stop,
            InfraFlag::TrafficSignal => &mut self.count_traffic_signal,
        }
    }

    /// Returns `true` if at least one accident at this location had the
    /// flag set.
    #[must_use]
    pub const fn has_flag(&self, flag: InfraFlag) -> bool {
        self.counter(flag) > 0
    }
}

/// One row of `dim_weather`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherDimensionRow {
    /// `W1`, `W2`, ... in category label order.
    pub weather_key: String,
    pub weather_category: WeatherCategory,
}

// ── Fact ─────────────────────────────────────────────────────────────────

/// One row of `accident_detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub accident_id: String,
    pub severity: u8,
    pub date_key: String,
    pub location_key: String,
    pub weather_key: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Fractional minutes between start and end; may be negative.
    pub duration_minutes: f64,
    pub description: Option<String>,
}

// ── Aggregates ───────────────────────────────────────────────────────────

/// How far a state's mean severity sits above its year's national mean.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum AnomalyCategory {
    Normal,
    Elevated,
    High,
    Critical,
}

impl AnomalyCategory {
    /// Z-score above which a state is `Critical`.
    pub const CRITICAL_ZSCORE: f64 = 2.0;
    /// Z-score above which a state is `High`.
    pub const HIGH_ZSCORE: f64 = 1.0;
    /// Z-score above which a state is `Elevated`.
    pub const ELEVATED_ZSCORE: f64 = 0.0;

    /// Maps a severity z-score onto a band. An undefined score is `Normal`.
    #[must_use]
    pub fn from_zscore(zscore: Option<f64>) -> Self {
        match zscore {
            Some(z) if z > Self::CRITICAL_ZSCORE => Self::Critical,
            Some(z) if z > Self::HIGH_ZSCORE => Self::High,
            Some(z) if z > Self::ELEVATED_ZSCORE => Self::Elevated,
            _ => Self::Normal,
        }
    }
}

/// One row of `agg_state_year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateYearRow {
    pub state: String,
    pub year: i32,
    pub total_accidents: u64,
    pub severity_1: u64,
    pub severity_2: u64,
    pub severity_3: u64,
    pub severity_4: u64,
    pub high_severity_count: u64,
    pub avg_severity: f64,
    pub avg_duration_min: f64,
    /// Share of that year's national total, in percent.
    pub pct_of_year_total: f64,
    /// Change against the state's previous year present in the data.
    pub yoy_change_pct: Option<f64>,
    /// Mean severity over every accident of the year.
    pub national_avg_severity: f64,
    /// Sample standard deviation of severity over every accident of the
    /// year. Empty when the year has fewer than two accidents.
    pub national_std_severity: Option<f64>,
    /// `(avg_severity - national_avg_severity) / national_std_severity`.
    /// Empty when the deviation is empty or zero.
    pub severity_zscore: Option<f64>,
    /// The state's mean severity is above the national mean.
    pub is_anomaly: bool,
    pub anomaly_category: AnomalyCategory,
}

/// One row of `agg_national_year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalYearRow {
    pub year: i32,
    pub total_accidents: u64,
    pub high_severity_count: u64,
    /// Share of high-severity accidents, in percent.
    pub high_severity_pct: f64,
    pub avg_severity: f64,
    /// Sample standard deviation; empty below two accidents.
    pub std_severity: Option<f64>,
    pub avg_duration_min: f64,
    pub median_duration_min: f64,
    pub total_states: u64,
    pub total_cities: u64,
    /// Change in accident count against the previous year present.
    pub yoy_accidents_change_pct: Option<f64>,
    /// Change in mean severity against the previous year present.
    pub yoy_severity_change_pct: Option<f64>,
    /// Running total over this and every earlier year.
    pub cumulative_accidents: u64,
}

/// One row of `agg_city_pareto`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityParetoRow {
    /// 1-based rank by descending count.
    pub rank: u64,
    pub city: String,
    pub total_accidents: u64,
    pub avg_severity: f64,
    pub high_severity_count: u64,
    pub avg_duration_min: f64,
    pub pct_of_total: f64,
    pub cumulative_count: u64,
    pub cumulative_pct: f64,
    pub is_pareto: bool,
}

/// One cell of the 24 x 7 `agg_time_pattern` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePatternRow {
    pub hour: u32,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub day_name: String,
    pub total_accidents: u64,
    pub avg_severity: f64,
    pub avg_duration_min: f64,
    pub time_period: String,
    pub is_peak: bool,
    pub is_weekend: bool,
    /// Count relative to the busiest cell, scaled to 0-10.
    pub hotspot_score: f64,
}

/// Risk band derived from a 0-10 weather risk score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskCategory {
    /// Maps a 0-10 score onto a risk band.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            8.. => Self::Extreme,
            6..=7 => Self::High,
            4..=5 => Self::Moderate,
            _ => Self::Low,
        }
    }
}

/// One row of `agg_weather_impact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherImpactRow {
    pub weather_key: String,
    pub weather_category: WeatherCategory,
    pub total_accidents: u64,
    pub avg_severity: f64,
    pub avg_duration_min: f64,
    /// Share of accidents at or above the high severity threshold, in
    /// percent.
    pub high_severity_rate: f64,
    /// Change in mean severity against the `Clear` baseline, in percent.
    pub severity_impact_pct: f64,
    /// Change in mean duration against the `Clear` baseline, in percent.
    pub duration_impact_pct: f64,
    pub weather_risk_score: u8,
    pub risk_category: RiskCategory,
}

/// One row of `agg_infrastructure_impact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureImpactRow {
    pub infra_flag: InfraFlag,
    pub present_count: u64,
    pub present_avg_severity: f64,
    pub present_avg_duration_min: f64,
    pub absent_count: u64,
    pub absent_avg_severity: f64,
    pub absent_avg_duration_min: f64,
    /// Change in mean severity when the flag is present, in percent.
    pub severity_impact_pct: f64,
}

/// Area type inferred from how much infrastructure surrounds an accident.
///
/// An accident is `Urban` when its infrastructure flag count is at least
/// the median count over all accidents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum AreaType {
    Rural,
    Urban,
}

/// Risk band of a state and area type's infrastructure.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum InfraRiskCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl InfraRiskCategory {
    /// Classifies a weighted risk score together with the group's mean
    /// severity.
    #[must_use]
    pub fn classify(risk_score: f64, avg_severity: f64) -> Self {
        if risk_score > 5.0 && avg_severity >= 3.0 {
            Self::Critical
        } else if risk_score > 3.0 || avg_severity >= 3.0 {
            Self::High
        } else if risk_score > 1.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One row of `agg_infrastructure_risk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureRiskRow {
    pub state: String,
    pub area_type: AreaType,
    pub total_accidents: u64,
    pub high_severity_count: u64,
    /// Share of high-severity accidents, in percent.
    pub high_severity_rate: f64,
    pub avg_severity: f64,
    pub avg_duration_min: f64,
    /// Mean number of configured flags set per accident.
    pub avg_infra_score: f64,
    pub count_amenity: u64,
    pub count_crossing: u64,
    pub count_junction: u64,
    pub count_stop: u64,
    pub count_traffic_signal: u64,
    /// Weighted flag total per accident.
    pub infra_risk_score: f64,
    /// Risk score above the median over all rows.
    pub is_high_risk: bool,
    pub risk_category: InfraRiskCategory,
    /// Share of the area type's accidents, in percent.
    pub pct_of_area_total: f64,
}

// ── Data quality ─────────────────────────────────────────────────────────

/// Kinds of non-fatal data-quality problems.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarningKind {
    /// End time precedes start time.
    NegativeDuration,
    /// Computed duration disagrees with the supplied one.
    DurationMismatch,
    /// Street was missing or blank.
    EmptyStreet,
    /// City was missing or blank.
    EmptyCity,
}

/// A single non-fatal data-quality observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub kind: WarningKind,
    pub accident_id: String,
    pub message: String,
}

impl DataQualityWarning {
    /// Creates a new warning.
    #[must_use]
    pub fn new(kind: WarningKind, accident_id: &str, message: String) -> Self {
        Self {
            kind,
            accident_id: accident_id.to_string(),
            message,
        }
    }
}

/// Summary of all warnings raised during a build, written to
/// `quality_report.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_records: u64,
    pub total_warnings: u64,
    pub warning_fraction: f64,
    pub counts: BTreeMap<WarningKind, u64>,
    /// First few warnings of each kind, sorted by accident id.
    pub examples: Vec<DataQualityWarning>,
}

// ── Manifest ─────────────────────────────────────────────────────────────

/// Current manifest schema version. Bump this when the manifest format
/// changes in a backward-incompatible way.
pub const MANIFEST_VERSION: u32 = 1;

/// Identity of the input file at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub path: String,
    pub size_bytes: u64,
    /// Modification time as RFC 3339, when the platform reports one.
    pub modified: Option<String>,
}

/// Per-table entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Path relative to the output directory.
    pub path: String,
    pub row_count: u64,
    /// Number of distinct primary-key values.
    pub key_count: u64,
}

/// Build manifest stored at `<output>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// RFC 3339 timestamp of the build.
    pub generated_at: String,
    pub input: InputFingerprint,
    /// MD5 of the effective configuration serialized as TOML.
    pub config_fingerprint: String,
    /// Keyed by table name (e.g. `dim_time`).
    pub tables: BTreeMap<String, TableSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buckets_label_every_hour() {
        let config = WarehouseConfig::default();
        for hour in 0..24 {
            assert!(config.time_period(hour).is_some(), "hour {hour} unlabelled");
        }
        assert_eq!(config.time_period(5), Some("Night"));
        assert_eq!(config.time_period(6), Some("Morning_Rush"));
        assert_eq!(config.time_period(13), Some("Lunch"));
        assert_eq!(config.time_period(19), Some("Evening_Rush"));
        assert_eq!(config.time_period(23), Some("Night"));
    }

    #[test]
    fn default_peak_hours_are_end_exclusive() {
        let config = WarehouseConfig::default();
        assert!(!config.is_peak(6));
        assert!(config.is_peak(7));
        assert!(config.is_peak(9));
        assert!(!config.is_peak(10));
        assert!(config.is_peak(18));
        assert!(!config.is_peak(19));
    }

    #[test]
    fn risk_category_bands() {
        assert_eq!(RiskCategory::from_score(0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(4), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_score(7), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(10), RiskCategory::Extreme);
    }

    #[test]
    fn anomaly_bands_use_strict_cut_offs() {
        assert_eq!(AnomalyCategory::from_zscore(None), AnomalyCategory::Normal);
        assert_eq!(AnomalyCategory::from_zscore(Some(-0.5)), AnomalyCategory::Normal);
        assert_eq!(AnomalyCategory::from_zscore(Some(0.0)), AnomalyCategory::Normal);
        assert_eq!(AnomalyCategory::from_zscore(Some(0.3)), AnomalyCategory::Elevated);
        assert_eq!(AnomalyCategory::from_zscore(Some(1.0)), AnomalyCategory::Elevated);
        assert_eq!(AnomalyCategory::from_zscore(Some(1.5)), AnomalyCategory::High);
        assert_eq!(AnomalyCategory::from_zscore(Some(2.01)), AnomalyCategory::Critical);
    }

    #[test]
    fn infra_risk_needs_score_and_severity_for_critical() {
        assert_eq!(InfraRiskCategory::classify(6.0, 3.2), InfraRiskCategory::Critical);
        assert_eq!(InfraRiskCategory::classify(6.0, 2.0), InfraRiskCategory::High);
        assert_eq!(InfraRiskCategory::classify(0.5, 3.0), InfraRiskCategory::High);
        assert_eq!(InfraRiskCategory::classify(2.5, 1.5), InfraRiskCategory::Medium);
        assert_eq!(InfraRiskCategory::classify(1.0, 2.9), InfraRiskCategory::Low);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: WarehouseConfig = toml::from_str("pareto_threshold = 0.5\n").unwrap();
        assert!((config.pareto_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.infra_flags.len(), 5);
        assert_eq!(config.time_granularity, TimeGranularity::Date);
    }

    #[test]
    fn quality_counts_serialize_with_snake_case_keys() {
        let mut report = QualityReport::default();
        report.counts.insert(WarningKind::NegativeDuration, 2);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"negative_duration\":2"));
    }
}
