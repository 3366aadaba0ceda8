//! `agg_weather_impact`: severity and duration by weather category,
//! relative to clear weather.

use accident_warehouse_accident_models::WeatherCategory;
use accident_warehouse_models::{
    RiskCategory, WarehouseConfig, WeatherDimensionRow, WeatherImpactRow,
};

use super::{EnrichedFact, Stats, group_stats, pct_change, round3};

/// Highest possible risk score.
pub const MAX_RISK_SCORE: u8 = 10;

/// One row per weather dimension row, in key order.
///
/// Impact percentages compare against the `Clear` group and are 0 when no
/// clear-weather accidents exist.
#[must_use]
pub fn weather_impact(
    facts: &[EnrichedFact<'_>],
    weather_rows: &[WeatherDimensionRow],
    config: &WarehouseConfig,
) -> Vec<WeatherImpactRow> {
    let groups = group_stats(facts, config.high_severity_threshold, |f| f.weather);
    let baseline = groups.get(&WeatherCategory::Clear).copied();

    weather_rows
        .iter()
        .map(|dim| {
            let stats = groups.get(&dim.weather_category).copied().unwrap_or_default();
            let (severity_impact, duration_impact) =
                baseline.map_or((0.0, 0.0), |clear| impact(&stats, &clear));
            let score = risk_score(dim.weather_category, severity_impact, duration_impact);

            WeatherImpactRow {
                weather_key: dim.weather_key.clone(),
                weather_category: dim.weather_category,
                total_accidents: stats.count,
                avg_severity: round3(stats.avg_severity()),
                avg_duration_min: round3(stats.avg_duration_min()),
                high_severity_rate: round3(stats.high_severity_rate()),
                severity_impact_pct: round3(severity_impact),
                duration_impact_pct: round3(duration_impact),
                weather_risk_score: score,
                risk_category: RiskCategory::from_score(score),
            }
        })
        .collect()
}

fn impact(stats: &Stats, clear: &Stats) -> (f64, f64) {
    (
        pct_change(stats.avg_severity(), clear.avg_severity()).unwrap_or(0.0),
        pct_change(stats.avg_duration_min(), clear.avg_duration_min()).unwrap_or(0.0),
    )
}

/// Base risk of the category plus bonuses for severity and duration
/// increases over clear weather, capped at [`MAX_RISK_SCORE`].
#[must_use]
pub fn risk_score(
    category: WeatherCategory,
    severity_impact_pct: f64,
    duration_impact_pct: f64,
) -> u8 {
    let severity_bonus = if severity_impact_pct > 15.0 {
        3
    } else if severity_impact_pct > 10.0 {
        2
    } else {
        u8::from(severity_impact_pct > 5.0)
    };

    let duration_bonus = if duration_impact_pct > 30.0 {
        2
    } else {
        u8::from(duration_impact_pct > 15.0)
    };

    (category.base_risk() + severity_bonus + duration_bonus).min(MAX_RISK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::enrich;
    use crate::dimensions::build_dimensions;
    use crate::fact::assemble_facts;
    use crate::test_support::{record, severity};

    #[test]
    fn risk_score_bonuses_and_cap() {
        assert_eq!(risk_score(WeatherCategory::Clear, 0.0, 0.0), 0);
        assert_eq!(risk_score(WeatherCategory::Rain, 6.0, 16.0), 5);
        assert_eq!(risk_score(WeatherCategory::Snow, 12.0, 31.0), 8);
        assert_eq!(risk_score(WeatherCategory::Fog, 50.0, 100.0), 10);
        assert_eq!(risk_score(WeatherCategory::Cloudy, -20.0, -40.0), 1);
    }

    #[test]
    fn impact_is_relative_to_clear() {
        let clear = record("A-1", "2021-03-01 08:00:00");
        let mut rain = record("A-2", "2021-03-01 09:00:00");
        rain.weather_condition = Some("Heavy Rain".to_string());
        rain.severity = severity(3);
        rain.end_time = rain.start_time + chrono::Duration::minutes(60);
        rain.duration_min = Some(60.0);

        let records = vec![clear, rain];
        let config = WarehouseConfig::default();
        let dims = build_dimensions(&records, &config);
        let facts = assemble_facts(&records, &dims, &config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();

        let rows = weather_impact(&enriched, &dims.weather.rows, &config);

        assert_eq!(rows.len(), 2);
        let clear = &rows[0];
        assert_eq!(clear.weather_key, "W1");
        assert_eq!(clear.weather_category, WeatherCategory::Clear);
        assert!(clear.severity_impact_pct.abs() < f64::EPSILON);
        assert_eq!(clear.risk_category, RiskCategory::Low);

        let rain = &rows[1];
        assert_eq!(rain.weather_key, "W2");
        assert!((rain.severity_impact_pct - 50.0).abs() < 1e-9);
        assert!((rain.duration_impact_pct - 100.0).abs() < 1e-9);
        assert!((rain.high_severity_rate - 100.0).abs() < 1e-9);
        assert_eq!(rain.weather_risk_score, 8);
        assert_eq!(rain.risk_category, RiskCategory::Extreme);
    }

    #[test]
    fn no_clear_baseline_means_zero_impact() {
        let mut fog = record("A-1", "2021-03-01 08:00:00");
        fog.weather_condition = Some("Fog".to_string());

        let records = vec![fog];
        let config = WarehouseConfig::default();
        let dims = build_dimensions(&records, &config);
        let facts = assemble_facts(&records, &dims, &config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();

        let rows = weather_impact(&enriched, &dims.weather.rows, &config);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].severity_impact_pct.abs() < f64::EPSILON);
        assert_eq!(rows[0].weather_risk_score, 5);
        assert_eq!(rows[0].risk_category, RiskCategory::Moderate);
    }
}
