//! `agg_state_year`: accident trends per state and year, with each state
//! scored against the national severity of its year.

use std::collections::BTreeMap;

use accident_warehouse_models::{AnomalyCategory, StateYearRow, WarehouseConfig};

use super::{EnrichedFact, Stats, group_stats, pct_change, percent, round3};

/// Groups by `(state, year)`, sorted by state then year.
///
/// `yoy_change_pct` compares against the same state's previous year
/// present in the data, and is empty for a state's first year.
///
/// The national columns describe every accident of the row's year. A state
/// is an anomaly when its mean severity is strictly above the national
/// mean; the z-score and its band use the national sample deviation.
#[must_use]
pub fn state_year(facts: &[EnrichedFact<'_>], config: &WarehouseConfig) -> Vec<StateYearRow> {
    let groups = group_stats(facts, config.high_severity_threshold, |f| {
        (f.location.state.clone().unwrap_or_default(), f.year)
    });

    let mut national: BTreeMap<i32, Stats> = BTreeMap::new();
    for ((_, year), stats) in &groups {
        let merged = national.remove(year).unwrap_or_default().merge(*stats);
        national.insert(*year, merged);
    }

    let mut rows = Vec::with_capacity(groups.len());
    let mut previous: Option<(String, u64)> = None;

    for ((state, year), stats) in groups {
        #[allow(clippy::cast_precision_loss)]
        let yoy_change_pct = match &previous {
            Some((prev_state, prev_count)) if *prev_state == state => {
                pct_change(stats.count as f64, *prev_count as f64).map(round3)
            }
            _ => None,
        };
        previous = Some((state.clone(), stats.count));

        let year_stats = national.get(&year).copied().unwrap_or_default();
        let national_std = year_stats.std_severity();
        let severity_zscore = national_std
            .filter(|std| *std > 0.0)
            .map(|std| (stats.avg_severity() - year_stats.avg_severity()) / std);
        // sum_s / n_s > sum_y / n_y, cross-multiplied to stay exact.
        let is_anomaly = u128::from(stats.severity_sum) * u128::from(year_stats.count)
            > u128::from(year_stats.severity_sum) * u128::from(stats.count);

        let [severity_1, severity_2, severity_3, severity_4] = stats.by_severity;
        rows.push(StateYearRow {
            state,
            year,
            total_accidents: stats.count,
            severity_1,
            severity_2,
            severity_3,
            severity_4,
            high_severity_count: stats.high_severity,
            avg_severity: round3(stats.avg_severity()),
            avg_duration_min: round3(stats.avg_duration_min()),
            pct_of_year_total: round3(percent(stats.count, year_stats.count)),
            yoy_change_pct,
            national_avg_severity: round3(year_stats.avg_severity()),
            national_std_severity: national_std.map(round3),
            severity_zscore: severity_zscore.map(round3),
            is_anomaly,
            anomaly_category: AnomalyCategory::from_zscore(severity_zscore),
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::enrich;
    use crate::dimensions::build_dimensions;
    use crate::fact::assemble_facts;
    use crate::test_support::sample_records;

    #[test]
    fn groups_and_trends_per_state() {
        let records = sample_records();
        let config = WarehouseConfig::default();
        let dims = build_dimensions(&records, &config);
        let facts = assemble_facts(&records, &dims, &config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();

        let rows = state_year(&enriched, &config);
        let keys: Vec<(&str, i32)> = rows.iter().map(|r| (r.state.as_str(), r.year)).collect();
        assert_eq!(
            keys,
            vec![
                ("IL", 2020),
                ("IL", 2021),
                ("OH", 2021),
                ("TX", 2020),
                ("TX", 2021),
            ]
        );

        let il_2020 = &rows[0];
        assert_eq!(il_2020.total_accidents, 3);
        assert_eq!((il_2020.severity_2, il_2020.severity_3, il_2020.severity_4), (1, 1, 1));
        assert_eq!(il_2020.high_severity_count, 2);
        assert!((il_2020.avg_severity - 3.0).abs() < 1e-9);
        assert!((il_2020.pct_of_year_total - 75.0).abs() < 1e-9);
        assert_eq!(il_2020.yoy_change_pct, None);

        let il_2021 = &rows[1];
        assert_eq!(il_2021.total_accidents, 1);
        assert!((il_2021.yoy_change_pct.unwrap() + 66.667).abs() < 1e-9);

        let oh_2021 = &rows[2];
        assert_eq!(oh_2021.yoy_change_pct, None);

        let tx_2021 = &rows[4];
        assert_eq!(tx_2021.total_accidents, 2);
        assert!((tx_2021.yoy_change_pct.unwrap() - 100.0).abs() < 1e-9);

        let year_2021: f64 = rows
            .iter()
            .filter(|r| r.year == 2021)
            .map(|r| r.pct_of_year_total)
            .sum();
        assert!((year_2021 - 100.0).abs() < 0.01);
    }

    #[test]
    fn scores_states_against_national_severity() {
        let records = sample_records();
        let config = WarehouseConfig::default();
        let dims = build_dimensions(&records, &config);
        let facts = assemble_facts(&records, &dims, &config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();

        let rows = state_year(&enriched, &config);
        let row = |state: &str, year: i32| {
            rows.iter()
                .find(|r| r.state == state && r.year == year)
                .unwrap()
        };

        // 2020 severities 2, 3, 4, 2: mean 2.75, sample deviation 0.957.
        let il_2020 = row("IL", 2020);
        assert!((il_2020.national_avg_severity - 2.75).abs() < 1e-9);
        assert!((il_2020.national_std_severity.unwrap() - 0.957).abs() < 1e-9);
        assert!((il_2020.severity_zscore.unwrap() - 0.261).abs() < 1e-9);
        assert!(il_2020.is_anomaly);
        assert_eq!(il_2020.anomaly_category, AnomalyCategory::Elevated);

        let tx_2020 = row("TX", 2020);
        assert!((tx_2020.severity_zscore.unwrap() + 0.783).abs() < 1e-9);
        assert!(!tx_2020.is_anomaly);
        assert_eq!(tx_2020.anomaly_category, AnomalyCategory::Normal);

        // 2021 severities 2, 1, 2, 3, 4, 2: mean 2.333, deviation 1.033.
        let tx_2021 = row("TX", 2021);
        assert!((tx_2021.national_avg_severity - 2.333).abs() < 1e-9);
        assert!((tx_2021.severity_zscore.unwrap() - 1.13).abs() < 1e-9);
        assert!(tx_2021.is_anomaly);
        assert_eq!(tx_2021.anomaly_category, AnomalyCategory::High);

        let oh_2021 = row("OH", 2021);
        assert!(!oh_2021.is_anomaly);
        assert_eq!(oh_2021.anomaly_category, AnomalyCategory::Normal);
    }

    #[test]
    fn uniform_year_has_no_zscore() {
        use crate::test_support::record;

        let records = vec![
            record("B-1", "2022-01-03 08:00:00"),
            record("B-2", "2022-01-04 08:00:00"),
        ];
        let config = WarehouseConfig::default();
        let dims = build_dimensions(&records, &config);
        let facts = assemble_facts(&records, &dims, &config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();

        let rows = state_year(&enriched, &config);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].national_std_severity, Some(0.0));
        assert_eq!(rows[0].severity_zscore, None);
        assert!(!rows[0].is_anomaly);
        assert_eq!(rows[0].anomaly_category, AnomalyCategory::Normal);
    }
}
