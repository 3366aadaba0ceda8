//! `agg_infrastructure_risk`: weighted infrastructure exposure per state
//! and area type.
//!
//! Each accident's infrastructure score is the number of configured flags
//! set on it. Accidents scoring at least the median are `Urban`, the rest
//! `Rural`. A group's risk score is its weighted flag total (see
//! [`InfraFlag::risk_weight`]) divided by its accident count.

use std::collections::{BTreeMap, HashMap};

use accident_warehouse_accident_models::{InfraFlag, InfraFlags};
use accident_warehouse_models::{
    AreaType, InfraRiskCategory, InfrastructureRiskRow, WarehouseConfig,
};
use rayon::prelude::*;

use super::{EnrichedFact, Stats, median, percent, round3};

/// Running totals for one `(state, area type)` group.
#[derive(Debug, Clone, Copy, Default)]
struct RiskTotals {
    stats: Stats,
    score_sum: u64,
    /// Indexed like [`InfraFlag::all`].
    flag_counts: [u64; 5],
}

impl RiskTotals {
    fn add(&mut self, fact: &EnrichedFact<'_>, flags: InfraFlags, score: u8, threshold: u8) {
        self.stats.add(fact.fact, threshold);
        self.score_sum += u64::from(score);
        for (slot, &flag) in self.flag_counts.iter_mut().zip(InfraFlag::all()) {
            if flags.get(flag) {
                *slot += 1;
            }
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.stats = self.stats.merge(other.stats);
        self.score_sum += other.score_sum;
        for (slot, n) in self.flag_counts.iter_mut().zip(other.flag_counts) {
            *slot += n;
        }
        self
    }

    fn count(&self, flag: InfraFlag) -> u64 {
        InfraFlag::all()
            .iter()
            .position(|&f| f == flag)
            .and_then(|i| self.flag_counts.get(i))
            .copied()
            .unwrap_or_default()
    }

    #[allow(clippy::cast_precision_loss)]
    fn risk_score(&self, configured: &[InfraFlag]) -> f64 {
        if self.stats.count == 0 {
            return 0.0;
        }
        let weighted: u64 = configured
            .iter()
            .map(|&flag| self.count(flag) * flag.risk_weight())
            .sum();
        weighted as f64 / self.stats.count as f64
    }
}

/// One row per `(state, area type)`, sorted by state then area type.
///
/// `flags` maps accident ids to their infrastructure flags; a fact without
/// an entry counts as having none. Only configured flags contribute to
/// scores and counts.
#[must_use]
pub fn infrastructure_risk(
    facts: &[EnrichedFact<'_>],
    flags: &HashMap<&str, InfraFlags>,
    config: &WarehouseConfig,
) -> Vec<InfrastructureRiskRow> {
    let threshold = config.high_severity_threshold;
    let configured = config.infra_flags.as_slice();

    let flags_of = |f: &EnrichedFact<'_>| {
        let all = flags
            .get(f.fact.accident_id.as_str())
            .copied()
            .unwrap_or_default();
        let mut kept = InfraFlags::default();
        for &flag in configured {
            kept.set(flag, all.get(flag));
        }
        kept
    };

    let scores: Vec<f64> = facts
        .par_iter()
        .map(|f| f64::from(flags_of(f).count_of(configured)))
        .collect();
    let median_score = median(scores).unwrap_or_default();

    let groups = facts
        .par_iter()
        .fold(BTreeMap::<(String, AreaType), RiskTotals>::new, |mut groups, f| {
            let infra = flags_of(f);
            let score = infra.count_of(configured);
            let area = if f64::from(score) >= median_score {
                AreaType::Urban
            } else {
                AreaType::Rural
            };
            let state = f.location.state.clone().unwrap_or_default();
            groups
                .entry((state, area))
                .or_default()
                .add(f, infra, score, threshold);
            groups
        })
        .reduce(BTreeMap::new, |mut a, b| {
            for (key, totals) in b {
                let merged = a.remove(&key).unwrap_or_default().merge(totals);
                a.insert(key, merged);
            }
            a
        });

    let mut area_totals: BTreeMap<AreaType, u64> = BTreeMap::new();
    for ((_, area), totals) in &groups {
        *area_totals.entry(*area).or_insert(0) += totals.stats.count;
    }
    let median_risk = median(
        groups
            .values()
            .map(|totals| totals.risk_score(configured))
            .collect(),
    )
    .unwrap_or_default();

    groups
        .into_iter()
        .map(|((state, area_type), totals)| {
            let stats = totals.stats;
            let risk_score = totals.risk_score(configured);
            #[allow(clippy::cast_precision_loss)]
            let avg_infra_score = if stats.count == 0 {
                0.0
            } else {
                totals.score_sum as f64 / stats.count as f64
            };

            InfrastructureRiskRow {
                state,
                area_type,
                total_accidents: stats.count,
                high_severity_count: stats.high_severity,
                high_severity_rate: round3(stats.high_severity_rate()),
                avg_severity: round3(stats.avg_severity()),
                avg_duration_min: round3(stats.avg_duration_min()),
                avg_infra_score: round3(avg_infra_score),
                count_amenity: totals.count(InfraFlag::Amenity),
                count_crossing: totals.count(InfraFlag::Crossing),
                count_junction: totals.count(InfraFlag::Junction),
                count_stop: totals.count(InfraFlag::Stop),
                count_traffic_signal: totals.count(InfraFlag::TrafficSignal),
                infra_risk_score: round3(risk_score),
                is_high_risk: risk_score > median_risk,
                risk_category: InfraRiskCategory::classify(risk_score, stats.avg_severity()),
                pct_of_area_total: round3(percent(
                    stats.count,
                    area_totals.get(&area_type).copied().unwrap_or_default(),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::enrich;
    use crate::dimensions::build_dimensions;
    use crate::fact::assemble_facts;
    use crate::test_support::sample_records;

    fn run(config: &WarehouseConfig) -> Vec<InfrastructureRiskRow> {
        let records = sample_records();
        let flags: HashMap<&str, InfraFlags> =
            records.iter().map(|r| (r.id.as_str(), r.infra)).collect();
        let dims = build_dimensions(&records, config);
        let facts = assemble_facts(&records, &dims, config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();
        infrastructure_risk(&enriched, &flags, config)
    }

    #[test]
    fn weights_flags_per_state_and_area() {
        let rows = run(&WarehouseConfig::default());

        // Flag counts per accident have median 1, so only the two
        // accidents with no flags (A-6, A-8) are rural.
        let keys: Vec<(&str, AreaType)> =
            rows.iter().map(|r| (r.state.as_str(), r.area_type)).collect();
        assert_eq!(
            keys,
            vec![
                ("IL", AreaType::Urban),
                ("OH", AreaType::Rural),
                ("OH", AreaType::Urban),
                ("TX", AreaType::Rural),
                ("TX", AreaType::Urban),
            ]
        );

        // A-1, A-2, A-3, A-10: 2 crossings, 2 junctions, 3 signals.
        let il = &rows[0];
        assert_eq!(il.total_accidents, 4);
        assert_eq!(
            (il.count_crossing, il.count_junction, il.count_traffic_signal),
            (2, 2, 3)
        );
        assert!((il.infra_risk_score - 4.0).abs() < 1e-9);
        assert!((il.avg_infra_score - 1.75).abs() < 1e-9);
        assert!((il.avg_severity - 2.75).abs() < 1e-9);
        assert!((il.pct_of_area_total - 50.0).abs() < 1e-9);
        assert_eq!(il.risk_category, InfraRiskCategory::High);
        assert!(il.is_high_risk);

        let oh_urban = &rows[2];
        assert!((oh_urban.infra_risk_score - 2.5).abs() < 1e-9);
        assert_eq!(oh_urban.risk_category, InfraRiskCategory::Medium);
        assert!(!oh_urban.is_high_risk);

        let tx_urban = &rows[4];
        assert!((tx_urban.infra_risk_score - 3.5).abs() < 1e-9);
        assert_eq!(tx_urban.risk_category, InfraRiskCategory::High);
        assert!(tx_urban.is_high_risk);

        let tx_rural = &rows[3];
        assert!(tx_rural.infra_risk_score.abs() < f64::EPSILON);
        assert_eq!(tx_rural.risk_category, InfraRiskCategory::Low);
        assert!((tx_rural.pct_of_area_total - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unconfigured_flags_carry_no_weight() {
        let config = WarehouseConfig {
            infra_flags: vec![InfraFlag::TrafficSignal],
            ..WarehouseConfig::default()
        };
        let rows = run(&config);

        // Only Main St has signals, so the median score is 0 and every
        // accident is urban.
        assert!(rows.iter().all(|r| r.area_type == AreaType::Urban));
        assert!(rows.iter().all(|r| r.count_junction == 0 && r.count_crossing == 0));

        let il = rows.iter().find(|r| r.state == "IL").unwrap();
        assert_eq!(il.count_traffic_signal, 3);
        assert!((il.infra_risk_score - 1.5).abs() < 1e-9);
        assert_eq!(il.risk_category, InfraRiskCategory::Medium);
    }
}
