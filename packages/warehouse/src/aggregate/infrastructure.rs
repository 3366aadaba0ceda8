//! `agg_infrastructure_impact`: accidents at locations with and without
//! each infrastructure feature.

use accident_warehouse_models::{InfrastructureImpactRow, WarehouseConfig};

use super::{EnrichedFact, pct_change, round3, total_where};

/// One row per configured flag, in configuration order.
///
/// A fact counts as "present" when its location has at least one accident
/// with the flag set.
#[must_use]
pub fn infrastructure_impact(
    facts: &[EnrichedFact<'_>],
    config: &WarehouseConfig,
) -> Vec<InfrastructureImpactRow> {
    let threshold = config.high_severity_threshold;

    config
        .infra_flags
        .iter()
        .map(|&flag| {
            let present = total_where(facts, threshold, |f| f.location.has_flag(flag));
            let absent = total_where(facts, threshold, |f| !f.location.has_flag(flag));

            let severity_impact_pct = if present.count == 0 || absent.count == 0 {
                0.0
            } else {
                pct_change(present.avg_severity(), absent.avg_severity()).unwrap_or(0.0)
            };

            InfrastructureImpactRow {
                infra_flag: flag,
                present_count: present.count,
                present_avg_severity: round3(present.avg_severity()),
                present_avg_duration_min: round3(present.avg_duration_min()),
                absent_count: absent.count,
                absent_avg_severity: round3(absent.avg_severity()),
                absent_avg_duration_min: round3(absent.avg_duration_min()),
                severity_impact_pct: round3(severity_impact_pct),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use accident_warehouse_accident_models::InfraFlag;

    use super::*;
    use crate::aggregate::enrich;
    use crate::dimensions::build_dimensions;
    use crate::fact::assemble_facts;
    use crate::test_support::sample_records;

    fn run(config: &WarehouseConfig) -> Vec<InfrastructureImpactRow> {
        let records = sample_records();
        let dims = build_dimensions(&records, config);
        let facts = assemble_facts(&records, &dims, config).unwrap();
        let enriched = enrich(&facts.rows, &dims).unwrap();
        infrastructure_impact(&enriched, config)
    }

    #[test]
    fn splits_on_location_flag() {
        let rows = run(&WarehouseConfig::default());
        assert_eq!(rows.len(), InfraFlag::all().len());

        for row in &rows {
            assert_eq!(row.present_count + row.absent_count, 10);
        }

        // Traffic signals are recorded exactly on Main St (A-1, A-2, A-10).
        let signal = rows
            .iter()
            .find(|r| r.infra_flag == InfraFlag::TrafficSignal)
            .unwrap();
        assert_eq!(signal.present_count, 3);
        assert!((signal.present_avg_severity - 2.333).abs() < 1e-9);
        assert!((signal.absent_avg_severity - 2.571).abs() < 1e-9);
        assert!(signal.severity_impact_pct < 0.0);
    }

    #[test]
    fn follows_configured_flags() {
        let config = WarehouseConfig {
            infra_flags: vec![InfraFlag::Stop, InfraFlag::Crossing],
            ..WarehouseConfig::default()
        };
        let rows = run(&config);
        let flags: Vec<InfraFlag> = rows.iter().map(|r| r.infra_flag).collect();
        assert_eq!(flags, vec![InfraFlag::Stop, InfraFlag::Crossing]);

        // Nothing in the sample has a stop sign.
        assert_eq!(rows[0].present_count, 0);
        assert!(rows[0].severity_impact_pct.abs() < f64::EPSILON);
    }
}
