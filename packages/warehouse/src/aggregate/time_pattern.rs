//! `agg_time_pattern`: the full hour-of-day by day-of-week matrix.

use accident_warehouse_models::{TimePatternRow, WarehouseConfig};

use super::{EnrichedFact, group_stats, round1, round3};
use crate::dimensions::time::DAY_NAMES;

/// Hours in a day.
pub const HOURS: u32 = 24;

/// Days in a week.
pub const DAYS: u32 = 7;

/// Emits all 168 cells sorted by `(hour, day_of_week)`, including cells
/// with no accidents.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn time_pattern(facts: &[EnrichedFact<'_>], config: &WarehouseConfig) -> Vec<TimePatternRow> {
    let cells = group_stats(facts, config.high_severity_threshold, |f| (f.hour, f.day_of_week));
    let max_count = cells.values().map(|s| s.count).max().unwrap_or(0);

    let mut rows = Vec::with_capacity((HOURS * DAYS) as usize);
    for hour in 0..HOURS {
        for day_of_week in 0..DAYS {
            let stats = cells.get(&(hour, day_of_week)).copied().unwrap_or_default();
            let hotspot_score = if max_count == 0 {
                0.0
            } else {
                round1(stats.count as f64 / max_count as f64 * 10.0)
            };

            rows.push(TimePatternRow {
                hour,
                day_of_week,
                day_name: DAY_NAMES[day_of_week as usize].to_string(),
                total_accidents: stats.count,
                avg_severity: round3(stats.avg_severity()),
                avg_duration_min: round3(stats.avg_duration_min()),
                time_period: config.time_period(hour).unwrap_or_default().to_string(),
                is_peak: config.is_peak(hour),
                is_weekend: day_of_week >= 5,
                hotspot_score,
            });
        }
    }

    rows
}
