//! Record fixtures shared by unit tests.

use accident_warehouse_accident_models::{AccidentSeverity, CleanedRecord, InfraFlags};
use chrono::{Duration, NaiveDateTime};

/// A clear-weather, severity-2 accident on Main St, Springfield, IL that
/// lasted 30 minutes from `start` (`YYYY-MM-DD HH:MM:SS`).
pub fn record(id: &str, start: &str) -> CleanedRecord {
    let start_time = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S").unwrap();
    CleanedRecord {
        id: id.to_string(),
        severity: AccidentSeverity::Moderate,
        start_time,
        end_time: start_time + Duration::minutes(30),
        duration_min: Some(30.0),
        street: Some("Main St".to_string()),
        city: Some("Springfield".to_string()),
        county: Some("Sangamon".to_string()),
        state: Some("IL".to_string()),
        zip: Some("62701".to_string()),
        timezone: Some("US/Central".to_string()),
        weather_condition: Some("Clear".to_string()),
        temperature_f: Some(55.0),
        visibility_mi: Some(10.0),
        description: Some("Accident on Main St".to_string()),
        infra: InfraFlags::default(),
    }
}

/// Returns `severity` as a typed level.
pub fn severity(value: u8) -> AccidentSeverity {
    AccidentSeverity::from_value(value).unwrap()
}

/// A small mixed data set spanning three states, two years, several
/// cities, and every weather category.
pub fn sample_records() -> Vec<CleanedRecord> {
    let fixtures: &[(&str, &str, u8, &str, &str, &str, &str, u32)] = &[
        ("A-1", "2020-03-02 07:10:00", 2, "Main St", "Springfield", "IL", "Light Rain", 25),
        ("A-2", "2020-03-02 08:30:00", 3, "Main St", "Springfield", "IL", "Heavy Rain", 45),
        ("A-3", "2020-07-04 17:45:00", 4, "Oak Ave", "Springfield", "IL", "Fog", 120),
        ("A-4", "2021-01-15 12:00:00", 2, "Broadway", "Columbus", "OH", "Clear", 30),
        ("A-5", "2021-01-16 23:20:00", 1, "Broadway", "Columbus", "OH", "Light Snow", 60),
        ("A-6", "2021-06-19 14:05:00", 2, "High St", "Columbus", "OH", "Partly Cloudy", 20),
        ("A-7", "2021-06-20 09:00:00", 3, "1st Ave", "Austin", "TX", "Thunderstorm", 90),
        ("A-8", "2020-11-11 18:15:00", 2, "1st Ave", "Austin", "TX", "Clear", 35),
        ("A-9", "2021-11-11 18:15:00", 4, "Congress Ave", "Austin", "TX", "Overcast", 240),
        ("A-10", "2021-02-01 06:50:00", 2, "Main St", "Springfield", "IL", "Fair", 15),
    ];

    fixtures.iter()
        .enumerate()
        .map(|(i, (id, start, sev, street, city, state, weather, minutes))| {
            let base = record(id, start);
            let mut infra = InfraFlags::default();
            infra.crossing = i % 2 == 0;
            infra.junction = i % 3 == 0;
            infra.traffic_signal = *street == "Main St";
            CleanedRecord {
                severity: severity(*sev),
                end_time: base.start_time + Duration::minutes(i64::from(*minutes)),
                duration_min: Some(f64::from(*minutes)),
                street: Some((*street).to_string()),
                city: Some((*city).to_string()),
                state: Some((*state).to_string()),
                weather_condition: Some((*weather).to_string()),
                infra,
                ..base
            }
        })
        .collect()
}
