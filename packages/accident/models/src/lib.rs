#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Cleaned accident record type and accident domain enums.
//!
//! This crate defines the read-only input contract of the warehouse: one
//! [`CleanedRecord`] per validated, type-normalized accident observation,
//! together with the small closed vocabularies (severity levels,
//! infrastructure flags, weather categories) that the rest of the system
//! keys on.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity level of an accident, from 1 (minor) to 4 (severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccidentSeverity {
    /// Level 1: short delay, little impact on traffic
    Minor = 1,
    /// Level 2: moderate impact on traffic
    Moderate = 2,
    /// Level 3: significant impact on traffic
    Serious = 3,
    /// Level 4: long delay, road closures
    Severe = 4,
}

impl AccidentSeverity {
    /// Returns the numeric value of this severity level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity level from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-4.
    pub const fn from_value(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Minor),
            2 => Ok(Self::Moderate),
            3 => Ok(Self::Serious),
            4 => Ok(Self::Severe),
            _ => Err(InvalidSeverityError { value }),
        }
    }
}

/// Error returned when attempting to create an [`AccidentSeverity`] from an
/// invalid numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeverityError {
    /// The invalid severity value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid severity value {}: expected 1-4", self.value)
    }
}

impl std::error::Error for InvalidSeverityError {}

/// Road infrastructure features that may be present near an accident.
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
pub enum InfraFlag {
    /// Amenity (gas station, parking lot, ...) nearby
    Amenity,
    /// Pedestrian crossing nearby
    Crossing,
    /// Road junction nearby
    Junction,
    /// Stop sign nearby
    Stop,
    /// Traffic signal nearby
    TrafficSignal,
}

impl InfraFlag {
    /// Returns all variants of this enum in canonical column order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Amenity,
            Self::Crossing,
            Self::Junction,
            Self::Stop,
            Self::TrafficSignal,
        ]
    }

    /// Returns the name of the cleaned-data column holding this flag.
    #[must_use]
    pub const fn source_column(self) -> &'static str {
        match self {
            Self::Amenity => "Amenity",
            Self::Crossing => "Crossing",
            Self::Junction => "Junction",
            Self::Stop => "Stop",
            Self::TrafficSignal => "Traffic_Signal",
        }
    }

    /// Weight of this flag in the infrastructure risk score.
    ///
    /// Junctions count most, signals and crossings double, stops and
    /// amenities once.
    #[must_use]
    pub const fn risk_weight(self) -> u64 {
        match self {
            Self::Junction => 3,
            Self::TrafficSignal | Self::Crossing => 2,
            Self::Stop | Self::Amenity => 1,
        }
    }
}

/// Canonical weather category derived from free-text weather conditions.
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
pub enum WeatherCategory {
    /// No recognized adverse condition (also used for missing text)
    Clear,
    /// Cloud cover or overcast sky
    Cloudy,
    /// Fog, mist, or haze
    Fog,
    /// Rain, drizzle, or showers
    Rain,
    /// Snow, ice, sleet, or freezing precipitation
    Snow,
    /// Wind, storms, or thunder
    Windy,
}

impl WeatherCategory {
    /// Returns the base risk score for this category, from 0 (clear) to
    /// 5 (fog).
    #[must_use]
    pub const fn base_risk(self) -> u8 {
        match self {
            Self::Clear => 0,
            Self::Cloudy => 1,
            Self::Windy => 2,
            Self::Rain => 3,
            Self::Snow => 4,
            Self::Fog => 5,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Clear,
            Self::Cloudy,
            Self::Fog,
            Self::Rain,
            Self::Snow,
            Self::Windy,
        ]
    }
}

/// Infrastructure proximity flags carried by a single record.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InfraFlags {
    /// Amenity nearby.
    pub amenity: bool,
    /// Crossing nearby.
    pub crossing: bool,
    /// Junction nearby.
    pub junction: bool,
    /// Stop sign nearby.
    pub stop: bool,
    /// Traffic signal nearby.
    pub traffic_signal: bool,
}

impl InfraFlags {
    /// Returns whether the given flag is set.
    #[must_use]
    pub const fn get(&self, flag: InfraFlag) -> bool {
        match flag {
            InfraFlag::Amenity => self.amenity,
            InfraFlag::Crossing => self.crossing,
            InfraFlag::Junction => self.junction,
            InfraFlag::Stop => self.stop,
            InfraFlag::TrafficSignal => self.traffic_signal,
        }
    }

    /// Sets the given flag.
    pub const fn set(&mut self, flag: InfraFlag, value: bool) {
        match flag {
            InfraFlag::Amenity => self.amenity = value,
            InfraFlag::Crossing => self.crossing = value,
            InfraFlag::Junction => self.junction = value,
            InfraFlag::Stop => self.stop = value,
            InfraFlag::TrafficSignal => self.traffic_signal = value,
        }
    }

    /// Number of `flags` that are set.
    #[must_use]
    pub fn count_of(&self, flags: &[InfraFlag]) -> u8 {
        let set = flags.iter().filter(|&&flag| self.get(flag)).count();
        u8::try_from(set).unwrap_or(u8::MAX)
    }
}

/// One cleaned accident observation.
///
/// Produced by the external cleaning step; the warehouse treats it as
/// read-only. Optional text fields are `None` when the source cell was
/// empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    /// Source accident identifier (e.g. `"A-1"`).
    pub id: String,
    /// Severity level.
    pub severity: AccidentSeverity,
    /// Local start time of the accident's impact on traffic.
    pub start_time: NaiveDateTime,
    /// Local end time of the accident's impact on traffic.
    pub end_time: NaiveDateTime,
    /// Duration in minutes as computed by the cleaning step, if present.
    pub duration_min: Option<f64>,
    /// Street name.
    pub street: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// County name.
    pub county: Option<String>,
    /// State abbreviation.
    pub state: Option<String>,
    /// Zip code.
    pub zip: Option<String>,
    /// Timezone name (e.g. `"US/Eastern"`).
    pub timezone: Option<String>,
    /// Free-text weather condition (e.g. `"Light Rain"`).
    pub weather_condition: Option<String>,
    /// Temperature in Fahrenheit.
    pub temperature_f: Option<f64>,
    /// Visibility in miles.
    pub visibility_mi: Option<f64>,
    /// Free-text description.
    pub description: Option<String>,
    /// Infrastructure proximity flags.
    pub infra: InfraFlags,
}

impl CleanedRecord {
    /// Returns whether the given infrastructure flag is set on this record.
    #[must_use]
    pub const fn has_flag(&self, flag: InfraFlag) -> bool {
        self.infra.get(flag)
    }
}
