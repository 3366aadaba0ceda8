//! Writes a finished warehouse to disk.
//!
//! Layout under the output directory:
//!
//! ```text
//! dimensions/dim_time.csv
//! dimensions/dim_location.csv
//! dimensions/dim_weather.csv
//! fact/accident_detail.csv
//! aggregates/agg_*.csv
//! manifest.json
//! quality_report.json
//! ```
//!
//! Every table and the quality report are first written to a `.staging*`
//! directory inside the output directory, which is removed whether or not
//! the write succeeds. The previous manifest is deleted before staged files
//! are renamed into place and the new one is saved last, so a directory
//! whose swap was interrupted has no manifest and is always rebuilt.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use accident_warehouse_models::{InputFingerprint, MANIFEST_VERSION, Manifest, TableSummary};
use serde::Serialize;

use crate::{WarehouseBuild, WarehouseError};

/// Manifest file name, relative to the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Quality report file name, relative to the output directory.
pub const QUALITY_REPORT_FILE: &str = "quality_report.json";

/// Name prefix of the per-write staging directory.
const STAGING_PREFIX: &str = ".staging";

/// Every table the warehouse writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Table {
    DimTime,
    DimLocation,
    DimWeather,
    AccidentDetail,
    AggStateYear,
    AggNationalYear,
    AggCityPareto,
    AggTimePattern,
    AggWeatherImpact,
    AggInfrastructureImpact,
    AggInfrastructureRisk,
}

impl Table {
    /// All tables in write order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::DimTime,
            Self::DimLocation,
            Self::DimWeather,
            Self::AccidentDetail,
            Self::AggStateYear,
            Self::AggNationalYear,
            Self::AggCityPareto,
            Self::AggTimePattern,
            Self::AggWeatherImpact,
            Self::AggInfrastructureImpact,
            Self::AggInfrastructureRisk,
        ]
    }

    /// Table name, also its manifest key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DimTime => "dim_time",
            Self::DimLocation => "dim_location",
            Self::DimWeather => "dim_weather",
            Self::AccidentDetail => "accident_detail",
            Self::AggStateYear => "agg_state_year",
            Self::AggNationalYear => "agg_national_year",
            Self::AggCityPareto => "agg_city_pareto",
            Self::AggTimePattern => "agg_time_pattern",
            Self::AggWeatherImpact => "agg_weather_impact",
            Self::AggInfrastructureImpact => "agg_infrastructure_impact",
            Self::AggInfrastructureRisk => "agg_infrastructure_risk",
        }
    }

    /// Path relative to the output directory.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::DimTime => "dimensions/dim_time.csv",
            Self::DimLocation => "dimensions/dim_location.csv",
            Self::DimWeather => "dimensions/dim_weather.csv",
            Self::AccidentDetail => "fact/accident_detail.csv",
            Self::AggStateYear => "aggregates/agg_state_year.csv",
            Self::AggNationalYear => "aggregates/agg_national_year.csv",
            Self::AggCityPareto => "aggregates/agg_city_pareto.csv",
            Self::AggTimePattern => "aggregates/agg_time_pattern.csv",
            Self::AggWeatherImpact => "aggregates/agg_weather_impact.csv",
            Self::AggInfrastructureImpact => "aggregates/agg_infrastructure_impact.csv",
            Self::AggInfrastructureRisk => "aggregates/agg_infrastructure_risk.csv",
        }
    }
}

/// Writes every table, the quality report, and the manifest.
///
/// Returns the manifest that was saved.
///
/// # Errors
///
/// Returns an error if a directory, table, or JSON file cannot be written.
/// No staged file is left behind, and an existing manifest is gone once
/// any table has been replaced.
pub fn write_warehouse(
    dir: &Path,
    build: &WarehouseBuild,
    input: InputFingerprint,
    config_fingerprint: String,
) -> Result<Manifest, WarehouseError> {
    std::fs::create_dir_all(dir).map_err(|e| WarehouseError::io(dir, e))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dir)
        .map_err(|e| WarehouseError::io(dir, e))?;

    let mut tables = BTreeMap::new();
    for &table in Table::all() {
        let staged = staging.path().join(table.path());
        create_parent(&staged)?;
        let (row_count, key_count) = write_table(table, &staged, build)?;
        log::debug!("Staged {}: {row_count} rows", table.name());

        tables.insert(
            table.name().to_string(),
            TableSummary {
                path: table.path().to_string(),
                row_count,
                key_count,
            },
        );
    }
    write_json(&staging.path().join(QUALITY_REPORT_FILE), &build.quality)?;

    remove_manifest(dir)?;
    let files = Table::all()
        .iter()
        .map(|t| t.path())
        .chain(std::iter::once(QUALITY_REPORT_FILE));
    for file in files {
        let path = dir.join(file);
        create_parent(&path)?;
        std::fs::rename(staging.path().join(file), &path)
            .map_err(|e| WarehouseError::io(&path, e))?;
    }
    staging.close().map_err(|e| WarehouseError::io(dir, e))?;
    log::info!("Wrote {} tables to {}", tables.len(), dir.display());

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        input,
        config_fingerprint,
        tables,
    };
    save_manifest(dir, &manifest)?;

    Ok(manifest)
}

fn create_parent(path: &Path) -> Result<(), WarehouseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WarehouseError::io(parent, e))?;
    }
    Ok(())
}

fn remove_manifest(dir: &Path) -> Result<(), WarehouseError> {
    let path = dir.join(MANIFEST_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("Removed previous manifest {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WarehouseError::io(&path, e)),
    }
}

/// Writes one table and returns its `(row_count, key_count)`.
fn write_table(
    table: Table,
    path: &Path,
    build: &WarehouseBuild,
) -> Result<(u64, u64), WarehouseError> {
    let dims = &build.dimensions;
    let aggs = &build.aggregates;

    match table {
        Table::DimTime => write_csv(path, &dims.time.rows, |r| r.date_key.clone()),
        Table::DimLocation => write_csv(path, &dims.location.rows, |r| r.location_key.clone()),
        Table::DimWeather => write_csv(path, &dims.weather.rows, |r| r.weather_key.clone()),
        Table::AccidentDetail => write_csv(path, &build.facts.rows, |r| r.accident_id.clone()),
        Table::AggStateYear => {
            write_csv(path, &aggs.state_year, |r| format!("{}|{}", r.state, r.year))
        }
        Table::AggNationalYear => write_csv(path, &aggs.national_year, |r| r.year.to_string()),
        Table::AggCityPareto => write_csv(path, &aggs.city_pareto, |r| r.city.clone()),
        Table::AggTimePattern => {
            write_csv(path, &aggs.time_pattern, |r| format!("{}|{}", r.hour, r.day_of_week))
        }
        Table::AggWeatherImpact => write_csv(path, &aggs.weather_impact, |r| r.weather_key.clone()),
        Table::AggInfrastructureImpact => {
            write_csv(path, &aggs.infrastructure_impact, |r| r.infra_flag.to_string())
        }
        Table::AggInfrastructureRisk => {
            write_csv(path, &aggs.infrastructure_risk, |r| {
                format!("{}|{}", r.state, r.area_type)
            })
        }
    }
}

/// Serializes `rows` with a header and counts the distinct values of `key`.
fn write_csv<T, F>(path: &Path, rows: &[T], key: F) -> Result<(u64, u64), WarehouseError>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    let mut writer = csv::Writer::from_path(path).map_err(|e| WarehouseError::csv(path, e))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| WarehouseError::csv(path, e))?;
    }
    writer.flush().map_err(|e| WarehouseError::io(path, e))?;

    let keys: BTreeSet<String> = rows.iter().map(key).collect();
    Ok((rows.len() as u64, keys.len() as u64))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), WarehouseError> {
    let tmp = tmp_path(path);
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, contents).map_err(|e| WarehouseError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| WarehouseError::io(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Size and modification time of the input file.
///
/// # Errors
///
/// Returns [`WarehouseError::Io`] if the file's metadata cannot be read.
pub fn input_fingerprint(path: &Path) -> Result<InputFingerprint, WarehouseError> {
    let metadata = std::fs::metadata(path).map_err(|e| WarehouseError::io(path, e))?;
    let modified = metadata
        .modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

    Ok(InputFingerprint {
        path: path.display().to_string(),
        size_bytes: metadata.len(),
        modified,
    })
}

/// Loads the manifest from `dir/manifest.json`.
///
/// Returns `None` if the file does not exist or cannot be parsed.
#[must_use]
pub fn load_manifest(dir: &Path) -> Option<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        log::info!("No existing manifest found");
        return None;
    };
    match serde_json::from_str(&contents) {
        Ok(m) => {
            log::info!("Loaded manifest from {}", path.display());
            Some(m)
        }
        Err(e) => {
            log::warn!("Failed to parse manifest {}: {e}", path.display());
            None
        }
    }
}

/// Writes the manifest to `dir/manifest.json` via a temporary file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_manifest(dir: &Path, manifest: &Manifest) -> Result<(), WarehouseError> {
    let path = dir.join(MANIFEST_FILE);
    write_json(&path, manifest)?;
    log::info!("Saved manifest to {}", path.display());
    Ok(())
}

/// Whether the output directory must be rebuilt.
///
/// Returns `true` if any of: `force` is set, no manifest exists, the
/// manifest version differs, the input or config fingerprint changed, or a
/// table file is missing.
#[must_use]
pub fn needs_rebuild(
    manifest: Option<&Manifest>,
    dir: &Path,
    input: &InputFingerprint,
    config_fingerprint: &str,
    force: bool,
) -> bool {
    if force {
        return true;
    }

    let Some(m) = manifest else {
        return true;
    };

    if m.version != MANIFEST_VERSION {
        return true;
    }

    if m.input.size_bytes != input.size_bytes || m.input.modified != input.modified {
        return true;
    }

    if m.config_fingerprint != config_fingerprint {
        return true;
    }

    Table::all()
        .iter()
        .any(|t| !m.tables.contains_key(t.name()) || !dir.join(t.path()).exists())
}

#[cfg(test)]
mod tests {
    use accident_warehouse_models::WarehouseConfig;

    use super::*;
    use crate::build_warehouse;
    use crate::config::config_fingerprint;
    use crate::progress::null_progress;
    use crate::test_support::sample_records;

    fn fingerprint() -> InputFingerprint {
        InputFingerprint {
            path: "cleaned.csv".to_string(),
            size_bytes: 1234,
            modified: Some("2024-01-01T00:00:00+00:00".to_string()),
        }
    }

    fn write_sample(dir: &Path) -> Manifest {
        let config = WarehouseConfig::default();
        let build = build_warehouse(&sample_records(), &config, &null_progress()).unwrap();
        write_warehouse(dir, &build, fingerprint(), config_fingerprint(&config).unwrap()).unwrap()
    }

    #[test]
    fn writes_every_table_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_sample(dir.path());

        for table in Table::all() {
            let path = dir.path().join(table.path());
            assert!(path.exists(), "{} missing", table.path());
            assert!(!tmp_path(&path).exists());
            assert!(manifest.tables.contains_key(table.name()));
        }
        assert!(dir.path().join(QUALITY_REPORT_FILE).exists());

        assert_eq!(manifest.tables["accident_detail"].row_count, 10);
        assert_eq!(manifest.tables["accident_detail"].key_count, 10);
        assert_eq!(manifest.tables["agg_time_pattern"].row_count, 168);
        assert_eq!(manifest.tables["agg_national_year"].row_count, 2);
        assert_eq!(manifest.tables["agg_infrastructure_risk"].key_count, 5);
        assert_eq!(manifest.tables["dim_weather"].key_count, 6);
        assert_eq!(manifest.tables["dim_time"].path, "dimensions/dim_time.csv");

        assert_eq!(load_manifest(dir.path()), Some(manifest));
    }

    #[test]
    fn fact_csv_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());

        let path = dir.path().join("fact/accident_detail.csv");
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(
            headers,
            vec![
                "accident_id",
                "severity",
                "date_key",
                "location_key",
                "weather_key",
                "start_time",
                "end_time",
                "duration_minutes",
                "description",
            ]
        );
        assert_eq!(reader.records().count(), 10);
    }

    #[test]
    fn repeated_builds_write_identical_tables() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_sample(a.path());

        let config = WarehouseConfig::default();
        let mut shuffled = sample_records();
        shuffled.reverse();
        let build = build_warehouse(&shuffled, &config, &null_progress()).unwrap();
        let config_fp = config_fingerprint(&config).unwrap();
        write_warehouse(b.path(), &build, fingerprint(), config_fp).unwrap();

        for table in Table::all() {
            let left = std::fs::read(a.path().join(table.path())).unwrap();
            let right = std::fs::read(b.path().join(table.path())).unwrap();
            assert_eq!(left, right, "{} differs", table.path());
        }
    }

    /// Every path under `dir` whose name ends in `.tmp` or starts with
    /// `.staging`.
    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.ends_with(".tmp") || name.starts_with(STAGING_PREFIX) {
                found.push(path.clone());
            }
            if path.is_dir() {
                found.extend(leftovers(&path));
            }
        }
        found
    }

    #[test]
    fn successful_write_leaves_no_staging() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        assert_eq!(leftovers(dir.path()), Vec::<PathBuf>::new());
    }

    #[test]
    fn failed_swap_cleans_up_and_invalidates_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_sample(dir.path());

        // A non-empty directory where a table should go makes its rename
        // fail after earlier tables were already replaced.
        let blocked = dir.path().join("aggregates/agg_city_pareto.csv");
        std::fs::remove_file(&blocked).unwrap();
        std::fs::create_dir_all(blocked.join("inner")).unwrap();

        let config = WarehouseConfig::default();
        let build = build_warehouse(&sample_records(), &config, &null_progress()).unwrap();
        let config_fp = config_fingerprint(&config).unwrap();
        let result = write_warehouse(dir.path(), &build, fingerprint(), config_fp);

        assert!(matches!(result, Err(WarehouseError::Io { .. })));
        assert_eq!(leftovers(dir.path()), Vec::<PathBuf>::new());
        assert_eq!(load_manifest(dir.path()), None);
        assert!(needs_rebuild(
            load_manifest(dir.path()).as_ref(),
            dir.path(),
            &fingerprint(),
            &manifest.config_fingerprint,
            false
        ));
    }

    #[test]
    fn rebuild_decision() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_sample(dir.path());
        let config_fp = manifest.config_fingerprint.clone();

        assert!(!needs_rebuild(Some(&manifest), dir.path(), &fingerprint(), &config_fp, false));
        assert!(needs_rebuild(Some(&manifest), dir.path(), &fingerprint(), &config_fp, true));
        assert!(needs_rebuild(None, dir.path(), &fingerprint(), &config_fp, false));
        assert!(needs_rebuild(Some(&manifest), dir.path(), &fingerprint(), "other", false));

        let touched = InputFingerprint {
            size_bytes: 99,
            ..fingerprint()
        };
        assert!(needs_rebuild(Some(&manifest), dir.path(), &touched, &config_fp, false));

        std::fs::remove_file(dir.path().join("aggregates/agg_city_pareto.csv")).unwrap();
        assert!(needs_rebuild(Some(&manifest), dir.path(), &fingerprint(), &config_fp, false));
    }

    #[test]
    fn unparseable_manifest_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();
        assert_eq!(load_manifest(dir.path()), None);
    }

    #[test]
    fn input_fingerprint_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.csv");
        std::fs::write(&path, "ID\n").unwrap();

        let fp = input_fingerprint(&path).unwrap();
        assert_eq!(fp.size_bytes, 3);
        assert!(fp.modified.is_some());
        assert!(input_fingerprint(&dir.path().join("missing.csv")).is_err());
    }
}
