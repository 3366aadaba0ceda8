//! Subcommand implementations shared by the flag-driven and interactive
//! entry points.

use std::path::Path;
use std::time::Instant;

use accident_warehouse::build_warehouse;
use accident_warehouse::config::{config_fingerprint, config_to_toml, load_config};
use accident_warehouse::output::{input_fingerprint, load_manifest, needs_rebuild, write_warehouse};
use accident_warehouse::reader::read_records;
use accident_warehouse::verify::verify_output;
use accident_warehouse_cli_utils::{IndicatifProgress, MultiProgress};

/// Reads `input`, builds the warehouse, and writes it to `output`.
///
/// Skips the build when the manifest in `output` already matches the
/// input and configuration, unless `force` is set.
///
/// # Errors
///
/// Returns an error if the config or input is invalid, the build fails,
/// or the output cannot be written.
pub fn build(
    multi: &MultiProgress,
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let fingerprint = input_fingerprint(input)?;
    let config_fp = config_fingerprint(&config)?;

    let manifest = load_manifest(output);
    if !needs_rebuild(manifest.as_ref(), output, &fingerprint, &config_fp, force) {
        log::info!(
            "{} is up to date with {} (use --force to rebuild)",
            output.display(),
            input.display()
        );
        return Ok(());
    }

    let reading = IndicatifProgress::spinner(multi, &format!("Reading {}...", input.display()));
    let records = read_records(input)?;
    reading.finish(format!("Read {} records", records.len()));

    let stages = IndicatifProgress::steps_bar(multi, "Building warehouse");
    let build = build_warehouse(&records, &config, &stages)?;

    let writing = IndicatifProgress::spinner(multi, &format!("Writing {}...", output.display()));
    std::fs::create_dir_all(output)?;
    let manifest = write_warehouse(output, &build, fingerprint, config_fp)?;
    writing.finish(format!("Wrote {} tables", manifest.tables.len()));

    log::info!(
        "Build complete in {:.1}s: {} facts, {} data-quality warnings",
        start.elapsed().as_secs_f64(),
        build.facts.rows.len(),
        build.quality.total_warnings
    );

    Ok(())
}

/// Prints the verification report for `output`.
///
/// # Errors
///
/// Returns an error if a table cannot be read or any check fails.
pub fn verify(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let report = verify_output(output)?;
    println!("{report}");

    if !report.all_passed() {
        return Err(format!("Verification failed for {}", output.display()).into());
    }
    Ok(())
}

/// Prints the effective configuration as TOML.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or is invalid.
pub fn print_config(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    print!("{}", config_to_toml(&config)?);
    Ok(())
}
