//! Interactive menu.
//!
//! Provides a terminal-based UI using `dialoguer` that asks for the same
//! inputs as the subcommands, for users who would rather not remember the
//! flags.

use std::path::PathBuf;

use accident_warehouse_cli_utils::MultiProgress;
use dialoguer::{Confirm, Input, Select};

use crate::commands;

/// Top-level actions.
enum Action {
    Build,
    Verify,
    ShowConfig,
}

impl Action {
    const ALL: &[Self] = &[Self::Build, Self::Verify, Self::ShowConfig];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Build => "Build warehouse",
            Self::Verify => "Verify output directory",
            Self::ShowConfig => "Show effective configuration",
        }
    }
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if user input fails or the selected action fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Accident Warehouse");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Build => {
            let input: String = Input::new()
                .with_prompt("Cleaned input CSV")
                .default("data/cleaned.csv".to_string())
                .interact_text()?;
            let output = prompt_output()?;
            let config = prompt_config()?;
            let force = Confirm::new()
                .with_prompt("Force rebuild?")
                .default(false)
                .interact()?;

            commands::build(
                multi,
                &PathBuf::from(input.trim()),
                &output,
                config.as_deref(),
                force,
            )?;
        }
        Action::Verify => commands::verify(&prompt_output()?)?,
        Action::ShowConfig => commands::print_config(prompt_config()?.as_deref())?,
    }

    Ok(())
}

fn prompt_output() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let output: String = Input::new()
        .with_prompt("Output directory")
        .default("data/warehouse".to_string())
        .interact_text()?;
    Ok(PathBuf::from(output.trim()))
}

fn prompt_config() -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let config: String = Input::new()
        .with_prompt("Config file (leave empty for defaults)")
        .allow_empty(true)
        .interact_text()?;

    Ok(if config.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(config.trim()))
    })
}
