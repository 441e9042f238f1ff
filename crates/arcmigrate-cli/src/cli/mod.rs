//! Command-line interface definition and dispatch.

pub mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Migrate clinical-study participants from frozen data exports into the
/// target participant directory.
#[derive(Debug, Parser)]
#[command(name = "arcmigrate", version, about)]
pub struct Cli {
    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Root directory of the local mirror store.
    #[arg(long, global = true, default_value = ".arcmigrate")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stage, classify, deduplicate, and migrate every exported participant.
    Migrate {
        /// Directory holding the unzipped data exports.
        #[arg(long)]
        export_dir: PathBuf,
    },
    /// Migrate a single participant located by device ID.
    MigrateOne {
        #[arg(long)]
        device_id: String,
        /// Directory holding the unzipped data exports.
        #[arg(long)]
        export_dir: PathBuf,
    },
    /// Move one of a participant's test cycles to a new calendar date.
    Reschedule {
        #[arg(long)]
        arc_id: String,
        /// Target date for the cycle's first session, YYYY-MM-DD.
        #[arg(long)]
        date: String,
        /// Test cycle to move, 1-indexed.
        #[arg(long, default_value_t = 1)]
        cycle: u32,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let format = if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        match self.command {
            Commands::Migrate { export_dir } => {
                commands::migrate::run_migrate(&export_dir, &self.store, format)
            }
            Commands::MigrateOne {
                device_id,
                export_dir,
            } => commands::migrate::run_migrate_one(&device_id, &export_dir, &self.store, format),
            Commands::Reschedule {
                arc_id,
                date,
                cycle,
            } => commands::reschedule::run_reschedule(
                &self.store,
                &arc_id,
                &date,
                cycle,
                format,
                &mut io::stdin().lock(),
            ),
        }
    }
}
