//! CLI for the lanexfer transfer engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lanexfer_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_copy, run_status, CopyArgs};

/// Top-level CLI for lanexfer.
#[derive(Debug, Parser)]
#[command(name = "lanexfer")]
#[command(about = "lanexfer: resumable multi-lane file transfer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Copy a local file, resuming an interrupted copy when possible.
    Copy {
        /// Source file.
        src: PathBuf,
        /// Destination file.
        dest: PathBuf,
        /// Concurrent lanes (default from config).
        #[arg(long, value_name = "N")]
        lanes: Option<usize>,
        /// Bytes each lane reads per round trip.
        #[arg(long, value_name = "BYTES")]
        block_size: Option<u64>,
        /// Bytes a lane buffers before committing to disk.
        #[arg(long, value_name = "BYTES")]
        cache_bytes: Option<u64>,
        /// Discard any saved progress and start over.
        #[arg(long)]
        no_resume: bool,
        /// Replace an existing destination.
        #[arg(long)]
        overwrite: bool,
        /// Skip SHA-256 verification at the end.
        #[arg(long)]
        no_verify: bool,
    },

    /// Show saved progress of an interrupted transfer into DEST.
    Status {
        /// Destination file of the transfer.
        dest: PathBuf,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Copy {
                src,
                dest,
                lanes,
                block_size,
                cache_bytes,
                no_resume,
                overwrite,
                no_verify,
            } => {
                let args = CopyArgs {
                    src,
                    dest,
                    lanes,
                    block_size,
                    cache_bytes,
                    resume: !no_resume,
                    overwrite,
                    verify: !no_verify,
                };
                run_copy(&cfg, args).await?;
            }
            CliCommand::Status { dest } => run_status(&cfg, &dest)?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
