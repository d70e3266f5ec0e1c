//! Tests for status and checksum.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_status() {
    match parse(&["lanexfer", "status", "out.bin"]) {
        CliCommand::Status { dest } => assert_eq!(dest, PathBuf::from("out.bin")),
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_checksum() {
    match parse(&["lanexfer", "checksum", "/tmp/x.bin"]) {
        CliCommand::Checksum { path } => assert_eq!(path, PathBuf::from("/tmp/x.bin")),
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["lanexfer", "serve"]).is_err());
}
