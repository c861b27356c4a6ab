use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand, ValueEnum};
use dlt_core::RecordType;

#[derive(Parser, Debug)]
#[command(
    name = "dlt",
    author,
    version,
    disable_help_subcommand = true,
    about = "Inspect and maintain a directory of downloaded package tarballs."
)]
pub struct DltCli {
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[arg(long, help = "Emit machine-readable JSON on stdout", global = true)]
    pub json: bool,
    #[arg(
        long,
        value_parser = value_parser!(PathBuf),
        help = "Tracker directory (overrides DLT_TRACKER_PATH)",
        global = true
    )]
    pub root: Option<PathBuf>,
    #[command(subcommand)]
    pub command: DltCommand,
}

#[derive(Subcommand, Debug)]
pub enum DltCommand {
    #[command(
        about = "Check every tracked tarball and alias; repairs index schema drift in place.",
        after_help = "Exits with status 1 when content problems are found.\n"
    )]
    Audit,
    #[command(
        about = "Look up a tracked tarball, or list everything in one table.",
        override_usage = "dlt show <TYPE> [NAME] [SPEC]",
        after_help = "Examples:\n  dlt show semver lodash ^4\n  dlt show git github.com/npm/cli v8.0.0\n  dlt show url https://example.com/pkg.tgz\n  dlt show tag react next\n  dlt show semver\n"
    )]
    Show(ShowArgs),
    #[command(about = "Discard the index and rebuild it from the tarball filenames.")]
    Rebuild,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[arg(value_enum, help = "Table to search")]
    pub table: TableArg,
    #[arg(help = "Package name, or repo as <domain>/<path> for git; omit to list the table")]
    pub name: Option<String>,
    #[arg(help = "Version, range, tag, committish, or url")]
    pub spec: Option<String>,
    #[arg(long, help = "Read versions and ranges loosely")]
    pub loose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableArg {
    Semver,
    Tag,
    Git,
    Url,
}

impl From<TableArg> for RecordType {
    fn from(value: TableArg) -> Self {
        match value {
            TableArg::Semver => Self::Semver,
            TableArg::Tag => Self::Tag,
            TableArg::Git => Self::Git,
            TableArg::Url => Self::Url,
        }
    }
}
