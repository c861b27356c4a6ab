use std::path::Path;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use dlt_core::{Config, DownloadTracker, RecordType, TrackerRecord};
use serde_json::json;

mod cli;

use cli::{DltCli, DltCommand, ShowArgs};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = DltCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => Config::from_env().map_err(|err| eyre!("{err:#}"))?.tracker.path,
    };
    let code = match &cli.command {
        DltCommand::Audit => audit(&root, cli.json)?,
        DltCommand::Show(args) => show(&root, args, cli.json)?,
        DltCommand::Rebuild => rebuild(&root, cli.json)?,
    };

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("dlt_core={level},dlt={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn open(root: &Path) -> Result<DownloadTracker> {
    DownloadTracker::open(root).map_err(|err| eyre!("{err:#}"))
}

fn audit(root: &Path, as_json: bool) -> Result<i32> {
    let mut tracker = open(root)?;
    let issues = tracker.audit();
    let written = tracker.serialize().map_err(|err| eyre!("{err:#}"))?;

    if as_json {
        let payload = json!({
            "root": tracker.root().display().to_string(),
            "status": if issues.is_empty() { "ok" } else { "issues" },
            "indexWritten": written,
            "issues": issues,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if issues.is_empty() {
        println!(
            "{}: {} records, no problems found",
            tracker.root().display(),
            tracker.records().len()
        );
    } else {
        for issue in &issues {
            println!("[{}] {} {}: {}", issue.code, issue.kind, issue.key, issue.message);
        }
        println!("{} problem(s) found", issues.len());
    }
    Ok(i32::from(!issues.is_empty()))
}

fn show(root: &Path, args: &ShowArgs, as_json: bool) -> Result<i32> {
    let tracker = open(root)?;
    let kind = RecordType::from(args.table);

    let Some(name) = args.name.as_deref() else {
        let entries = tracker
            .records()
            .into_iter()
            .filter(|entry| entry.kind == kind)
            .collect::<Vec<_>>();
        if as_json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else {
            for entry in &entries {
                println!("{}  {}", entry.key, entry.record.filename);
            }
        }
        return Ok(0);
    };

    let (name, spec) = match (kind, args.spec.as_deref()) {
        (RecordType::Url, None) => ("", name),
        (_, Some(spec)) => (name, spec),
        (RecordType::Semver, None) => (name, "*"),
        (RecordType::Tag, None) => (name, "latest"),
        (_, None) => (name, ""),
    };
    let found = if args.loose {
        tracker.get_data_loose(kind, name, spec)
    } else {
        tracker.get_data(kind, name, spec)
    };

    match found {
        Some(record) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                print_record(record);
            }
            Ok(0)
        }
        None => {
            if as_json {
                println!("null");
            } else {
                println!("no {kind} record for {name} {spec}");
            }
            Ok(1)
        }
    }
}

fn print_record(record: &TrackerRecord) {
    println!("filename  {}", record.filename);
    let fields = [
        ("name", &record.name),
        ("version", &record.version),
        ("spec", &record.spec),
        ("repo", &record.repo),
        ("commit", &record.commit),
        ("resolved", &record.resolved),
        ("integrity", &record.integrity),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{label:<9} {value}");
        }
    }
    if let Some(refs) = &record.refs {
        println!("refs      {}", refs.join(", "));
    }
}

fn rebuild(root: &Path, as_json: bool) -> Result<i32> {
    let mut tracker = DownloadTracker::rebuild(root).map_err(|err| eyre!("{err:#}"))?;
    tracker.serialize().map_err(|err| eyre!("{err:#}"))?;
    let restored = tracker.records().len();
    if as_json {
        let payload = json!({ "root": tracker.root().display().to_string(), "records": restored });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "rebuilt {} from {restored} tarball(s)",
            tracker.root().join(dlt_core::INDEX_FILENAME).display()
        );
    }
    Ok(0)
}
