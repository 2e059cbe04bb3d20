use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use diffinspect::image_io::load_image;
use diffinspect::logger::DualLogger;
use diffinspect::settings::load_settings;
use diffinspect::{GridScanner, ScanEvent, ScanOutcome};

fn parse_args() -> Result<(PathBuf, PathBuf)> {
    let mut args = std::env::args_os().skip(1);
    match (args.next(), args.next(), args.next()) {
        (Some(reference), Some(test), None) => Ok((reference.into(), test.into())),
        _ => bail!("usage: diffinspect <reference> <test>"),
    }
}

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "diffinspect=info");
    }
    DualLogger::init().context("failed to install logger")?;

    let (reference_path, test_path) = parse_args()?;
    let config = load_settings();
    let reference = load_image(&reference_path)?;
    let test = load_image(&test_path)?;

    let handle = GridScanner::new(&config)?.spawn(reference, test);
    for event in &handle.events {
        if let ScanEvent::Progress { progress, label } = event {
            eprintln!("[{:3}%] {}", progress, label);
        }
    }

    match handle.wait()? {
        ScanOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        ScanOutcome::Aborted => bail!("scan aborted"),
        ScanOutcome::MissingImages => bail!("both images are required"),
    }
}
