//! Quick-look batch runner.
//!
//! Builds `QUICK_LOOK_<stat>.tif` (and a JSON report) from a directory of
//! point-cloud tiles.

mod args;

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use point_engine::create_engine;
use quicklook::{
    mosaic_path, run_batch, BatchOutcome, BatchReport, ConsoleProgress, NoProgress, ProgressSink,
    TracingProgress,
};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use args::{Args, LogFormat};

/// Exit status for each way a batch can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Status {
    Success = 0,
    Fatal = 1,
    NoInputTiles = 3,
    NoTilesGenerated = 4,
    TileFailures = 5,
}

impl Status {
    fn of(report: &BatchReport) -> Self {
        match report.outcome {
            BatchOutcome::NoInputTiles => Status::NoInputTiles,
            BatchOutcome::NoTilesGenerated => Status::NoTilesGenerated,
            BatchOutcome::MosaicWritten if !report.is_success() => Status::TileFailures,
            BatchOutcome::MosaicWritten => Status::Success,
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status as u8)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args).await {
        Ok(status) => status.into(),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Quick-look batch failed");
            Status::Fatal.into()
        }
    }
}

fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_max_level(args.level())
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match args.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    };
    if let Err(e) = installed {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

fn progress_sink(args: &Args) -> Box<dyn ProgressSink> {
    if args.no_progress {
        Box::new(NoProgress)
    } else if std::io::stderr().is_terminal() && args.log_format == LogFormat::Text {
        Box::new(ConsoleProgress::new())
    } else {
        Box::new(TracingProgress)
    }
}

async fn run(args: Args) -> Result<Status> {
    let config = args.resolve_config()?;

    info!(
        input = %args.input_dir.display(),
        output = %mosaic_path(&args.output, config.statistic).display(),
        statistic = %config.statistic,
        resolution = config.resolution,
        workers = config.workers,
        engine = %config.engine,
        "Starting quick-look batch"
    );

    let engine = create_engine(config.engine, &config.pdal_path);
    let progress = progress_sink(&args);

    let report = run_batch(
        &config,
        &args.input_dir,
        &args.output,
        engine,
        progress.as_ref(),
    )
    .await?;

    let status = Status::of(&report);
    match status {
        Status::NoInputTiles => warn!(
            input = %args.input_dir.display(),
            "No input tiles found"
        ),
        Status::NoTilesGenerated => warn!("No tiles were generated, no mosaic written"),
        Status::TileFailures => warn!(
            failed = report.failed,
            "Tile failures under strict failure policy"
        ),
        _ => {}
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;
    use point_engine::Statistic;
    use quicklook::FailurePolicy;

    use super::*;

    fn report(outcome: BatchOutcome, policy: FailurePolicy, failed: usize) -> BatchReport {
        let now = Utc::now();
        BatchReport {
            outcome,
            statistic: Statistic::Mean,
            engine: "native".to_string(),
            input_dir: PathBuf::from("/data/tiles"),
            failure_policy: policy,
            discovered: 3,
            rasterized: 3 - failed,
            empty: 0,
            failed,
            failures: Vec::new(),
            tiles: Vec::new(),
            mosaic: None,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_status_codes() {
        use FailurePolicy::{Strict, Tolerate};

        let cases = [
            (BatchOutcome::MosaicWritten, Tolerate, 0, Status::Success),
            (BatchOutcome::MosaicWritten, Tolerate, 1, Status::Success),
            (BatchOutcome::MosaicWritten, Strict, 1, Status::TileFailures),
            (BatchOutcome::NoInputTiles, Strict, 0, Status::NoInputTiles),
            (BatchOutcome::NoTilesGenerated, Tolerate, 3, Status::NoTilesGenerated),
        ];
        for (outcome, policy, failed, expected) in cases {
            assert_eq!(Status::of(&report(outcome, policy, failed)), expected);
        }
        assert_eq!(Status::TileFailures as u8, 5);
    }
}
