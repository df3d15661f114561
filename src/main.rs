use ai_shorts_gen::config::Config;
use ai_shorts_gen::generator::{Pipeline, RunOptions};
use ai_shorts_gen::init;
use ai_shorts_gen::model::{RunReport, UploadOutcome};
use ai_shorts_gen::source::ContentRequest;
use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;

fn print_summary(report: &RunReport) {
    println!("Run directory: {}", report.run_dir.display());
    println!(
        "Final video:   {} ({} of {} paragraphs)",
        report.final_video.path.display(),
        report.completed_units(),
        report.units.len()
    );
    match &report.upload {
        UploadOutcome::Uploaded { url, .. } => println!("Uploaded:      {url}"),
        UploadOutcome::Failed(e) => println!("Upload failed: {e}"),
        UploadOutcome::Skipped => println!("Upload:        skipped"),
    }
}

async fn run_forever(pipeline: &Pipeline, request: &ContentRequest, interval: Duration) -> Result<()> {
    let mut run = 1u64;
    loop {
        tracing::info!(run, "starting run");
        match pipeline.run(request).await {
            Ok(report) => print_summary(&report),
            Err(e) => tracing::error!(run, "run failed: {e}"),
        }
        run += 1;

        tracing::info!("sleeping {}s before the next run", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config).await?;
    if let Some(dir) = &cli.runs_dir {
        config.runs_dir = dir.clone();
    }
    init::ensure_directories(&config).await?;
    let missing = init::missing_tools().await;
    if !missing.is_empty() {
        tracing::warn!(?missing, "media tools missing; composition will fail");
    }

    let request = match cli.command.clone() {
        Some(command) => ContentRequest::from(command),
        None => cli::prompt_request().await?,
    };

    let options = RunOptions {
        upload: !cli.no_upload,
        video: !cli.no_video,
        privacy: cli.privacy,
        music: cli.music.clone(),
    };
    let pipeline = Pipeline::from_config(config, options)?;

    if cli.repeat {
        return run_forever(&pipeline, &request, Duration::from_secs(cli.interval_secs)).await;
    }

    let report = pipeline.run(&request).await.context("Run failed")?;
    print_summary(&report);
    Ok(())
}
