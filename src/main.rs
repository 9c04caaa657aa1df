use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{sync::Arc, time::Instant};
use tokio::sync::broadcast;

use rec_watch::{
    background::{
        actors::{DesktopNotifier, LogSink, ProgressSink, SystemTrash},
        flows::{Dispatcher, JobContext, OutputTarget},
        processors::{
            classifier::PathClassifier,
            setup::{check_ffmpeg, initialize_logger, initialize_output_folder},
            video::FfmpegTranscoder,
        },
        sources::{BatchSource, WatchSource, discover, filter_by_keywords},
        types::RunSummary,
    },
    cli::Cli,
    common::errors::handle_error,
    config::{Config, EnvOverrides, Mode},
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logger();

    let env =
        EnvOverrides::load().map_err(|err| handle_error(err.context("Invalid environment")))?;
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let config = cli
        .into_config(&env, &cwd, dirs::home_dir().as_deref())
        .map_err(|err| handle_error(err.context("Invalid configuration")))?;

    check_ffmpeg(&config.transcode.ffmpeg_bin);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rec-watch-worker")
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(run(config)).map_err(handle_error)
}

async fn run(config: Config) -> Result<()> {
    let start_time = Instant::now();
    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
    tokio::spawn({
        let stop_tx = stop_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(());
            }
        }
    });

    let classifier = PathClassifier::new(&config.extensions);
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode.clone()));

    let summary = match &config.mode {
        Mode::Batch { patterns } => {
            let discovery = discover(patterns, &classifier, dirs::home_dir().as_deref());
            let paths = filter_by_keywords(discovery.paths, &config.keywords);
            if paths.is_empty() {
                info!("No matching files found, nothing to do.");
                return Ok(());
            }
            info!("Found {} file(s) to convert", paths.len());

            let output_dir = initialize_output_folder(&config.output.resolve_now())?;
            info!("Writing to {:?}", output_dir);

            let progress = Arc::new(ProgressSink::new(paths.len()));
            let context = JobContext::new(
                transcoder,
                Arc::new(SystemTrash),
                OutputTarget::Fixed(output_dir),
            )
            .with_trash(config.trash)
            .with_sink(Arc::new(LogSink))
            .with_sink(progress.clone());

            let dispatcher = Dispatcher::new(context, classifier, config.concurrency);
            let summary = dispatcher.run(BatchSource::new(paths), stop_rx).await;
            progress.finish();
            summary
        }
        Mode::Watch { target } => {
            if !config.keywords.is_empty() {
                warn!("--keywords only applies to batch runs and is ignored while watching");
            }
            let source = WatchSource::start(target, classifier.clone(), config.settle)?;
            info!(
                "Converting new recordings from {:?} into {:?} with up to {} worker(s); \
                 press Ctrl-C to stop",
                source.target(),
                config.output.base(),
                config.concurrency
            );

            let mut context = JobContext::new(
                transcoder,
                Arc::new(SystemTrash),
                OutputTarget::PerJob(config.output.clone()),
            )
            .with_trash(config.trash)
            .with_sink(Arc::new(LogSink));
            if config.notify {
                context = context.with_sink(Arc::new(DesktopNotifier));
            }

            let dispatcher = Dispatcher::new(context, classifier, config.concurrency);
            dispatcher.run(source, stop_rx).await
        }
    };

    log_summary(&summary, start_time);
    Ok(())
}

fn log_summary(summary: &RunSummary, start_time: Instant) {
    info!(
        duration = &*format!("{:?}", start_time.elapsed());
        "Finished {} job(s): {} converted, {} failed, {} ignored, {} duplicate(s)",
        summary.finished(),
        summary.succeeded,
        summary.failed,
        summary.ignored,
        summary.duplicates
    );
}
