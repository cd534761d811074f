//! snapshotd - periodic stream snapshots with object detection
//!
//! This daemon:
//! 1. Loads configuration (file, then SNAPSHOT_* environment overrides)
//! 2. Loads the detection model once; a model that fails to load is fatal
//! 3. Captures, detects and saves a frame every poll interval until Ctrl-C

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use snapshot_detector::{
    config::CONFIG_ENV, open_engine, open_source, Pipeline, PipelineConfig, Renderer,
    ShutdownFlag,
};

#[derive(Parser, Debug)]
#[command(name = "snapshotd", version, about = "Periodic stream snapshots with object detection")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Stop after this many iterations instead of running until Ctrl-C.
    #[arg(long, env = "SNAPSHOT_MAX_ITERATIONS")]
    max_iterations: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PipelineConfig::load_from(args.config.as_deref())?;
    if args.max_iterations.is_some() {
        cfg.max_iterations = args.max_iterations;
    }

    let mut engine = open_engine(&cfg.model.path, cfg.model.input_size)
        .with_context(|| format!("failed to load model {}", cfg.model.path))?;
    engine
        .warm_up()
        .with_context(|| format!("failed to warm up {} engine", engine.name()))?;
    log::info!(
        "model {} loaded ({} engine, input {})",
        cfg.model.path,
        engine.name(),
        engine.input_size()
    );

    if cfg.stub_model_on_live_stream() {
        log::warn!(
            "model {} is the stub engine; every frame from {} gets the same fixed detection. \
             Set model.path or SNAPSHOT_MODEL_PATH to a real model",
            cfg.model.path,
            cfg.stream_url
        );
    }

    let source = open_source(&cfg.stream_url)?;

    let mut renderer = Renderer::new()?.with_color(cfg.render.box_color);
    if let Some(font) = &cfg.render.label_font {
        renderer = renderer.with_font_file(font)?;
    }

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, finishing current iteration...");
        handler_flag.request();
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "snapshotd running. raw frames -> {}, annotated -> {}",
        cfg.capture_dir.display(),
        cfg.output_dir.display()
    );

    let mut pipeline = Pipeline::new(source, engine, renderer, cfg);
    let stats = pipeline.run(&shutdown);
    log::info!(
        "snapshotd stopped after {} iteration(s): {} saved, {} skipped",
        stats.iterations,
        stats.saved,
        stats.skipped
    );

    Ok(())
}
