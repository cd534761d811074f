//! The capture loop.
//!
//! One iteration walks the stages in order:
//!
//! ```text
//! Capturing -> Preprocessing -> Inferring -> Decoding -> Rendering -> Saving -> Sleeping
//! ```
//!
//! The raw frame is saved as soon as it is captured, so it survives a
//! later stage failing. Any failure abandons the rest of the iteration and
//! goes straight to `Sleeping`. Capture failures are expected on flaky
//! cameras and logged as warnings; everything else is logged as an error.
//! No iteration failure stops the loop.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::detect::{self, Detection, InferenceEngine};
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::FrameSource;
use crate::preprocess;
use crate::render::Renderer;
use crate::sink;

/// Granularity of the interruptible sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(100);
const HEALTH_LOG_EVERY: u64 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Preprocessing,
    Inferring,
    Decoding,
    Rendering,
    Saving,
    Sleeping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Preprocessing => "preprocessing",
            Self::Inferring => "inferring",
            Self::Decoding => "decoding",
            Self::Rendering => "rendering",
            Self::Saving => "saving",
            Self::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

/// Result of one iteration.
#[derive(Debug)]
pub enum IterationOutcome {
    Saved {
        raw: PathBuf,
        annotated: PathBuf,
        detections: Vec<Detection>,
    },
    /// The iteration was abandoned in `state`.
    Skipped {
        state: PipelineState,
        error: PipelineError,
    },
}

impl IterationOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub iterations: u64,
    pub saved: u64,
    pub skipped: u64,
}

/// Cooperative shutdown signal, shared with the Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline<S, E> {
    source: S,
    engine: E,
    renderer: Renderer,
    config: PipelineConfig,
    state: PipelineState,
    stats: PipelineStats,
}

impl<S: FrameSource, E: InferenceEngine> Pipeline<S, E> {
    pub fn new(source: S, engine: E, renderer: Renderer, config: PipelineConfig) -> Self {
        Self {
            source,
            engine,
            renderer,
            config,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run exactly one iteration and leave the pipeline in `Sleeping`.
    pub fn run_iteration(&mut self) -> IterationOutcome {
        self.stats.iterations += 1;
        let outcome = match self.process() {
            Ok((raw, annotated, detections)) => {
                self.stats.saved += 1;
                log::info!(
                    "saved {} with {} detection(s)",
                    annotated.display(),
                    detections.len()
                );
                IterationOutcome::Saved {
                    raw,
                    annotated,
                    detections,
                }
            }
            Err(error) => {
                self.stats.skipped += 1;
                let state = self.state;
                if error.is_capture_failure() {
                    log::warn!("failed to capture frame, skipping: {}", error);
                } else {
                    log::error!("iteration abandoned while {}: {}", state, error);
                }
                IterationOutcome::Skipped { state, error }
            }
        };
        self.state = PipelineState::Sleeping;
        outcome
    }

    fn process(&mut self) -> PipelineResult<(PathBuf, PathBuf, Vec<Detection>)> {
        self.state = PipelineState::Capturing;
        let frame = self.source.capture()?;
        log::debug!(
            "captured {}x{} frame from {}",
            frame.width(),
            frame.height(),
            self.source.endpoint()
        );
        if frame.is_empty() {
            return Err(PipelineError::InvalidFrame(format!(
                "captured frame has zero size ({}x{})",
                frame.width(),
                frame.height()
            )));
        }
        self.state = PipelineState::Saving;
        let raw = sink::save(&frame, &self.config.capture_dir)?;

        self.state = PipelineState::Preprocessing;
        let input_size = self.engine.input_size();
        let tensor = preprocess::transform(&frame, input_size)?;
        log::debug!("input tensor shape {:?}", tensor.shape());

        self.state = PipelineState::Inferring;
        let started = Instant::now();
        let outputs = self.engine.infer(&tensor)?;
        log::debug!(
            "{} inference produced {} output(s) in {:?}",
            self.engine.name(),
            outputs.len(),
            started.elapsed()
        );

        self.state = PipelineState::Decoding;
        let model = &self.config.model;
        let mut detections = detect::decode(&outputs, &model.layout)?;
        detect::project(
            &mut detections,
            model.layout.coordinates,
            input_size,
            frame.width(),
            frame.height(),
        );
        detections.retain(|det| det.score >= model.score_threshold);

        self.state = PipelineState::Rendering;
        let annotated = self.renderer.draw(&frame, &detections);

        self.state = PipelineState::Saving;
        let annotated = sink::save(&annotated, &self.config.output_dir)?;

        Ok((raw, annotated, detections))
    }

    /// Loop until `shutdown` is requested or `max_iterations` is reached.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> PipelineStats {
        log::info!(
            "pipeline running: source={} engine={} every {:?}",
            self.source.endpoint(),
            self.engine.name(),
            self.config.poll_interval
        );

        while !shutdown.is_requested() {
            self.run_iteration();

            if self.stats.iterations % HEALTH_LOG_EVERY == 0 {
                self.log_health();
            }
            if self
                .config
                .max_iterations
                .is_some_and(|max| self.stats.iterations >= max)
            {
                log::info!("reached {} iteration(s), stopping", self.stats.iterations);
                break;
            }
            self.sleep(shutdown);
        }

        self.state = PipelineState::Idle;
        self.log_health();
        self.stats
    }

    fn sleep(&mut self, shutdown: &ShutdownFlag) {
        self.state = PipelineState::Sleeping;
        let deadline = Instant::now() + self.config.poll_interval;
        while !shutdown.is_requested() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    fn log_health(&self) {
        let source = self.source.stats();
        log::info!(
            "health iterations={} saved={} skipped={} frames={} capture_failures={} url={}",
            self.stats.iterations,
            self.stats.saved,
            self.stats.skipped,
            source.frames_captured,
            source.failures,
            source.endpoint
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubEngine;
    use crate::frame::{Frame, InputSize};
    use crate::ingest::SourceStats;
    use image::RgbImage;
    use ndarray::arr2;

    struct FixedSource(u32, u32);

    impl FrameSource for FixedSource {
        fn endpoint(&self) -> &str {
            "test://fixed"
        }

        fn capture(&mut self) -> PipelineResult<Frame> {
            Ok(Frame::new(RgbImage::new(self.0, self.1)))
        }

        fn stats(&self) -> SourceStats {
            SourceStats::default()
        }
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.capture_dir = dir.join("raw");
        cfg.output_dir = dir.join("annotated");
        cfg.poll_interval = Duration::from_millis(1);
        cfg
    }

    #[test]
    fn starts_idle_and_ends_iteration_sleeping() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut pipeline = Pipeline::new(
            FixedSource(64, 64),
            StubEngine::demo(),
            Renderer::new()?,
            config(temp_dir.path()),
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let outcome = pipeline.run_iteration();
        assert!(outcome.is_saved());
        assert_eq!(pipeline.state(), PipelineState::Sleeping);
        assert_eq!(pipeline.engine().calls(), 1);
        Ok(())
    }

    #[test]
    fn raw_save_failure_skips_before_inference() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut cfg = config(temp_dir.path());
        std::fs::write(temp_dir.path().join("blocker"), b"file")?;
        cfg.capture_dir = temp_dir.path().join("blocker").join("raw");
        let mut pipeline =
            Pipeline::new(FixedSource(8, 8), StubEngine::demo(), Renderer::new()?, cfg);

        match pipeline.run_iteration() {
            IterationOutcome::Skipped { state, error } => {
                assert_eq!(state, PipelineState::Saving);
                assert!(matches!(error, PipelineError::WriteError { .. }));
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert_eq!(pipeline.engine().calls(), 0);
        assert_eq!(pipeline.stats().skipped, 1);
        assert_eq!(pipeline.state(), PipelineState::Sleeping);
        Ok(())
    }

    #[test]
    fn zero_sized_frame_is_invalid_before_any_save() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut pipeline = Pipeline::new(
            FixedSource(0, 10),
            StubEngine::demo(),
            Renderer::new()?,
            config(temp_dir.path()),
        );

        match pipeline.run_iteration() {
            IterationOutcome::Skipped { state, error } => {
                assert_eq!(state, PipelineState::Capturing);
                assert!(matches!(error, PipelineError::InvalidFrame(_)));
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(!temp_dir.path().join("raw").exists());
        assert_eq!(pipeline.engine().calls(), 0);
        Ok(())
    }

    #[test]
    fn malformed_output_is_skipped_in_decoding() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = StubEngine::new(InputSize::new(8, 8))
            .with_outputs(vec![arr2(&[[1.0f32, 2.0, 3.0]]).into_dyn()]);
        let mut pipeline = Pipeline::new(
            FixedSource(16, 16),
            engine,
            Renderer::new()?,
            config(temp_dir.path()),
        );

        match pipeline.run_iteration() {
            IterationOutcome::Skipped { state, error } => {
                assert_eq!(state, PipelineState::Decoding);
                assert!(matches!(error, PipelineError::MalformedOutput { .. }));
            }
            other => panic!("expected skip, got {:?}", other),
        }
        // The raw frame was saved before decoding failed.
        assert_eq!(std::fs::read_dir(temp_dir.path().join("raw"))?.count(), 1);
        assert!(!temp_dir.path().join("annotated").exists());
        Ok(())
    }

    #[test]
    fn score_threshold_filters_detections() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = StubEngine::new(InputSize::new(8, 8)).with_outputs(vec![arr2(&[
            [1.0f32, 1.0, 5.0, 5.0, 1.0, 0.3],
            [2.0, 2.0, 6.0, 6.0, 7.0, 0.9],
        ])
        .into_dyn()]);
        let mut cfg = config(temp_dir.path());
        cfg.model.score_threshold = 0.5;
        let mut pipeline = Pipeline::new(FixedSource(16, 16), engine, Renderer::new()?, cfg);

        match pipeline.run_iteration() {
            IterationOutcome::Saved { detections, .. } => {
                assert_eq!(detections.len(), 1);
                assert_eq!(detections[0].label, 7);
            }
            other => panic!("expected save, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn run_stops_at_max_iterations() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut cfg = config(temp_dir.path());
        cfg.max_iterations = Some(3);
        let mut pipeline =
            Pipeline::new(FixedSource(8, 8), StubEngine::demo(), Renderer::new()?, cfg);

        let stats = pipeline.run(&ShutdownFlag::new());
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.saved, 3);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        Ok(())
    }

    #[test]
    fn requested_shutdown_runs_nothing() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let shutdown = ShutdownFlag::new();
        shutdown.request();
        let mut pipeline = Pipeline::new(
            FixedSource(8, 8),
            StubEngine::demo(),
            Renderer::new()?,
            config(temp_dir.path()),
        );

        assert_eq!(pipeline.run(&shutdown).iterations, 0);
        Ok(())
    }
}
