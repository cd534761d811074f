use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ColumnLayout;
use crate::frame::InputSize;

pub const CONFIG_ENV: &str = "SNAPSHOT_CONFIG";

const DEFAULT_STREAM_URL: &str = "http://192.168.1.135:8080/video";
const DEFAULT_CAPTURE_DIR: &str = "data/temp/images";
const DEFAULT_OUTPUT_DIR: &str = "data/output/images";
const DEFAULT_MODEL_PATH: &str = "stub://demo";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.0;
const DEFAULT_BOX_COLOR: [u8; 3] = [0, 255, 0];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    stream_url: Option<String>,
    capture_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    poll_interval_secs: Option<u64>,
    max_iterations: Option<u64>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<String>,
    input_size: Option<InputSize>,
    layout: Option<ColumnLayout>,
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RenderConfigFile {
    label_font: Option<PathBuf>,
    box_color: Option<[u8; 3]>,
}

/// Everything the daemon needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stream_url: String,
    /// Raw frames land here.
    pub capture_dir: PathBuf,
    /// Annotated frames land here.
    pub output_dir: PathBuf,
    pub model: ModelSettings,
    pub poll_interval: Duration,
    /// Stop after this many iterations; `None` runs until shutdown.
    pub max_iterations: Option<u64>,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: String,
    /// Overrides the model's declared input size when set.
    pub input_size: Option<InputSize>,
    pub layout: ColumnLayout,
    pub score_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub label_font: Option<PathBuf>,
    pub box_color: [u8; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model: ModelSettings {
                path: DEFAULT_MODEL_PATH.to_string(),
                input_size: None,
                layout: ColumnLayout::default(),
                score_threshold: DEFAULT_SCORE_THRESHOLD,
            },
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_iterations: None,
            render: RenderSettings {
                label_font: None,
                box_color: DEFAULT_BOX_COLOR,
            },
        }
    }
}

impl PipelineConfig {
    /// Load with the config file named by `SNAPSHOT_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Defaults, then `path` (if any), then `SNAPSHOT_*` overrides, then validation.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// True when the placeholder stub model would annotate a real stream.
    pub fn stub_model_on_live_stream(&self) -> bool {
        self.model.path.starts_with("stub://") && !self.stream_url.starts_with("stub://")
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let model = file.model.unwrap_or_default();
        let render = file.render.unwrap_or_default();
        Self {
            stream_url: file.stream_url.unwrap_or(defaults.stream_url),
            capture_dir: file.capture_dir.unwrap_or(defaults.capture_dir),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            model: ModelSettings {
                path: model.path.unwrap_or(defaults.model.path),
                input_size: model.input_size,
                layout: model.layout.unwrap_or(defaults.model.layout),
                score_threshold: model
                    .score_threshold
                    .unwrap_or(defaults.model.score_threshold),
            },
            poll_interval: file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_iterations: file.max_iterations,
            render: RenderSettings {
                label_font: render.label_font,
                box_color: render.box_color.unwrap_or(defaults.render.box_color),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("SNAPSHOT_STREAM_URL") {
            self.stream_url = url;
        }
        if let Some(dir) = env_value("SNAPSHOT_CAPTURE_DIR") {
            self.capture_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("SNAPSHOT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_value("SNAPSHOT_MODEL_PATH") {
            self.model.path = path;
        }
        if let Some(secs) = env_value("SNAPSHOT_POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("SNAPSHOT_POLL_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = env_value("SNAPSHOT_SCORE_THRESHOLD") {
            self.model.score_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SNAPSHOT_SCORE_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.stream_url.trim().is_empty() {
            return Err(anyhow!("stream_url must not be empty"));
        }
        if self.model.path.trim().is_empty() {
            return Err(anyhow!("model path must not be empty"));
        }
        if self.capture_dir == self.output_dir {
            return Err(anyhow!(
                "capture_dir and output_dir must differ; both are {}",
                self.capture_dir.display()
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        let threshold = self.model.score_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "score_threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if let Some(size) = self.model.input_size {
            if size.is_empty() {
                return Err(anyhow!("model input_size must be non-zero, got {}", size));
            }
        }
        self.model
            .layout
            .validate()
            .map_err(|e| anyhow!("invalid column layout: {}", e))?;
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.capture_dir, PathBuf::from("data/temp/images"));
        assert_eq!(cfg.model.layout, ColumnLayout::default());
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.model.score_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.model.input_size = Some(InputSize::new(0, 300));
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.model.layout.score = cfg.model.layout.label;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.stream_url = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.poll_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.output_dir = cfg.capture_dir.clone();
        assert!(cfg.validate().is_err());

        // Trailing separators do not make a directory distinct.
        let mut cfg = PipelineConfig::default();
        cfg.capture_dir = PathBuf::from("frames/");
        cfg.output_dir = PathBuf::from("frames");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stub_model_is_flagged_only_on_live_streams() {
        let mut cfg = PipelineConfig::default();
        assert!(cfg.stub_model_on_live_stream());

        cfg.stream_url = "stub://front_camera".to_string();
        assert!(!cfg.stub_model_on_live_stream());

        cfg.stream_url = "rtsp://camera-1/stream".to_string();
        cfg.model.path = "models/ssd.onnx".to_string();
        assert!(!cfg.stub_model_on_live_stream());
    }

    #[test]
    fn file_sections_fill_nested_settings() -> Result<()> {
        let file: PipelineConfigFile = toml::from_str(
            r#"
            stream_url = "rtsp://camera-1/stream"
            poll_interval_secs = 2

            [model]
            path = "models/ssd.onnx"
            input_size = { height = 320, width = 320 }
            score_threshold = 0.5
            layout = { box_start = 1, label = 5, score = 6, coordinates = "normalized" }

            [render]
            box_color = [255, 0, 0]
            "#,
        )?;
        let cfg = PipelineConfig::from_file(file);
        cfg.validate()?;

        assert_eq!(cfg.stream_url, "rtsp://camera-1/stream");
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.model.input_size, Some(InputSize::new(320, 320)));
        assert_eq!(cfg.model.layout.box_start, 1);
        assert_eq!(cfg.model.layout.required_columns(), 7);
        assert_eq!(cfg.render.box_color, [255, 0, 0]);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.output_dir, PathBuf::from("data/output/images"));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: std::result::Result<PipelineConfigFile, _> =
            serde_json::from_str(r#"{ "stream": "http://camera" }"#);
        assert!(parsed.is_err());
    }
}
