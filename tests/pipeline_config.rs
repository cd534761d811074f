use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use snapshot_detector::config::PipelineConfig;
use snapshot_detector::{CoordinateSpace, InputSize};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SNAPSHOT_CONFIG",
        "SNAPSHOT_STREAM_URL",
        "SNAPSHOT_CAPTURE_DIR",
        "SNAPSHOT_OUTPUT_DIR",
        "SNAPSHOT_MODEL_PATH",
        "SNAPSHOT_POLL_INTERVAL_SECS",
        "SNAPSHOT_SCORE_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.stream_url, "http://192.168.1.135:8080/video");
    assert_eq!(cfg.capture_dir, PathBuf::from("data/temp/images"));
    assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.model.score_threshold, 0.0);
    assert_eq!(cfg.max_iterations, None);
}

#[test]
fn loads_json_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "stream_url": "http://camera-1:8080/video",
        "capture_dir": "/var/lib/snapshotd/raw",
        "output_dir": "/var/lib/snapshotd/annotated",
        "poll_interval_secs": 30,
        "max_iterations": 10,
        "model": {
            "path": "stub://demo",
            "input_size": { "height": 320, "width": 320 },
            "layout": { "coordinates": "model_input" },
            "score_threshold": 0.25
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SNAPSHOT_CONFIG", file.path());
    std::env::set_var("SNAPSHOT_STREAM_URL", "rtsp://camera-2/stream");
    std::env::set_var("SNAPSHOT_POLL_INTERVAL_SECS", "2");
    std::env::set_var("SNAPSHOT_SCORE_THRESHOLD", "0.6");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.stream_url, "rtsp://camera-2/stream");
    assert_eq!(cfg.capture_dir, PathBuf::from("/var/lib/snapshotd/raw"));
    assert_eq!(cfg.output_dir, PathBuf::from("/var/lib/snapshotd/annotated"));
    assert_eq!(cfg.poll_interval, Duration::from_secs(2));
    assert_eq!(cfg.max_iterations, Some(10));
    assert_eq!(cfg.model.path, "stub://demo");
    assert_eq!(cfg.model.input_size, Some(InputSize::new(320, 320)));
    assert_eq!(cfg.model.layout.coordinates, CoordinateSpace::ModelInput);
    // Unset layout columns keep the default positions.
    assert_eq!(cfg.model.layout.label, 4);
    assert_eq!(cfg.model.score_threshold, 0.6);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::fs::write(
        file.path(),
        r#"
        stream_url = "stub://front_camera"

        [model]
        path = "stub://demo"
        score_threshold = 0.4
        "#,
    )
    .expect("write config");

    let cfg = PipelineConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.stream_url, "stub://front_camera");
    assert_eq!(cfg.model.score_threshold, 0.4);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SNAPSHOT_POLL_INTERVAL_SECS", "soon");
    let err = PipelineConfig::load().expect_err("invalid interval");
    assert!(err.to_string().contains("SNAPSHOT_POLL_INTERVAL_SECS"));
    clear_env();

    std::env::set_var("SNAPSHOT_SCORE_THRESHOLD", "2.0");
    let err = PipelineConfig::load().expect_err("threshold out of range");
    assert!(err.to_string().contains("score_threshold"));

    clear_env();
}

#[test]
fn rejects_missing_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let missing = PathBuf::from("/nonexistent/snapshotd.json");
    assert!(PipelineConfig::load_from(Some(&missing)).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn rejects_shared_capture_and_output_dir() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SNAPSHOT_CAPTURE_DIR", "frames");
    std::env::set_var("SNAPSHOT_OUTPUT_DIR", "frames/");
    let err = PipelineConfig::load().expect_err("shared directory");
    assert!(err.to_string().contains("capture_dir and output_dir"));

    clear_env();
}

#[test]
fn rejects_out_of_range_layout_column() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "model": { "layout": { "box_start": 18446744073709551615 } } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    let err = PipelineConfig::load_from(Some(file.path())).expect_err("overflowing layout");
    assert!(format!("{:#}", err).contains("box_start"));
}
