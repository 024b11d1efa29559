//! Table-driven tests for configuration loading and validation.
//!
//! Inline JSON and YAML cases cover validation rules; fixture files cover
//! format detection from the file extension.

use std::path::PathBuf;

use mediajobs::config::{load_config, load_config_from_str, ConfigFormat};
use mediajobs::jobs::MediaKind;

/// A single config loading test case.
struct ConfigTestCase {
    name: &'static str,
    content: &'static str,
    format: ConfigFormat,
    should_succeed: bool,
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal_json",
        content: r#"{"version": "1.0", "storage_root": "/srv/media"}"#,
        format: ConfigFormat::Json,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_custom_audio_plan_yaml",
        content: r#"
version: "1.0"
storage_root: /srv/media
stage_plans:
  audio:
    - { key: normalize, weight: 20 }
    - { key: transcode, weight: 70 }
    - { key: finalize, weight: 10 }
"#,
        format: ConfigFormat::Yaml,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_version",
        content: r#"{"version": "2.0", "storage_root": "/srv/media"}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_storage_root",
        content: r#"{"version": "1.0"}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("storage_root"),
    },
    ConfigTestCase {
        name: "blank_storage_root",
        content: r#"{"version": "1.0", "storage_root": "  "}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("storage_root must not be empty"),
    },
    ConfigTestCase {
        name: "zero_workers",
        content: r#"{"version": "1.0", "storage_root": "/m", "worker_count": 0}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("worker_count"),
    },
    ConfigTestCase {
        name: "zero_attempts",
        content: r#"{"version": "1.0", "storage_root": "/m", "max_attempts": 0}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("max_attempts"),
    },
    ConfigTestCase {
        name: "zero_reaper_interval",
        content: r#"{"version": "1.0", "storage_root": "/m", "reaper": {"interval_secs": 0}}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("reaper"),
    },
    ConfigTestCase {
        name: "zero_stale_threshold",
        content: "version: \"1.0\"\nstorage_root: /m\nstatus:\n  stale_threshold_secs: 0\n",
        format: ConfigFormat::Yaml,
        should_succeed: false,
        expected_error: Some("stale_threshold_secs"),
    },
    ConfigTestCase {
        name: "empty_video_plan",
        content: r#"{"version": "1.0", "storage_root": "/m", "stage_plans": {"video": []}}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("no stages"),
    },
    ConfigTestCase {
        name: "zero_weight_stage",
        content: r#"{"version": "1.0", "storage_root": "/m",
            "stage_plans": {"image": [{"key": "transcode", "weight": 0}]}}"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("zero weight"),
    },
    ConfigTestCase {
        name: "malformed_json",
        content: r#"{"version": "1.0", "storage_root": }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("parse config JSON"),
    },
];

#[test]
fn test_config_loading() {
    for test_case in CONFIG_TESTS {
        let result = load_config_from_str(test_case.content, test_case.format);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config")
}

#[test]
fn test_load_full_yaml_fixture() {
    let config = load_config(fixtures_path().join("full.yaml")).unwrap();

    assert_eq!(config.worker_count, 4);
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.reaper.max_rows, 50);
    assert_eq!(config.reaper.stale_after().as_secs(), 300);
    assert_eq!(config.status.stale_threshold().as_secs(), 90);
    assert_eq!(
        config.database_path(),
        Some(PathBuf::from("/var/lib/mediajobs/jobs.db"))
    );
    assert!(config.logging.json);
    assert_eq!(config.logging.level, "mediajobs=debug");

    let video: Vec<_> = config
        .stage_plans
        .for_kind(MediaKind::Video)
        .iter()
        .map(|e| (e.key.as_str(), e.weight))
        .collect();
    assert_eq!(video, vec![("video_1080", 50), ("video_480", 25), ("finalize", 25)]);
    // Unlisted kinds keep their defaults.
    assert_eq!(config.stage_plans.for_kind(MediaKind::Image).len(), 2);
}

#[test]
fn test_load_minimal_json_fixture_uses_defaults() {
    let config = load_config(fixtures_path().join("minimal.json")).unwrap();
    assert_eq!(config.storage_root(), PathBuf::from("/srv/media"));
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.reaper.interval_secs, 180);
    assert_eq!(config.reaper.stale_after_secs, 600);
    assert_eq!(config.status.stale_threshold_secs, 120);
    assert!(config.worker_count > 0);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_fixture_errors() {
    let cases = [
        ("duplicate-stage.yml", "duplicate stage 'transcode'"),
        ("broken.yaml", "parse config YAML"),
        ("settings.toml", "Unsupported config format"),
        ("missing.json", "Failed to read config file"),
    ];

    for (file, expected) in cases {
        let err = load_config(fixtures_path().join(file)).unwrap_err().to_string();
        assert!(
            err.contains(expected),
            "{}: expected error containing '{}', got '{}'",
            file,
            expected,
            err
        );
    }
}
