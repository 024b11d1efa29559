use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::jobs::{MediaKind, StagePlanEntry, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Job database location. Defaults to `~/.mediajobs/data/mediajobs.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Root directory of durable media storage.
    pub storage_root: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub stage_plans: StagePlansConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Minimal valid configuration rooted at `storage_root`.
    pub fn new(storage_root: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            storage_root: storage_root.into(),
            worker_count: default_worker_count(),
            max_attempts: default_max_attempts(),
            reaper: ReaperConfig::default(),
            status: StatusConfig::default(),
            stage_plans: StagePlansConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Stale heartbeat sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,
}

fn default_reaper_interval() -> u64 {
    180
}

fn default_stale_after() -> u64 {
    600
}

fn default_max_rows() -> u32 {
    100
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval(),
            stale_after_secs: default_stale_after(),
            max_rows: default_max_rows(),
        }
    }
}

/// Settings for the job status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Heartbeat age after which a processing job is shown as stale.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,
}

fn default_stale_threshold() -> u64 {
    120
}

impl StatusConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold(),
        }
    }
}

/// Default stage plans per media kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePlansConfig {
    #[serde(default = "default_image_plan")]
    pub image: Vec<StagePlanEntry>,
    #[serde(default = "default_audio_plan")]
    pub audio: Vec<StagePlanEntry>,
    #[serde(default = "default_video_plan")]
    pub video: Vec<StagePlanEntry>,
}

fn default_image_plan() -> Vec<StagePlanEntry> {
    vec![
        StagePlanEntry::new("transcode", 80),
        StagePlanEntry::new("finalize", 20),
    ]
}

fn default_audio_plan() -> Vec<StagePlanEntry> {
    vec![
        StagePlanEntry::new("transcode", 85),
        StagePlanEntry::new("finalize", 15),
    ]
}

fn default_video_plan() -> Vec<StagePlanEntry> {
    vec![
        StagePlanEntry::new("video_1080", 40),
        StagePlanEntry::new("video_720", 30),
        StagePlanEntry::new("finalize", 30),
    ]
}

impl StagePlansConfig {
    pub fn for_kind(&self, kind: MediaKind) -> &[StagePlanEntry] {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

impl Default for StagePlansConfig {
    fn default() -> Self {
        Self {
            image: default_image_plan(),
            audio: default_audio_plan(),
            video: default_video_plan(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `mediajobs=debug`. `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
