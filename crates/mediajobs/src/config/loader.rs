use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::jobs::StagePlanEntry;

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format =
        ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, format)
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.storage_root.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "storage_root must not be empty".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be greater than 0".to_string(),
        });
    }

    if config.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "max_attempts must be greater than 0".to_string(),
        });
    }

    let reaper = &config.reaper;
    if reaper.interval_secs == 0 || reaper.stale_after_secs == 0 || reaper.max_rows == 0 {
        return Err(ConfigError::Validation {
            message: "reaper interval_secs, stale_after_secs and max_rows must be positive"
                .to_string(),
        });
    }

    if config.status.stale_threshold_secs == 0 {
        return Err(ConfigError::Validation {
            message: "status.stale_threshold_secs must be positive".to_string(),
        });
    }

    validate_stage_plan("image", &config.stage_plans.image)?;
    validate_stage_plan("audio", &config.stage_plans.audio)?;
    validate_stage_plan("video", &config.stage_plans.video)?;

    Ok(())
}

/// Upper bound on the summed weights of one plan.
pub const MAX_PLAN_WEIGHT: u32 = 1_000_000;

/// Checks that a plan is non-empty with unique keys and positive weights
/// whose total stays within `MAX_PLAN_WEIGHT`.
pub(crate) fn validate_stage_plan(kind: &str, plan: &[StagePlanEntry]) -> Result<(), ConfigError> {
    if plan.is_empty() {
        return Err(ConfigError::InvalidStagePlan {
            kind: kind.to_string(),
            reason: "plan has no stages".to_string(),
        });
    }

    let mut keys = HashSet::new();
    let mut total: u32 = 0;
    for entry in plan {
        if entry.key.trim().is_empty() {
            return Err(ConfigError::InvalidStagePlan {
                kind: kind.to_string(),
                reason: "stage key must not be empty".to_string(),
            });
        }
        if entry.weight == 0 {
            return Err(ConfigError::InvalidStagePlan {
                kind: kind.to_string(),
                reason: format!("stage '{}' has zero weight", entry.key),
            });
        }
        if !keys.insert(entry.key.as_str()) {
            return Err(ConfigError::InvalidStagePlan {
                kind: kind.to_string(),
                reason: format!("duplicate stage '{}'", entry.key),
            });
        }
        total = match total.checked_add(entry.weight) {
            Some(sum) if sum <= MAX_PLAN_WEIGHT => sum,
            _ => {
                return Err(ConfigError::InvalidStagePlan {
                    kind: kind.to_string(),
                    reason: format!("total weight exceeds {}", MAX_PLAN_WEIGHT),
                })
            }
        };
    }

    Ok(())
}
