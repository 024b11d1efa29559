//! Builders for conversion requests and test data.

#![allow(dead_code)]

use mediajobs::jobs::{MediaKind, StagePlanEntry, TargetRef};
use mediajobs::worker::{ConversionRequest, UploadConfig};

/// Builder for `ConversionRequest` instances.
pub struct RequestBuilder {
    target: TargetRef,
    field: String,
    source: String,
    config: UploadConfig,
}

impl RequestBuilder {
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            target: TargetRef::new(kind, id),
            field: "media".to_string(),
            source: "uploads/source.bin".to_string(),
            config: UploadConfig::default(),
        }
    }

    pub fn field(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.config.kind = Some(kind);
        self
    }

    pub fn mark_converted(mut self, mark: bool) -> Self {
        self.config.mark_converted = mark;
        self
    }

    pub fn thumbnail_field(mut self, field: &str) -> Self {
        self.config.thumbnail_field = Some(field.to_string());
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = Some(attempts);
        self
    }

    pub fn stage_plan(mut self, plan: &[(&str, u32)]) -> Self {
        self.config.stage_plan = Some(plan_of(plan));
        self
    }

    pub fn build(self) -> ConversionRequest {
        ConversionRequest::new(&self.target, self.field, self.source).with_config(self.config)
    }
}

/// Builds a stage plan from `(key, weight)` pairs.
pub fn plan_of(entries: &[(&str, u32)]) -> Vec<StagePlanEntry> {
    entries
        .iter()
        .map(|(key, weight)| StagePlanEntry::new(*key, *weight))
        .collect()
}
