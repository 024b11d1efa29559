//! The capabilities a domain object exposes to the pipeline.
//!
//! Only `attach_media` is mandatory. The rest are optional capabilities
//! reached through accessor methods; `None` means "not supported".

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TargetError;
use crate::jobs::TargetRef;

/// A persistent "conversion finished" flag on the target.
pub trait ConvertedFlag: Send + Sync {
    fn is_converted(&self) -> bool;
    fn set_converted(&self, converted: bool) -> Result<(), TargetError>;
}

/// A "became available" domain callback.
///
/// `on_available` may be called more than once; implementations must
/// remember whether they already fired.
pub trait AvailabilityHook: Send + Sync {
    fn is_available(&self) -> bool;
    fn on_available(&self) -> Result<(), TargetError>;
}

/// Notification that a field received a converted artifact.
pub trait MediaConvertedHook: Send + Sync {
    fn on_media_converted(&self, field: &str, changed_fields: &[String])
        -> Result<(), TargetError>;
}

/// A domain object that owns conversion jobs.
pub trait ConversionTarget: Send + Sync {
    fn target_ref(&self) -> TargetRef;

    /// Stores `relative_path` in `field` by reference. Returns the names of
    /// the fields that changed.
    fn attach_media(&self, field: &str, relative_path: &str) -> Result<Vec<String>, TargetError>;

    fn converted_flag(&self) -> Option<&dyn ConvertedFlag> {
        None
    }

    fn availability(&self) -> Option<&dyn AvailabilityHook> {
        None
    }

    fn media_hook(&self) -> Option<&dyn MediaConvertedHook> {
        None
    }
}

/// Looks up targets of one kind by id.
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Arc<dyn ConversionTarget>, TargetError>;
}

impl<F> TargetResolver for F
where
    F: Fn(&str) -> Result<Arc<dyn ConversionTarget>, TargetError> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Result<Arc<dyn ConversionTarget>, TargetError> {
        self(id)
    }
}

/// Maps target kinds to their resolvers.
#[derive(Default, Clone)]
pub struct TargetRegistry {
    resolvers: HashMap<String, Arc<dyn TargetResolver>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, resolver: impl TargetResolver + 'static) {
        self.resolvers.insert(kind.into(), Arc::new(resolver));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }

    pub fn resolve(&self, target: &TargetRef) -> Result<Arc<dyn ConversionTarget>, TargetError> {
        let resolver = self
            .resolvers
            .get(&target.kind)
            .ok_or_else(|| TargetError::UnknownKind(target.kind.clone()))?;
        resolver.resolve(&target.id)
    }

    pub fn exists(&self, target: &TargetRef) -> bool {
        self.resolve(target).is_ok()
    }
}
