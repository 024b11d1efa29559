//! Domain targets and the post-commit availability trigger.

pub mod commit;
pub mod target;
pub mod trigger;

pub use commit::CommitScope;
pub use target::{
    AvailabilityHook, ConversionTarget, ConvertedFlag, MediaConvertedHook, TargetRegistry,
    TargetResolver,
};
pub use trigger::{AvailabilityTrigger, TriggerOutcome};
