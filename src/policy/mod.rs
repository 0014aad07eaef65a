//! Enforcement policy: settings model and the per-user evaluator.

pub mod evaluator;
pub mod settings;

pub use evaluator::{apply_grace, evaluate, sync_user, EnforcementState, GraceOutcome};
pub use settings::{
    EnforcementPolicy, GracePolicy, GraceUnit, PolicySettings, SettingsHandle, SettingsProvider,
};
