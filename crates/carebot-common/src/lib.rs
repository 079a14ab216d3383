//! carebot-common: Shared types, errors, and closed enums used across all carebot crates.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{CarebotError, ErrorClass, Result};
pub use types::{
    Action, Intent, PiiKind, RecommendedAction, RecordCategory, RecordQuerySpec, RiskLevel,
    TimeFrame,
};
