//! carebot-test-utils: scripted collaborators and fixtures for pipeline
//! tests.
//!
//! Nothing here touches the network: the classifier and the generative
//! model are replaced by scripted backends that record what they were
//! asked, and the patient store is seeded in memory.

pub mod backends;
pub mod fixtures;
pub mod notifier;

pub use backends::{replies, HealthMode, ScriptedClassifier, ScriptedLlm};
pub use fixtures::{seeded_store, SEED_PATIENT};
pub use notifier::RecordingNotifier;

pub use pretty_assertions;
