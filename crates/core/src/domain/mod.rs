// Domain Layer - Pure entities, no behavior against external systems

pub mod credential;
pub mod target;

// Re-exports
pub use credential::CredentialBundle;
pub use target::{ErrorRecord, FetchSpec, Target, TargetId};
