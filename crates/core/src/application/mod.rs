// Application Layer - Use Cases and Business Logic

pub mod provision;
pub mod registry;
pub mod scheduler;

// Re-exports
pub use provision::{ProvisionError, ProvisionSpec, Provisioner};
pub use registry::{load_targets, RegistryConfig, RegistryError};
pub use scheduler::{stop_channel, PollScheduler, SchedulerConfig, StopHandle, StopSignal};
