// Port Layer - Interfaces for external dependencies

pub mod extractor;
pub mod kms;
pub mod meta_fetcher;
pub mod object_store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use extractor::{ArchiveExtractor, ExtractError};
pub use kms::{KmsClient, KmsError, KmsKeyRef};
pub use meta_fetcher::{FetchFailure, MetaFetcher};
pub use object_store::{ObjectStore, ObjectStoreError};
pub use time_provider::TimeProvider;
