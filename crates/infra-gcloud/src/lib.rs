// Metamon Infrastructure - Google Cloud Adapters
// Implements: ObjectStore (Cloud Storage), KmsClient (Cloud KMS)

pub mod auth;
pub mod kms;
pub mod object_store;

pub use kms::GcpKmsClient;
pub use object_store::HttpObjectStore;
