// Metamon Infrastructure - System Adapters
// Implements: ArchiveExtractor, MetaFetcher

pub mod git_fetcher;
pub mod tar_extractor;

pub use git_fetcher::GitMetaFetcher;
pub use tar_extractor::TarGzExtractor;
