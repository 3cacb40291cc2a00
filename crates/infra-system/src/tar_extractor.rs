// Tar.gz archive extractor
//
// Unpacking is synchronous filesystem work; it runs on the blocking pool
// to keep the runtime responsive during the (one-time) provisioning step.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use metamon_core::port::{ArchiveExtractor, ExtractError};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

/// Gzip-compressed tar archive extractor
pub struct TarGzExtractor;

#[async_trait]
impl ArchiveExtractor for TarGzExtractor {
    async fn extract(&self, archive: &[u8], dest_dir: &Path) -> Result<(), ExtractError> {
        let bytes = archive.to_vec();
        let dest = dest_dir.to_path_buf();

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dest)
                .map_err(|e| ExtractError(format!("creating {}: {e}", dest.display())))?;
            let mut tar = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
            tar.unpack(&dest)
                .map_err(|e| ExtractError(format!("unpacking archive: {e}")))?;
            info!(dir = %dest.display(), "Archive extracted");
            Ok(())
        })
        .await
        .map_err(|e| ExtractError(format!("extract task failed: {e}")))?
    }
}
