// Git-based META ingestion worker
//
// One poll attempt: list the remote META tags, and when new tags appeared
// since the previous poll, refresh the local mirror with a shallow clone,
// verify HEAD landed on one of the new tags, and archive the mirror to
// object storage. No tag content is interpreted beyond the META tag
// naming shape.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use metamon_core::domain::{CredentialBundle, FetchSpec};
use metamon_core::port::{FetchFailure, MetaFetcher, ObjectStore};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, info};

/// Bucket layout for archived META source, one object per target and tag
const ARCHIVE_BUCKET: &str = "gs://meta-source";
const ARCHIVE_NAME: &str = "meta-source.tar.gz";

/// META tags look like r-prefixed release names (e.g. "r00017.2")
fn is_meta_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next() == Some('r')
        && tag.len() > 1
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
}

/// Extract META tags from `git ls-remote --refs --tags` output, in the
/// order the remote reported them.
fn parse_meta_tags(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|reference| reference.strip_prefix("refs/tags/"))
        .filter(|tag| is_meta_tag(tag))
        .map(|tag| tag.to_string())
        .collect()
}

/// Baseline tag set for a target seen for the first time: everything but
/// the newest tag, so the first poll mirrors the latest release instead
/// of doing nothing until the next one ships.
fn first_poll_baseline(tags: &[String]) -> HashSet<String> {
    let keep = tags.len().saturating_sub(1);
    tags[..keep].iter().cloned().collect()
}

/// Pack a directory into an in-memory gzipped tar (blocking-pool work).
async fn pack_tar_gz(dir: &Path) -> Result<Vec<u8>, String> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let gz = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        builder
            .append_dir_all(".", &dir)
            .map_err(|e| format!("packing {}: {e}", dir.display()))?;
        builder
            .into_inner()
            .and_then(|gz| gz.finish())
            .map_err(|e| format!("finishing archive: {e}"))
    })
    .await
    .map_err(|e| format!("archive task failed: {e}"))?
}

/// Ingestion worker mirroring META git repos.
///
/// Holds the last seen tag set per target so only new releases trigger a
/// clone. The credential bundle directory is exported as HOME for every
/// git invocation, so credentials extracted into it (.netrc, .gitconfig,
/// ssh keys) apply without touching the host environment. Each new
/// release is archived to object storage before the tag set is committed,
/// so a failed upload is retried on the next poll.
pub struct GitMetaFetcher {
    mirrors_dir: PathBuf,
    credentials: Arc<CredentialBundle>,
    object_store: Arc<dyn ObjectStore>,
    seen_tags: Mutex<HashMap<String, HashSet<String>>>,
}

impl GitMetaFetcher {
    pub fn new(
        mirrors_dir: PathBuf,
        credentials: Arc<CredentialBundle>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            mirrors_dir,
            credentials,
            object_store,
            seen_tags: Mutex::new(HashMap::new()),
        }
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, String> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("HOME", self.credentials.dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(args = ?args, "Running git");
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("spawn failed: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("git exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn git_url(spec: &FetchSpec) -> Result<String, FetchFailure> {
        spec.as_value()
            .get("git_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| FetchFailure::new("spec", "fetch_spec is missing 'git_url'"))
    }

    /// New tags relative to the stored baseline; primes the baseline on
    /// the first poll of a target.
    fn tags_delta(&self, target_id: &str, tags: &[String]) -> Vec<String> {
        let mut seen = self.seen_tags.lock().unwrap();
        let baseline = seen
            .entry(target_id.to_string())
            .or_insert_with(|| first_poll_baseline(tags));
        tags.iter()
            .filter(|t| !baseline.contains(*t))
            .cloned()
            .collect()
    }

    fn commit_tags(&self, target_id: &str, tags: &[String]) {
        let mut seen = self.seen_tags.lock().unwrap();
        seen.insert(target_id.to_string(), tags.iter().cloned().collect());
    }

    fn archive_url(target_id: &str, tag: &str) -> String {
        format!("{ARCHIVE_BUCKET}/{target_id}/{tag}/{ARCHIVE_NAME}")
    }

    /// Pack the freshly cloned mirror and upload it under its HEAD tag.
    async fn archive_mirror(
        &self,
        target_id: &str,
        mirror_dir: &Path,
        head_tag: &str,
    ) -> Result<(), FetchFailure> {
        let archive = pack_tar_gz(mirror_dir)
            .await
            .map_err(|e| FetchFailure::new("archive", e))?;
        let url = Self::archive_url(target_id, head_tag);
        self.object_store
            .put(&url, archive)
            .await
            .map_err(|e| FetchFailure::new("upload", e.to_string()))?;
        info!(target = %target_id, url = %url, "META source archived");
        Ok(())
    }
}

#[async_trait]
impl MetaFetcher for GitMetaFetcher {
    async fn fetch(&self, target_id: &str, spec: &FetchSpec) -> Result<(), FetchFailure> {
        let url = Self::git_url(spec)?;

        let raw = self
            .run_git(&["ls-remote", "--refs", "--tags", &url], None)
            .await
            .map_err(|e| FetchFailure::new("ls-remote", e))?;
        let tags = parse_meta_tags(&raw);
        if tags.is_empty() {
            debug!(target = %target_id, "Remote has no META tags");
            return Ok(());
        }

        let new_tags = self.tags_delta(target_id, &tags);
        if new_tags.is_empty() {
            info!(target = %target_id, "No new META tags");
            return Ok(());
        }
        info!(target = %target_id, new_tags = ?new_tags, "New META tags found");

        let mirror_dir = self.mirrors_dir.join(target_id);
        if let Err(e) = tokio::fs::remove_dir_all(&mirror_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(FetchFailure::new("clone", format!("clearing mirror: {e}")));
            }
        }
        let mirror = mirror_dir.to_string_lossy().to_string();
        self.run_git(&["clone", "--depth=1", "--quiet", &url, &mirror], None)
            .await
            .map_err(|e| FetchFailure::new("clone", e))?;

        let head_tag = self
            .run_git(&["describe"], Some(&mirror_dir))
            .await
            .map(|out| out.trim().to_string())
            .map_err(|e| FetchFailure::new("describe", e))?;
        if !tags.contains(&head_tag) {
            return Err(FetchFailure::new(
                "describe",
                format!("expected new tags but HEAD points to {head_tag}"),
            ));
        }

        self.archive_mirror(target_id, &mirror_dir, &head_tag).await?;

        self.commit_tags(target_id, &tags);
        info!(target = %target_id, tag = %head_tag, "Mirror updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metamon_core::port::object_store::mocks::MockObjectStore;

    fn fetcher(root: &Path, store: MockObjectStore) -> GitMetaFetcher {
        let bundle = Arc::new(CredentialBundle::new(root.join("creds")));
        GitMetaFetcher::new(root.join("mirrors"), bundle, Arc::new(store))
    }

    const LS_REMOTE_OUTPUT: &str = "\
2c9a1b6f3d9e8a7c5b4f2e1d0c9b8a7f6e5d4c3b\trefs/tags/r00015\n\
9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2a1f0e\trefs/tags/r00016.1\n\
1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b\trefs/tags/r00017_rev2\n\
5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1a2b3c4d\trefs/tags/v2.0\n";

    #[test]
    fn parses_meta_tags_only() {
        let tags = parse_meta_tags(LS_REMOTE_OUTPUT);
        assert_eq!(tags, vec!["r00015", "r00016.1", "r00017_rev2"]);
    }

    #[test]
    fn meta_tag_shape() {
        assert!(is_meta_tag("r00017.2"));
        assert!(is_meta_tag("r_partial_1"));
        assert!(!is_meta_tag("v2.0"));
        assert!(!is_meta_tag("r"));
        assert!(!is_meta_tag("rUPPER"));
    }

    #[test]
    fn first_poll_baseline_omits_newest_tag() {
        let tags: Vec<String> = vec!["r1".into(), "r2".into(), "r3".into()];
        let baseline = first_poll_baseline(&tags);
        assert!(baseline.contains("r1"));
        assert!(baseline.contains("r2"));
        assert!(!baseline.contains("r3"));
    }

    #[test]
    fn missing_git_url_is_a_spec_failure() {
        let err = GitMetaFetcher::git_url(&FetchSpec::new(serde_json::json!({}))).unwrap_err();
        assert_eq!(err.stage, "spec");
    }

    #[test]
    fn tags_delta_tracks_new_releases() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = fetcher(tmp.path(), MockObjectStore::new_success(Vec::new()));

        let tags: Vec<String> = vec!["r1".into(), "r2".into()];
        // First poll: only the newest tag is new.
        assert_eq!(fetcher.tags_delta("sdm845", &tags), vec!["r2".to_string()]);
        fetcher.commit_tags("sdm845", &tags);

        // Nothing changed on the remote.
        assert!(fetcher.tags_delta("sdm845", &tags).is_empty());

        // A release shipped.
        let tags: Vec<String> = vec!["r1".into(), "r2".into(), "r3".into()];
        assert_eq!(fetcher.tags_delta("sdm845", &tags), vec!["r3".to_string()]);
    }

    #[test]
    fn archive_url_pins_target_and_tag() {
        assert_eq!(
            GitMetaFetcher::archive_url("sdm845-la-2-0", "r00017.2"),
            "gs://meta-source/sdm845-la-2-0/r00017.2/meta-source.tar.gz"
        );
    }

    #[tokio::test]
    async fn new_release_mirror_is_packed_and_uploaded() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = tmp.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("BUILD.bzl"), b"meta_build()").unwrap();

        let store = Arc::new(MockObjectStore::new_success(Vec::new()));
        let bundle = Arc::new(CredentialBundle::new(tmp.path().join("creds")));
        let fetcher = GitMetaFetcher::new(
            tmp.path().join("mirrors"),
            bundle,
            Arc::clone(&store) as Arc<dyn ObjectStore>,
        );

        fetcher
            .archive_mirror("sdm845", &mirror, "r00018")
            .await
            .unwrap();

        let puts = store.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "gs://meta-source/sdm845/r00018/meta-source.tar.gz");
        // gzip magic: the upload is a compressed archive, not raw bytes
        assert_eq!(&puts[0].1[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn failed_upload_is_a_failed_poll() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = tmp.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("BUILD.bzl"), b"meta_build()").unwrap();

        let fetcher = fetcher(tmp.path(), MockObjectStore::new_put_fail("503 backend"));
        let err = fetcher
            .archive_mirror("sdm845", &mirror, "r00018")
            .await
            .unwrap_err();
        assert_eq!(err.stage, "upload");
    }
}
