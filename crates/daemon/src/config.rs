//! Process configuration (flags with environment fallbacks)

use clap::Parser;
use metamon_core::application::scheduler::constants::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL_SECS,
};
use std::path::PathBuf;

/// Keeps local META mirrors for a fleet of SoC targets up to date.
#[derive(Parser, Debug)]
#[command(name = "metamon", version, about)]
pub struct Args {
    /// Location of the encrypted credential archive (gs:// or https://)
    #[arg(long, env = "METAMON_SECRET_URL")]
    pub secret_url: String,

    /// KMS project holding the credential decryption key
    #[arg(long, env = "METAMON_KMS_PROJECT")]
    pub kms_project: String,

    /// KMS keyring holding the credential decryption key
    #[arg(long, env = "METAMON_KMS_KEYRING")]
    pub kms_keyring: String,

    /// KMS key used to decrypt the credential archive
    #[arg(long, env = "METAMON_KMS_KEY")]
    pub kms_key: String,

    /// Time between META poll attempts of one target, in seconds
    #[arg(
        long,
        env = "METAMON_POLL_INTERVAL",
        default_value_t = DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub meta_poll_interval: u64,

    /// Maximum simultaneously in-flight ingestion workers
    #[arg(
        long,
        env = "METAMON_MAX_CONCURRENCY",
        default_value_t = DEFAULT_MAX_CONCURRENCY,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub max_concurrency: usize,

    /// JSON target registry file; built-in SoC targets when omitted
    #[arg(long, env = "METAMON_TARGETS_FILE")]
    pub targets_file: Option<PathBuf>,

    /// Directory the credential bundle is extracted into
    #[arg(
        long,
        env = "METAMON_CREDENTIALS_DIR",
        default_value = "~/.metamon/credentials"
    )]
    pub credentials_dir: String,

    /// Working folder for staging and mirror operations
    #[arg(long, env = "METAMON_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "METAMON_LOG", default_value = "info")]
    pub log: String,
}

impl Args {
    pub fn credentials_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.credentials_dir).into_owned())
    }

    pub fn work_path(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("metamon"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<&'static str> {
        vec![
            "metamon",
            "--secret-url",
            "gs://meta-secrets/creds.tar.gz.enc",
            "--kms-project",
            "meta-monitor",
            "--kms-keyring",
            "monitor-ring",
            "--kms-key",
            "credentials-key",
        ]
    }

    #[test]
    fn defaults_apply() {
        let args = Args::try_parse_from(required()).unwrap();
        assert_eq!(args.meta_poll_interval, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(args.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert!(args.targets_file.is_none());
        assert_eq!(args.log, "info");
    }

    #[test]
    fn poll_interval_must_be_positive() {
        let mut argv = required();
        argv.extend(["--meta-poll-interval", "0"]);
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn missing_kms_coordinates_are_rejected() {
        let argv = vec![
            "metamon",
            "--secret-url",
            "gs://meta-secrets/creds.tar.gz.enc",
        ];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn tilde_in_credentials_dir_expands() {
        let args = Args::try_parse_from(required()).unwrap();
        assert!(!args.credentials_path().to_string_lossy().starts_with('~'));
    }
}
