//! Metamon - Main Entry Point
//!
//! Lifecycle: provision credentials -> load targets -> poll until a
//! shutdown signal arrives. Each fatal stage exits with its own code so
//! operators can tell a provisioning failure from a target-load failure
//! from a scheduler crash without reading the logs.

mod config;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metamon_core::application::provision::{ProvisionSpec, Provisioner};
use metamon_core::application::registry::{load_targets, RegistryConfig};
use metamon_core::application::scheduler::{stop_channel, PollScheduler, SchedulerConfig};
use metamon_core::domain::Target;
use metamon_core::port::kms::KmsKeyRef;
use metamon_core::port::time_provider::SystemTimeProvider;
use metamon_core::port::ObjectStore;
use metamon_infra_gcloud::{GcpKmsClient, HttpObjectStore};
use metamon_infra_system::{GitMetaFetcher, TarGzExtractor};

const EXIT_PROVISION_FAILED: u8 = 2;
const EXIT_TARGET_LOAD_FAILED: u8 = 3;
const EXIT_SCHEDULER_CRASHED: u8 = 4;

/// Fatal startup/runtime stages, each with a distinct exit code.
/// Context is logged at the failure site before this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fatal {
    Provision,
    TargetLoad,
    Scheduler,
}

impl Fatal {
    fn exit_code(self) -> u8 {
        match self {
            Fatal::Provision => EXIT_PROVISION_FAILED,
            Fatal::TargetLoad => EXIT_TARGET_LOAD_FAILED,
            Fatal::Scheduler => EXIT_SCHEDULER_CRASHED,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = config::Args::parse();
    init_tracing(&args.log);

    info!("Metamon v{} starting...", metamon_core::VERSION);

    match run(args).await {
        Ok(()) => {
            info!("Shutdown complete.");
            ExitCode::SUCCESS
        }
        Err(fatal) => ExitCode::from(fatal.exit_code()),
    }
}

fn init_tracing(default_level: &str) {
    let log_format = std::env::var("METAMON_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

async fn run(args: config::Args) -> Result<(), Fatal> {
    let work_dir = args.work_path();
    info!(work_dir = %work_dir.display(), "Working folder ready");

    // 1. Provision credentials (composition root wiring)
    info!("Provisioning credentials...");
    // Shared with the fetcher, which uploads META source archives
    let object_store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new());
    let provisioner = Provisioner::new(
        Arc::clone(&object_store),
        Arc::new(GcpKmsClient::new()),
        Arc::new(TarGzExtractor),
        work_dir.clone(),
        args.credentials_path(),
    );
    let spec = ProvisionSpec {
        secret_url: args.secret_url.clone(),
        kms_key: KmsKeyRef {
            project: args.kms_project.clone(),
            keyring: args.kms_keyring.clone(),
            key: args.kms_key.clone(),
        },
    };
    let bundle = match provisioner.provision(&spec).await {
        Ok(bundle) => Arc::new(bundle),
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Provisioning failed");
            return Err(Fatal::Provision);
        }
    };

    // 2. Load the target registry
    let registry = match &args.targets_file {
        Some(path) => {
            let raw = match tokio::fs::read_to_string(path).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Cannot read targets file");
                    return Err(Fatal::TargetLoad);
                }
            };
            match RegistryConfig::from_json(&raw) {
                Ok(registry) => registry,
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Invalid targets file");
                    return Err(Fatal::TargetLoad);
                }
            }
        }
        None => RegistryConfig::builtin(),
    };
    let targets = match load_targets(&registry) {
        Ok(targets) => targets,
        Err(e) => {
            error!(error = %e, "Target load failed");
            return Err(Fatal::TargetLoad);
        }
    };
    info!(targets = targets.len(), "Targets loaded");

    // 3. Start the poll scheduler
    let fetcher = Arc::new(GitMetaFetcher::new(
        work_dir.join("mirrors"),
        Arc::clone(&bundle),
        Arc::clone(&object_store),
    ));
    let scheduler = PollScheduler::new(
        fetcher,
        Arc::new(SystemTimeProvider),
        SchedulerConfig {
            interval: Duration::from_secs(args.meta_poll_interval),
            max_concurrency: args.max_concurrency,
        },
    );
    let (stop_tx, stop_rx) = stop_channel();
    let mut scheduler_handle = tokio::spawn(async move { scheduler.run(targets, stop_rx).await });
    info!("Polling started");

    // 4. Wait for a shutdown signal (or a scheduler crash)
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Cannot install SIGTERM handler");
            return Err(Fatal::Scheduler);
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        joined = &mut scheduler_handle => {
            match joined {
                Ok(_) => error!("Scheduler exited without a shutdown signal"),
                Err(e) => error!(error = %e, "Scheduler task died"),
            }
            return Err(Fatal::Scheduler);
        }
    }

    // 5. Graceful shutdown: no new polls, wait for in-flight ones
    info!("Shutdown signal received. Draining in-flight polls...");
    stop_tx.stop();
    match scheduler_handle.await {
        Ok(final_targets) => {
            log_final_state(&final_targets);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scheduler task died during shutdown");
            Err(Fatal::Scheduler)
        }
    }
}

fn log_final_state(targets: &[Target]) {
    for target in targets {
        if target.consecutive_failures > 0 {
            warn!(
                target = %target.id,
                consecutive_failures = target.consecutive_failures,
                last_error = %target
                    .last_error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown"),
                "Target was failing at shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_exit_codes_are_distinct_and_nonzero() {
        let codes = [
            Fatal::Provision.exit_code(),
            Fatal::TargetLoad.exit_code(),
            Fatal::Scheduler.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in codes.iter().skip(i + 1) {
                assert_ne!(*a, *b);
            }
        }
    }
}
