//! Lifecycle orchestration for the managed Ollama executable
//!
//! Sequences discovery, installation, readiness polling, the post-start
//! command and termination. Every collaborator with side effects outside the
//! install tree is injected:
//! - [`ReleaseSource`] for release assets
//! - [`HealthProbe`] for the local endpoint
//! - [`ProcessTable`] for running instances
//!
//! Operations run one at a time and to completion. The `serve` process is
//! the only thing left running afterwards.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::InstallerConfig;
use crate::control::{ProcessTable, terminate_instances};
use crate::health::HealthProbe;
use crate::install::download::extract::remove_path;
use crate::install::download::{BINARY_NAME, Platform, ReleaseSource, install_release};
use crate::install::{LocationStore, StoredLocation, find_executable};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to find ollama executable; was it installed?")]
    NotInstalled,

    #[error("ollama did not become healthy within {0:?}")]
    HealthTimeout(Duration),

    #[error("`ollama {command}` failed with {status}")]
    PostStartFailed { command: String, status: ExitStatus },
}

/// Tunables for the orchestrator, usually taken from [`InstallerConfig`].
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub asset_name: String,
    /// Arguments for the command run once the server is healthy
    pub post_start: Vec<String>,
    pub version_check_attempts: u32,
    pub retry_interval: Duration,
    pub health_poll_interval: Duration,
    pub start_timeout: Option<Duration>,
    /// Installs made outside this tool, searched after the managed one
    pub external_candidates: Vec<PathBuf>,
}

impl LifecycleSettings {
    pub fn from_config(cfg: &InstallerConfig, platform: Platform) -> Self {
        Self {
            asset_name: cfg
                .asset_name
                .clone()
                .unwrap_or_else(|| platform.asset_name().to_string()),
            post_start: cfg.post_start.clone(),
            version_check_attempts: cfg.version_check_attempts,
            retry_interval: cfg.retry_interval(),
            health_poll_interval: cfg.health_poll_interval(),
            start_timeout: cfg.start_timeout(),
            external_candidates: platform.external_candidates(),
        }
    }
}

/// What `install` ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The health endpoint already answered; nothing was touched
    AlreadyRunning,
    /// A usable executable was already on disk
    Existing(PathBuf),
    /// Downloaded and extracted a release
    Installed(PathBuf),
}

/// Report printed by `check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub installed: bool,
    pub running: bool,
    pub executable: Option<PathBuf>,
}

pub struct Lifecycle<R, H, P> {
    platform: Platform,
    store: LocationStore,
    registry: R,
    health: H,
    processes: P,
    settings: LifecycleSettings,
}

impl<R, H, P> Lifecycle<R, H, P>
where
    R: ReleaseSource + Sync,
    H: HealthProbe + Sync,
    P: ProcessTable,
{
    pub fn new(
        platform: Platform,
        store: LocationStore,
        registry: R,
        health: H,
        processes: P,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            platform,
            store,
            registry,
            health,
            processes,
            settings,
        }
    }

    pub fn store(&self) -> &LocationStore {
        &self.store
    }

    fn find_executable(&self) -> Option<PathBuf> {
        find_executable(&self.store, self.platform, &self.settings.external_candidates)
    }

    /// Install ollama unless it is already running or already on disk.
    ///
    /// With `install_path`, installs into `<install_path>/ollama` instead of
    /// the resolved location.
    pub async fn install(&self, release: &str, install_path: Option<&Path>) -> Result<InstallOutcome> {
        if self.health.is_healthy().await {
            info!("Ollama seems to be running correctly.");
            return Ok(InstallOutcome::AlreadyRunning);
        }

        let outcome = match self.find_executable() {
            Some(existing) => {
                info!("Using existing ollama at {}", existing.display());
                InstallOutcome::Existing(existing)
            }
            None => {
                let location = match install_path {
                    Some(dir) => dir.join(BINARY_NAME),
                    None => self
                        .store
                        .resolve()
                        .context("Failed to get default install location")?,
                };

                self.store
                    .save(&location)
                    .context("Failed to save install location")?;

                match install_release(
                    &self.registry,
                    self.platform,
                    release,
                    &self.settings.asset_name,
                    &location,
                )
                .await
                {
                    Ok(executable) => InstallOutcome::Installed(executable),
                    Err(e) => {
                        if let Err(clear_err) = self.store.clear() {
                            warn!("Failed to clear install location after failed install: {clear_err}");
                        }
                        return Err(e.context("Failed to install ollama"));
                    }
                }
            }
        };

        if let InstallOutcome::Existing(executable) | InstallOutcome::Installed(executable) = &outcome {
            self.wait_until_runnable(executable).await;
        }
        Ok(outcome)
    }

    /// Run `--version` until it succeeds or attempts run out.
    ///
    /// A freshly written binary can stay locked for a while (virus scanners),
    /// so this only buys time; running out of attempts is not an error.
    async fn wait_until_runnable(&self, executable: &Path) {
        let attempts = self.settings.version_check_attempts;
        for attempt in 1..=attempts {
            let result = tokio::process::Command::new(executable)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match result {
                Ok(status) if status.success() => {
                    debug!("{} --version succeeded", executable.display());
                    return;
                }
                Ok(status) => debug!(
                    "{} --version exited with {} (attempt {}/{})",
                    executable.display(),
                    status,
                    attempt,
                    attempts
                ),
                Err(e) => debug!(
                    "Failed to run {} --version (attempt {}/{}): {}",
                    executable.display(),
                    attempt,
                    attempts,
                    e
                ),
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_interval).await;
            }
        }
        warn!(
            "{} did not run successfully after {} attempts",
            executable.display(),
            attempts
        );
    }

    /// Stop running instances of the managed install, then delete it.
    ///
    /// An install that is already gone is success. If any instance cannot be
    /// stopped the files are left alone.
    pub async fn uninstall(&self) -> Result<()> {
        let stored = self
            .store
            .load()
            .context("Failed to read install location")?;
        let location = self
            .store
            .resolve()
            .context("Failed to get install location")?;
        let executable = self.platform.executable_in(&location);

        let report = terminate_instances(&self.processes, &executable).with_context(|| {
            format!("Failed to stop running ollama at {}", executable.display())
        })?;
        if !report.matched.is_empty() {
            info!("Stopped {} running instance(s)", report.matched.len());
        }

        match remove_path(&location) {
            Ok(()) => info!("Removed {}", location.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Nothing installed at {}", location.display());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", location.display()));
            }
        }

        if stored != StoredLocation::Unrecorded {
            self.store
                .clear()
                .context("Failed to clear install location")?;
        }
        Ok(())
    }

    /// The current install location, if something is installed there.
    pub fn locate(&self) -> Result<Option<PathBuf>> {
        let location = self
            .store
            .resolve()
            .context("Failed to get install location")?;
        Ok(location.exists().then_some(location))
    }

    pub async fn check(&self) -> Status {
        let executable = self.find_executable();
        Status {
            installed: executable.is_some(),
            running: self.health.is_healthy().await,
            executable,
        }
    }

    /// Start `ollama serve` in the background and wait for it to be healthy.
    ///
    /// Never installs. Once healthy, runs the post-start command in the
    /// foreground and fails if it does.
    pub async fn start(&self) -> Result<()> {
        if self.health.is_healthy().await {
            info!("Ollama seems to be running correctly.");
            return Ok(());
        }

        let executable = self.find_executable().ok_or(LifecycleError::NotInstalled)?;

        // Detached: the child keeps running after this handle is dropped
        std::process::Command::new(&executable)
            .arg("serve")
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start ollama server ({})", executable.display()))?;

        self.wait_until_healthy().await?;

        if let Some((command, args)) = self.settings.post_start.split_first() {
            let status = tokio::process::Command::new(&executable)
                .arg(command)
                .args(args)
                .stdin(Stdio::null())
                .status()
                .await
                .with_context(|| format!("Failed to run ollama {}", self.settings.post_start.join(" ")))?;
            if !status.success() {
                return Err(LifecycleError::PostStartFailed {
                    command: self.settings.post_start.join(" "),
                    status,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn wait_until_healthy(&self) -> Result<(), LifecycleError> {
        info!("Waiting for ollama to become healthy...");
        let started = Instant::now();

        while !self.health.is_healthy().await {
            if let Some(timeout) = self
                .settings
                .start_timeout
                .filter(|&timeout| started.elapsed() >= timeout)
            {
                return Err(LifecycleError::HealthTimeout(timeout));
            }
            tokio::time::sleep(self.settings.health_poll_interval).await;
        }
        info!("Ollama is healthy");
        Ok(())
    }

    /// Stop every running instance of the installed executable.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(executable) = self.find_executable() else {
            info!("Ollama is not installed; nothing to shut down");
            return Ok(());
        };

        let report = terminate_instances(&self.processes, &executable).with_context(|| {
            format!("Failed to stop running ollama at {}", executable.display())
        })?;
        info!(
            "Stopped {} running instance(s) of {}",
            report.matched.len(),
            executable.display()
        );
        Ok(())
    }
}
