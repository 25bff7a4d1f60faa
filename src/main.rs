mod cli;

use std::io::Write as _;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use ollama_installer::control::NativeProcessTable;
use ollama_installer::health::HttpHealthProbe;
use ollama_installer::install::{GitHubReleases, LocationStore, Platform};
use ollama_installer::{InstallOutcome, InstallerConfig, Lifecycle, LifecycleSettings};

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let platform = Platform::detect()?;
    let store = LocationStore::beside_current_exe()?;
    let cfg = InstallerConfig::load(args.config.as_deref(), store.state_dir())?;
    let mut settings = LifecycleSettings::from_config(&cfg, platform);

    if let cli::Cmd::Start { model, timeout } = &args.sub {
        if let Some(model) = model {
            settings.post_start = if model.is_empty() {
                Vec::new()
            } else {
                vec!["pull".to_string(), model.clone()]
            };
        }
        if let Some(secs) = timeout {
            settings.start_timeout = Some(std::time::Duration::from_secs(*secs));
        }
    }

    let lifecycle = Lifecycle::new(
        platform,
        store,
        GitHubReleases::new(&cfg.api_base, &cfg.repository)?,
        HttpHealthProbe::new(&cfg.health_url)?,
        NativeProcessTable::default(),
        settings,
    );

    match args.sub {
        cli::Cmd::Install {
            release,
            install_path,
        } => {
            info!("Installing ollama...");
            match lifecycle.install(&release, install_path.as_deref()).await? {
                InstallOutcome::AlreadyRunning => {}
                InstallOutcome::Existing(path) | InstallOutcome::Installed(path) => {
                    info!("Ollama available at {}", path.display());
                }
            }
            Ok(())
        }
        cli::Cmd::Uninstall => {
            info!("Uninstalling ollama...");
            lifecycle.uninstall().await
        }
        cli::Cmd::Locate => {
            if let Some(location) = lifecycle.locate()? {
                let mut stdout = std::io::stdout().lock();
                write!(stdout, "{}", location.display())
                    .and_then(|()| stdout.flush())
                    .context("Failed to output location")?;
            }
            Ok(())
        }
        cli::Cmd::Check => {
            let status = lifecycle.check().await;
            println!(
                "{}",
                serde_json::to_string(&status).context("Failed to serialize status")?
            );
            Ok(())
        }
        cli::Cmd::Start { .. } => lifecycle.start().await,
        cli::Cmd::Shutdown => lifecycle.shutdown().await,
    }
}
