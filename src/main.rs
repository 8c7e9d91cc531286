use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secretops::{
    api::{build_router, start_api_server, TokenAuthenticator},
    cli::Cli,
    config::AppConfig,
    observability::{init_observability, log_config_info},
    secrets::{
        seed_catalog, InMemoryMetadataStore, KvVaultClient, LifecycleSettings,
        SecretLifecycle, SharedClock, SystemClock,
    },
    Error, APP_NAME, VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if cli.check_config {
        println!("Configuration OK");
        return Ok(());
    }

    let metrics = init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting secretops");
    log_config_info(&config);

    let vault_config = config
        .vault
        .as_ref()
        .ok_or_else(|| Error::config("SECRETOPS_VAULT_ADDR must be set"))?;
    let vault = Arc::new(KvVaultClient::new(vault_config)?);

    let clock: SharedClock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryMetadataStore::new(
        seed_catalog(
            &config.secrets.environment,
            &config.secrets.vault_resource_prefix,
            config.secrets.rotation_interval(),
            clock.now(),
        ),
        clock.clone(),
    ));

    let cipher = config.break_glass.cipher()?;
    if cipher.is_none() {
        warn!("No break-glass key configured; break-glass requests will be rejected");
    }

    let lifecycle = SecretLifecycle::new(
        vault,
        store,
        cipher,
        LifecycleSettings {
            cache: config.secrets.cache_settings(),
            alert_threshold: config.secrets.alert_threshold,
        },
        clock,
        metrics.clone(),
    );

    let authenticator = TokenAuthenticator::new(&config.auth.tokens, metrics);
    if authenticator.is_empty() {
        warn!("No API tokens configured; every request will be rejected");
    }

    let monitor = lifecycle.monitor(config.secrets.monitor_interval()).spawn();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Shutdown listener failed"),
        }
        signal_token.cancel();
    });

    let router = build_router(lifecycle, authenticator);
    let served = start_api_server(&config.api, router, shutdown.clone()).await;

    shutdown.cancel();
    monitor.stop().await;
    served?;

    info!("secretops shutdown completed");
    Ok(())
}
