#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use moonfall_server::config;
use moonfall_server::logging;
use moonfall_server::server::GameServer;
use moonfall_server::store::InMemoryStore;
use moonfall_server::websocket;
use std::net::SocketAddr;
use std::sync::Arc;

/// Moonfall -- authoritative game engine server for voice-assisted Werewolf
#[derive(Parser, Debug)]
#[command(name = "moonfall-server")]
#[command(about = "Authoritative real-time game engine for voice-assisted Werewolf sessions")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code
    // defaults.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // config::load() already validated and only warned; capture the result
    // here to provide a proper exit code for --validate-config and to fail
    // startup when critical settings are missing.
    let validation_result = config::validate_config_security(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Storage backend: InMemory");
                println!("  Metrics auth required: {}", cfg.security.require_metrics_auth);
                println!("  Night duration: {}s", cfg.rules.night_duration_secs());
                println!("  Day duration: {}s", cfg.rules.day_duration_secs());
                println!("  Voting duration: {}s", cfg.rules.voting_duration_secs());
                println!("  Sweep interval: {}s", cfg.engine.sweep_interval_secs);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result.map_err(|e| anyhow::anyhow!("invalid configuration:\n{e}"))?;

    logging::init_with_config(&cfg.logging);

    let port: u16 = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting Moonfall server");

    let store = Arc::new(InMemoryStore::new());
    let cors_origins = cfg.security.cors_origins.clone();
    let server = GameServer::new(cfg, store).await?;

    let router = axum::Router::new()
        .nest("/v1", websocket::create_router(&cors_origins))
        .fallback(|| async {
            "Moonfall Server. WebSocket: /v1/ws, sessions: /v1/sessions, metrics: /v1/metrics."
        })
        .with_state(server.clone());
    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        "Server started - WebSocket: /v1/ws, sessions: /v1/sessions, metrics: /v1/metrics"
    );

    let shutdown_server = server.clone();
    axum::serve(listener, make_service)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            shutdown_server.shutdown().await;
        })
        .await?;

    Ok(())
}
