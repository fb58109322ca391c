pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

pub use config::Config;
use db::Store;
use state::SharedState;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = {
        use metrics_exporter_prometheus::PrometheusBuilder;
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("Prometheus metrics recorder initialized");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {e}");
                None
            }
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve" | "daemon" | "-d" | "--daemon") => {
            run_server(config, prometheus_handle).await
        }

        Some("init" | "--init") => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        Some("user") => {
            if args.len() < 6 || args[2] != "add" {
                println!("Usage: easel user add <username> <email> <password>");
                return Ok(());
            }
            cmd_user_add(&config, &args[3], &args[4], &args[5]).await
        }

        Some("purge-sessions") => cmd_purge_sessions(&config).await,

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Easel - Image Generation Backend");
    println!("HTTP frontend for Stable Diffusion WebUI and Replicate");
    println!();
    println!("USAGE:");
    println!("  easel [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  serve             Run the HTTP server (default)");
    println!("  init              Create default config file");
    println!("  user add <username> <email> <password>");
    println!("                    Create a user account from the command line");
    println!("  purge-sessions    Delete expired session tokens");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the WebUI URL, backend, etc.");
    println!("  Set REPLICATE_API_TOKEN to enable the Replicate backend.");
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Easel v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;
    let sweep_minutes = config.security.session_sweep_minutes;

    let shared = Arc::new(SharedState::new(config).await?);
    let api_state = api::create_app_state(shared.clone(), prometheus_handle).await?;

    let sweeper_handle = spawn_session_sweeper(shared.store.clone(), sweep_minutes);

    let app = api::router(api_state).await;
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 Server running at http://{addr}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    sweeper_handle.abort();
    server_handle.abort();
    info!("Server stopped");

    Ok(())
}

/// Periodically deletes expired session rows so the table does not grow
/// without bound.
fn spawn_session_sweeper(store: Store, sweep_minutes: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_minutes.max(1) * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match store.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {purged} expired sessions"),
                Err(e) => warn!("Session sweep failed: {e}"),
            }
        }
    })
}

async fn cmd_user_add(
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    use services::{AuthService, SeaOrmAuthService};
    use tokio::sync::RwLock;

    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let auth = SeaOrmAuthService::new(store, Arc::new(RwLock::new(config.clone())));

    match auth.register(username, email, password, None).await {
        Ok(user) => {
            println!("✓ Created user: {} (ID: {})", user.username, user.id);
            Ok(())
        }
        Err(e) => {
            println!("Failed to create user: {e}");
            Ok(())
        }
    }
}

async fn cmd_purge_sessions(config: &Config) -> anyhow::Result<()> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let purged = store.purge_expired_sessions().await?;
    println!("✓ Purged {purged} expired sessions");

    Ok(())
}
