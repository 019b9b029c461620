use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use yudao_admin::cache::{CacheStore, RedisCache};
use yudao_admin::{db, job, routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: yudao-admin [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: ./etc/yudao.toml)");
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "./etc/yudao.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Initialize logging
    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Yudao admin server...");
    info!("Loading configuration from: {}", config_path);

    let db_conn = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    if db::seed_defaults(&db_conn, config.auth.bcrypt_cost).await? {
        info!(
            "Empty database seeded, log in as '{}' on tenant '{}'",
            db::DEFAULT_ADMIN_USERNAME,
            db::DEFAULT_TENANT_NAME
        );
    }

    let cache: Arc<dyn CacheStore> = Arc::new(RedisCache::connect(&config.redis).await.map_err(|e| {
        tracing::error!("Redis connection failed: {}", e);
        anyhow::anyhow!("Redis connection failed: {}", e)
    })?);
    info!("Cache connection established");

    let handlers = job::builtin_handlers(&db_conn)?;
    let job_enabled = config.job.enabled;
    let addr_config = config.addr.clone();
    let state = AppState::build(db_conn, config, cache, handlers).await?;
    info!("Permission policies loaded");

    if job_enabled {
        let scheduled = state.jobs.sync().await?;
        info!("Scheduled {} jobs", scheduled);
    } else {
        info!("Job scheduler disabled by configuration");
    }

    let app = routes::create_router(state.clone());

    // Parse address
    let addr: SocketAddr = addr_config.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid address '{}', using default 0.0.0.0:48080", addr_config);
        SocketAddr::from(([0, 0, 0, 0], 48080))
    });

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping job scheduler...");
    state.jobs.scheduler().shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
