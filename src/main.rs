use catalog::db::{self, CategoryRepository, ProductRepository, Storage};
use catalog::{api, config::Config, logging};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing; RUST_LOG takes precedence over LOG_LEVEL
    let subscriber = logging::subscriber(logging::env_filter(config.log_level), std::io::stdout);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // The service cannot run without a datastore
    let pool = match db::connect(&config.postgres, config.pool_settings(), config.retry_policy())
        .await
    {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let storage = Storage::new(pool);
    let state = api::AppState::new(
        Arc::new(ProductRepository::new(storage.clone())),
        Arc::new(CategoryRepository::new(storage.clone())),
        Arc::new(storage),
        config.query_timeout,
    );

    // Create router
    let app = api::create_router(state, &config.cors_allowed_origins);

    // Bind to address
    let addr = SocketAddr::new(config.bind_ip, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
