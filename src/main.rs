//! Conclave HTTP server
//!
//! Starts an Axum web server that routes generation tasks to model
//! backends, fans judged tasks out to councils, and records outcomes.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use clap::Parser;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

use conclave::cli::{Cli, Command, generate_config_template};
use conclave::config::Config;
use conclave::handlers::{self, AppState};
use conclave::middleware::request_id_middleware;
use conclave::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote template configuration to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration (read, parse, validate - referential integrity
    // failures abort startup here)
    let config = Config::from_file(&cli.config)?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers().len(),
        tasks = config.task_rules().len(),
        "Starting Conclave server"
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(config)?;

    let app = Router::new()
        .route("/v1/tasks", post(handlers::submit::handler))
        .route("/health", get(handlers::health::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
