//! Workspace Sync - a shared file workspace with live updates
//!
//! # Usage
//! ```bash
//! workspace-sync ./uploads               # Serve ./uploads on 127.0.0.1:5000
//! workspace-sync ./project -p 8080       # Different port
//! workspace-sync status                  # Check if running
//! workspace-sync kill                    # Stop running instance
//! ```

mod config;
mod error;
mod events;
mod instance;
mod models;
mod routes;
mod runner;
mod state;
mod workspace;

use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::ServerConfig;
use instance::{InstanceFile, InstanceInfo};
use state::AppState;

/// Workspace Sync - upload, edit and run commands in a shared workspace
#[derive(Parser)]
#[command(name = "workspace-sync")]
#[command(about = "A shared file workspace with real-time sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workspace directory (created if missing) [default: uploads]
    #[arg(value_name = "WORKSPACE", env = "WORKSPACE_ROOT")]
    workspace: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to run the server on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Seconds a command may run before it is killed
    #[arg(long, value_name = "SECS", default_value = "60")]
    command_timeout: u64,

    /// Largest accepted upload per file, in MiB
    #[arg(long, value_name = "MIB", default_value = "100")]
    max_file_size: u64,

    /// Largest total an upload may write once archives are expanded, in MiB
    #[arg(long, value_name = "MIB", default_value = "1024")]
    max_upload_total: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Check if workspace-sync is currently running
    Status,
    /// Stop the running workspace-sync instance
    Kill,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from("uploads")),
            host: self.host,
            port: self.port,
            command_timeout: Duration::from_secs(self.command_timeout.max(1)),
            ..ServerConfig::default()
        }
        .with_max_file_mib(self.max_file_size)
        .with_max_upload_mib(self.max_upload_total)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let instance_file = InstanceFile::default();

    match cli.command {
        Some(Commands::Status) => {
            instance::print_status(&instance_file);
            return Ok(());
        }
        Some(Commands::Kill) => {
            instance::stop_running(&instance_file);
            return Ok(());
        }
        None => {}
    }

    if let Some(info) = instance_file.running() {
        eprintln!("✗ workspace-sync is already running (PID {})", info.pid);
        eprintln!("  Workspace: {}", info.workspace);
        eprintln!("  URL:       {}", info.url());
        eprintln!();
        eprintln!("Run 'workspace-sync kill' to stop it first.");
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.into_config();

    let state = match AppState::new(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("✗ Failed to open workspace: {}", e);
            eprintln!("  Path: {}", config.workspace.display());
            std::process::exit(1);
        }
    };
    let workspace_root = state.workspace.root().to_path_buf();
    let events = state.events.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::create_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to bind to {}: {}", addr, e);
            eprintln!("  Try a different port with --port <PORT>");
            std::process::exit(1);
        }
    };

    let info = InstanceInfo::current(&workspace_root, &addr);
    instance_file.write(&info)?;

    println!();
    println!("  Workspace Sync");
    println!();
    println!("  Workspace: {}", workspace_root.display());
    println!("  Server:    {}", info.url());
    println!("  Events:    ws://{}/ws", addr);
    println!("  Commands time out after {}s", config.command_timeout.as_secs());
    println!(
        "  Uploads are capped at {} MiB per file, {} MiB in total",
        config.max_file_mib(),
        config.max_upload_mib()
    );
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        println!("\n  Shutting down...");
        events.close();
        instance_file.clear();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
