mod db;
mod entities;
mod error;
mod models;
mod password;
mod routes;
mod session;
mod setup;
mod state;
mod storage;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use session::SessionRegistry;
use state::AppState;
use storage::SeaStorage;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Database path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "waitlist.db")]
    db_path: String,

    /// How long an admin login stays valid, in hours
    #[arg(
        long,
        env = "SESSION_TTL_HOURS",
        default_value_t = session::DEFAULT_TTL_HOURS,
        value_parser = clap::value_parser!(i64).range(1..=8760)
    )]
    session_ttl_hours: i64,

    /// Login/setup requests allowed per minute from one IP
    #[arg(long, env = "LOGIN_RATE_LIMIT", default_value_t = 10)]
    login_rate_limit: u32,

    /// Secret that POST /api/admin/setup must present, if set
    #[arg(long, env = "SETUP_KEY")]
    setup_key: Option<String>,

    /// Admin username for first run (a password is generated and printed once)
    #[arg(long, env = "ADMIN_USERNAME")]
    admin_username: Option<String>,
}

/// How often expired sessions and rate-limit windows are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let port = args.port;

    tracing::info!("Initializing database at {}", args.db_path);
    let db = match db::init(&args.db_path).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };
    let storage = Arc::new(SeaStorage::new(db));

    // --- First-Run Admin Control ---
    if let Some(raw) = args.admin_username.as_deref() {
        let username = match validation::validate_username(raw) {
            Ok(username) => username,
            Err(e) => {
                tracing::error!("Invalid ADMIN_USERNAME: {e}");
                std::process::exit(1);
            }
        };
        match setup::bootstrap_admin(storage.as_ref(), &username).await {
            Ok(Some(temp_password)) => {
                println!();
                println!("  ╔══════════════════════════════════════════════╗");
                println!("  ║          FIRST-RUN ADMIN CREATED!            ║");
                println!("  ╠══════════════════════════════════════════════╣");
                println!("  ║  Username: {:<34}║", username);
                println!("  ║  Password: {:<34}║", temp_password);
                println!("  ╠══════════════════════════════════════════════╣");
                println!("  ║  PLEASE SAVE THESE CREDENTIALS NOW!          ║");
                println!("  ╚══════════════════════════════════════════════╝");
                println!();
            }
            Ok(None) => tracing::info!("Admin account already exists, skipping first-run setup"),
            Err(e) => tracing::error!("Failed to create first-run admin: {e}"),
        }
    }

    let sessions = SessionRegistry::in_memory(chrono::Duration::hours(args.session_ttl_hours));
    let state = AppState::new(storage, sessions, args.login_rate_limit, args.setup_key);

    // Background sweeper
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let purged = state.sessions.purge_expired().await;
                if purged > 0 {
                    tracing::debug!("Purged {purged} expired admin sessions");
                }
                state.auth_rate_limiter.cleanup();
            }
        });
    }

    let app = routes::router(state);
    let addr = format!("0.0.0.0:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Waitlist server listening on http://localhost:{port}");

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
