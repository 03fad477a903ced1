use std::{env, net::SocketAddr, process::exit, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fintrack_rs::{
    AppState, CacheConfig, build_router, graceful_shutdown, local_today, logging_middleware,
};

/// The timezone used when `TIMEZONE` is not set.
const DEFAULT_TIMEZONE: &str = "Etc/UTC";

/// The REST API server for fintrack_rs.
///
/// The local timezone, used to work out today's date, is read from the
/// environment variable `TIMEZONE`, e.g. `TIMEZONE=America/Sao_Paulo`.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// How long occurrence listings are cached for, in seconds.
    #[arg(long, default_value_t = 300)]
    cache_ttl_seconds: u64,

    /// The maximum number of cached occurrence listings. Zero disables caching.
    #[arg(long, default_value_t = 100)]
    cache_capacity: usize,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let local_timezone = env::var("TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_owned());
    if let Err(error) = local_today(&local_timezone) {
        eprintln!("{error}, set TIMEZONE to a canonical timezone name such as 'America/Sao_Paulo'.");
        exit(1);
    }

    let connection = match Connection::open(&args.db_path) {
        Ok(connection) => connection,
        Err(error) => {
            eprintln!("Could not open the database at {}: {error}", args.db_path);
            exit(1);
        }
    };

    let cache_config = CacheConfig {
        ttl: Duration::from_secs(args.cache_ttl_seconds),
        capacity: args.cache_capacity,
    };
    let state = match AppState::new(connection, &local_timezone, cache_config) {
        Ok(state) => state,
        Err(error) => {
            eprintln!("Could not initialize the database: {error}");
            exit(1);
        }
    };

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state).layer(middleware::from_fn(logging_middleware));
    let router = add_tracing_layer(router);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    tracing::info!("HTTP server listening on {}", addr);

    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("Server stopped with an error: {error}");
        exit(1);
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are turned into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
