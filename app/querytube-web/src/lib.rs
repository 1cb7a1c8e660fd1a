pub mod cli;
pub mod server;

pub use cli::Cli;
pub use server::{router, serve, AppState};

const DEFAULT_LOG_FILTER: &str = "querytube=info,querytube_web=info,tower_http=info";

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .init();
}
