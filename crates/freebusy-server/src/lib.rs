//! Web front end for looking up a Google Calendar's busy intervals.
//!
//! `GET /` renders a form asking for a calendar ID and a time range.
//! `POST /` authorizes against Google (reusing the stored token or running
//! browser consent), queries free/busy and renders the intervals. Any other
//! path is served from the static directory.
//!
//! # Example
//!
//! ```rust,no_run
//! use freebusy_server::{ServerConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     serve(ServerConfig::default()).await?;
//!     Ok(())
//! }
//! ```

mod cli;
mod config;
mod error;
mod handler;
mod signals;
mod views;

pub use cli::Cli;
pub use config::{CONFIG_FILE, GoogleSettings, LogSettings, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, BusyForm, router};
pub use signals::shutdown_signal;
pub use views::{FormView, Outcome};

use tokio::net::TcpListener;
use tracing::info;

use freebusy_google::{Authorizer, FreeBusyClient};

/// Builds the application state from configuration.
pub fn build_state(config: &ServerConfig) -> ServerResult<AppState> {
    let google = config.google.to_google_config();
    let fetcher = FreeBusyClient::new(&google)?;
    let authorizer = Authorizer::new(google)?;
    Ok(AppState::new(authorizer, fetcher))
}

/// Runs the server until SIGINT or SIGTERM.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let state = build_state(&config)?;
    let app = router(state, &config.static_dir);

    let listener = TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        static_dir = %config.static_dir.display(),
        "Server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
