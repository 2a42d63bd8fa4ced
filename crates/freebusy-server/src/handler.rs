//! Request handling for the busy-interval form.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use freebusy_core::{BusyInterval, FreeBusyQuery};
use freebusy_google::{Authorizer, FreeBusyClient};

use crate::error::ServerResult;
use crate::views::{self, FormView, Outcome};

/// State shared by all requests.
#[derive(Debug, Clone)]
pub struct AppState {
    authorizer: Arc<Authorizer>,
    fetcher: Arc<FreeBusyClient>,
}

impl AppState {
    /// Creates the shared state.
    pub fn new(authorizer: Authorizer, fetcher: FreeBusyClient) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            fetcher: Arc::new(fetcher),
        }
    }

    /// Authorizes and fetches the busy intervals for a query.
    pub async fn lookup(&self, query: &FreeBusyQuery) -> ServerResult<Vec<BusyInterval>> {
        let client = self.authorizer.authorize().await?;
        let busy = self.fetcher.get_busy_intervals(&client, query).await?;
        Ok(busy)
    }
}

/// Submitted form fields. Missing fields arrive as empty strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BusyForm {
    #[serde(rename = "calendarId")]
    pub calendar_id: String,
    pub sdate: String,
    pub edate: String,
}

/// Builds the application router.
///
/// `/` serves the form; everything else falls through to files under
/// `static_dir`.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(views::index(&FormView::idle()).into_string())
}

async fn submit(
    State(state): State<AppState>,
    Form(form): Form<BusyForm>,
) -> (StatusCode, Html<String>) {
    let result = match FreeBusyQuery::from_form(&form.calendar_id, &form.sdate, &form.edate) {
        Ok(query) => state.lookup(&query).await,
        Err(e) => Err(e.into()),
    };

    let view = FormView {
        calendar_id: &form.calendar_id,
        sdate: &form.sdate,
        edate: &form.edate,
        outcome: Outcome::Idle,
    };

    match result {
        Ok(busy) => {
            info!(
                calendar = %form.calendar_id.trim(),
                intervals = busy.len(),
                "Busy intervals fetched"
            );
            let page = views::index(&FormView {
                outcome: Outcome::Busy(&busy),
                ..view
            });
            (StatusCode::OK, Html(page.into_string()))
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!(error = %e, calendar = %form.calendar_id.trim(), "Busy lookup failed");
            } else {
                warn!(error = %e, "Rejected form submission");
            }
            let message = e.user_message();
            let page = views::index(&FormView {
                outcome: Outcome::Error(&message),
                ..view
            });
            (status, Html(page.into_string()))
        }
    }
}
