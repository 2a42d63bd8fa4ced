//! Google Calendar free/busy client.
//!
//! Issues `POST {api_base}/freeBusy` for exactly one calendar and extracts
//! that calendar's busy intervals from the response.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use freebusy_core::{BusyInterval, FreeBusyQuery};

use crate::authorizer::AuthorizedClient;
use crate::config::{GoogleConfig, GoogleEndpoints};
use crate::error::{GoogleError, GoogleResult};

/// Message returned when the requested calendar is missing from the response.
pub const INVALID_CALENDAR_MESSAGE: &str = "Invalid calendar ID or no busy intervals found";

/// Time zone sent with every query.
const QUERY_TIME_ZONE: &str = "UTC";

/// Client for the free/busy endpoint.
#[derive(Debug, Clone)]
pub struct FreeBusyClient {
    http_client: reqwest::Client,
    endpoints: GoogleEndpoints,
}

impl FreeBusyClient {
    /// Creates a client; every request is bounded by `config.timeout`.
    pub fn new(config: &GoogleConfig) -> GoogleResult<Self> {
        Ok(Self {
            http_client: config.http_client()?,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Returns the busy intervals of `query.calendar_id` within `query.window`.
    ///
    /// Intervals are returned in upstream order. A calendar that is absent
    /// from the response, or present with errors, is a
    /// [`crate::GoogleErrorCode::CalendarError`]; a calendar present with an
    /// empty busy list is success with no intervals.
    pub async fn get_busy_intervals(
        &self,
        client: &AuthorizedClient,
        query: &FreeBusyQuery,
    ) -> GoogleResult<Vec<BusyInterval>> {
        let access_token = client.access_token().await?;
        let response = self.query(&access_token, query).await?;
        let intervals = extract_busy(response, &query.calendar_id)?;
        debug!(
            "calendar {} has {} busy intervals",
            query.calendar_id,
            intervals.len()
        );
        Ok(intervals)
    }

    async fn query(
        &self,
        access_token: &str,
        query: &FreeBusyQuery,
    ) -> GoogleResult<FreeBusyResponse> {
        let body = FreeBusyRequest {
            time_min: query.window.start_rfc3339(),
            time_max: query.window.end_rfc3339(),
            time_zone: QUERY_TIME_ZONE,
            items: vec![FreeBusyRequestItem {
                id: &query.calendar_id,
            }],
        };

        debug!(
            "querying free/busy for {} from {} to {}",
            query.calendar_id, body.time_min, body.time_max
        );

        let response = self
            .http_client
            .post(self.endpoints.freebusy_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GoogleError::network("request timeout")
                } else if e.is_connect() {
                    GoogleError::network(format!("connection failed: {}", e))
                } else {
                    GoogleError::network(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(GoogleError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {} seconds", s))
                    .unwrap_or_default()
            )));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GoogleError::authentication(
                "access token expired or invalid",
            ));
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(GoogleError::authorization("access denied to calendar"));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("API error ({}): {}", status, body);
            return Err(match status {
                reqwest::StatusCode::NOT_FOUND => GoogleError::not_found(message),
                reqwest::StatusCode::BAD_REQUEST => GoogleError::bad_request(message),
                _ => GoogleError::server(message),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            GoogleError::invalid_response(format!("failed to parse response: {}", e))
        })
    }
}

/// Picks the requested calendar out of a free/busy response.
fn extract_busy(
    mut response: FreeBusyResponse,
    calendar_id: &str,
) -> GoogleResult<Vec<BusyInterval>> {
    let calendar = response
        .calendars
        .remove(calendar_id)
        .ok_or_else(|| GoogleError::calendar(INVALID_CALENDAR_MESSAGE))?;

    if let Some(first) = calendar.errors.first() {
        debug!(
            "calendar {} returned error: {}/{}",
            calendar_id,
            first.domain.as_deref().unwrap_or("unknown"),
            first.reason.as_deref().unwrap_or("unknown")
        );
        return Err(GoogleError::calendar(INVALID_CALENDAR_MESSAGE));
    }

    Ok(calendar.busy)
}

/// Request body for the freeBusy endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    time_zone: &'a str,
    items: Vec<FreeBusyRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyRequestItem<'a> {
    id: &'a str,
}

/// Response from the freeBusy endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

/// Per-calendar section of the response.
#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    domain: Option<String>,
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GoogleErrorCode;
    use crate::config::OAuthCredentials;
    use crate::oauth::OAuthClient;
    use crate::store::TokenInfo;
    use chrono::{TimeZone, Utc};
    use freebusy_core::TimeWindow;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(json: serde_json::Value) -> FreeBusyResponse {
        serde_json::from_value(json).unwrap()
    }

    fn team_query() -> FreeBusyQuery {
        FreeBusyQuery::new(
            "team@example.com",
            TimeWindow::parse("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z").unwrap(),
        )
    }

    fn setup(server: &MockServer, tokens: TokenInfo) -> (FreeBusyClient, AuthorizedClient) {
        let config = GoogleConfig::default()
            .with_endpoints(crate::GoogleEndpoints::with_base(&server.uri()));
        let fetcher = FreeBusyClient::new(&config).unwrap();
        let oauth = OAuthClient::new(
            OAuthCredentials::new("id", "secret"),
            reqwest::Client::new(),
            config.endpoints.clone(),
        );
        (fetcher, AuthorizedClient::new(oauth, tokens))
    }

    fn live_tokens() -> TokenInfo {
        TokenInfo::new("access-1", Some("refresh-1".to_string()), Some(3600))
    }

    #[test]
    fn extract_present_calendar() {
        let response = parse(json!({
            "kind": "calendar#freeBusy",
            "calendars": {
                "team@example.com": {
                    "busy": [
                        {"start": "2024-01-01T09:00:00Z", "end": "2024-01-01T10:00:00Z"},
                        {"start": "2024-01-01T08:00:00Z", "end": "2024-01-01T08:30:00Z"}
                    ]
                }
            }
        }));

        let busy = extract_busy(response, "team@example.com").unwrap();
        assert_eq!(busy.len(), 2);
        // upstream order, not sorted
        assert_eq!(busy[0].start, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
        assert_eq!(busy[1].start, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn extract_empty_busy_is_success() {
        let response = parse(json!({"calendars": {"team@example.com": {"busy": []}}}));
        assert!(extract_busy(response, "team@example.com").unwrap().is_empty());

        let response = parse(json!({"calendars": {"team@example.com": {}}}));
        assert!(extract_busy(response, "team@example.com").unwrap().is_empty());
    }

    #[test]
    fn extract_absent_calendar_is_lookup_error() {
        let response = parse(json!({"calendars": {}}));
        let err = extract_busy(response, "team@example.com").unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::CalendarError);
        assert_eq!(err.message(), INVALID_CALENDAR_MESSAGE);

        let response = parse(json!({
            "calendars": {"other@example.com": {"busy": []}}
        }));
        let err = extract_busy(response, "team@example.com").unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::CalendarError);

        let response = parse(json!({}));
        assert!(extract_busy(response, "team@example.com").is_err());
    }

    #[test]
    fn extract_calendar_with_errors_is_lookup_error() {
        let response = parse(json!({
            "calendars": {
                "nobody@example.com": {
                    "errors": [{"domain": "global", "reason": "notFound"}],
                    "busy": []
                }
            }
        }));
        let err = extract_busy(response, "nobody@example.com").unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::CalendarError);
    }

    #[test]
    fn request_body_shape() {
        let query = team_query();
        let body = FreeBusyRequest {
            time_min: query.window.start_rfc3339(),
            time_max: query.window.end_rfc3339(),
            time_zone: QUERY_TIME_ZONE,
            items: vec![FreeBusyRequestItem {
                id: &query.calendar_id,
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "timeMin": "2024-01-01T00:00:00Z",
                "timeMax": "2024-01-02T00:00:00Z",
                "timeZone": "UTC",
                "items": [{"id": "team@example.com"}]
            })
        );
    }

    #[tokio::test]
    async fn fetch_with_live_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .and(header("authorization", "Bearer access-1"))
            .and(body_partial_json(json!({
                "timeZone": "UTC",
                "items": [{"id": "team@example.com"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "calendars": {
                    "team@example.com": {
                        "busy": [{"start": "2024-01-01T09:00:00Z", "end": "2024-01-01T10:00:00Z"}]
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, client) = setup(&server, live_tokens());
        let busy = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].end, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn fetch_mints_access_token_from_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "minted",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .and(header("authorization", "Bearer minted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "calendars": {"team@example.com": {"busy": []}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, client) = setup(&server, TokenInfo::from_refresh_token("refresh-1"));
        let busy = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap();
        assert!(busy.is_empty());
    }

    #[tokio::test]
    async fn fetch_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (fetcher, client) = setup(&server, live_tokens());
        let err = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn fetch_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let (fetcher, client) = setup(&server, live_tokens());
        let err = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::RateLimited);
        assert!(err.message().contains("30 seconds"));
    }

    #[tokio::test]
    async fn fetch_maps_server_error_and_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let (fetcher, client) = setup(&server, live_tokens());
        let err = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::ServerError);
        assert!(err.message().contains("backend unavailable"));

        let err = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::InvalidResponse);
    }

    #[tokio::test]
    async fn fetch_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/freeBusy"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = GoogleConfig::default()
            .with_endpoints(crate::GoogleEndpoints::with_base(&server.uri()))
            .with_timeout(std::time::Duration::from_millis(200));
        let fetcher = FreeBusyClient::new(&config).unwrap();
        let oauth = OAuthClient::new(
            OAuthCredentials::new("id", "secret"),
            reqwest::Client::new(),
            config.endpoints.clone(),
        );
        let client = AuthorizedClient::new(oauth, live_tokens());

        let err = fetcher.get_busy_intervals(&client, &team_query()).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::NetworkError);
    }
}
