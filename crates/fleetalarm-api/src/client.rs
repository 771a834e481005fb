// Alarm backend HTTP client
//
// Wraps `reqwest::Client` with URL construction relative to the API base,
// status-code mapping, and envelope unwrapping for the historical and
// mutation endpoints. The event stream lives in `stream.rs` and only
// borrows URL construction from here.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{AlarmAction, HistoryPage, MutationResponse, RawRecord};
use crate::transport::TransportConfig;

/// Maximum number of body bytes carried into an `Error::Api` message.
const ERROR_BODY_LIMIT: usize = 512;

/// Raw HTTP client for the alarm backend.
///
/// Cheap to clone: `reqwest::Client` is reference-counted internally.
#[derive(Debug, Clone)]
pub struct AlarmClient {
    http: reqwest::Client,
    base_url: Url,
    /// Request timeout baked into `http`, when known.
    timeout: Option<Duration>,
}

impl AlarmClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `https://fleet.example.com/api`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: Some(transport.timeout),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: None,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}` regardless of whether the base has a trailing slash.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let full = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Ok(Url::parse(&full)?)
    }

    /// `{base}/alarms/{id}/{action}`, with `id` percent-encoded as a path segment.
    fn mutation_url(&self, id: &str, action: AlarmAction) -> Result<Url, Error> {
        let mut url = self.endpoint("alarms")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(id)
            .push(action.path_segment());
        Ok(url)
    }

    /// URL of the event stream, optionally scoped to a single device.
    ///
    /// `GET /alarms/stream[?deviceId={id}]`
    pub fn stream_url(&self, device_id: Option<&str>) -> Result<Url, Error> {
        let mut url = self.endpoint("alarms/stream")?;
        if let Some(device) = device_id {
            url.query_pairs_mut().append_pair("deviceId", device);
        }
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch one page of historical alarm records.
    ///
    /// `GET /alarms/historical?page={page}&size={size}`
    pub async fn fetch_historical(&self, page: u32, size: u32) -> Result<Vec<RawRecord>, Error> {
        let mut url = self.endpoint("alarms/historical")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());

        debug!(page, size, "fetching historical alarms");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let page: HistoryPage = self.parse_json(resp).await?;
        Ok(page.into_records())
    }

    /// Acknowledge an alarm.
    ///
    /// `POST /alarms/{id}/acknowledge`
    pub async fn acknowledge(&self, id: &str) -> Result<(), Error> {
        self.mutate(id, AlarmAction::Acknowledge).await
    }

    /// Resolve an alarm.
    ///
    /// `POST /alarms/{id}/resolve`
    pub async fn resolve(&self, id: &str) -> Result<(), Error> {
        self.mutate(id, AlarmAction::Resolve).await
    }

    /// Apply a status mutation, mapping `{"success": false}` to [`Error::Rejected`].
    pub async fn mutate(&self, id: &str, action: AlarmAction) -> Result<(), Error> {
        let url = self.mutation_url(id, action)?;
        debug!(id, %action, "POST {}", url);

        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body: MutationResponse = self.parse_json(resp).await?;

        if body.success {
            Ok(())
        } else {
            if let Some(ref message) = body.message {
                debug!(id, %action, message, "backend rejected mutation");
            }
            Err(Error::Rejected {
                action: action.path_segment(),
                id: id.to_owned(),
            })
        }
    }

    // ── Response handling ────────────────────────────────────────────

    /// Check the status, then deserialize the body, keeping it for diagnostics on failure.
    async fn parse_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let resp = check_status(resp).await?;
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Timeouts of the configured request budget become [`Error::Timeout`].
    fn transport_error(&self, err: reqwest::Error) -> Error {
        match self.timeout {
            Some(timeout) if err.is_timeout() => Error::Timeout {
                timeout_secs: timeout.as_secs(),
            },
            _ => Error::Transport(err),
        }
    }
}

// ── Response helpers ─────────────────────────────────────────────────

/// Map non-success statuses to errors, returning the response untouched otherwise.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_owned()
        } else {
            body.chars().take(ERROR_BODY_LIMIT).collect()
        };
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(resp)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> AlarmClient {
        AlarmClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let a = client("https://fleet.example.com/api").endpoint("alarms/stream").unwrap();
        let b = client("https://fleet.example.com/api/").endpoint("alarms/stream").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://fleet.example.com/api/alarms/stream");
    }

    #[test]
    fn mutation_url_encodes_id() {
        let url = client("https://fleet.example.com/api")
            .mutation_url("a/b c", AlarmAction::Resolve)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://fleet.example.com/api/alarms/a%2Fb%20c/resolve"
        );
    }

    #[test]
    fn stream_url_scoped_to_device() {
        let url = client("https://fleet.example.com/api")
            .stream_url(Some("truck-7"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://fleet.example.com/api/alarms/stream?deviceId=truck-7"
        );
    }
}
