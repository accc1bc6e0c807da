//! HTTP access for registry documents and published tarballs.
//!
//! Provides a trait-based abstraction over HTTP GET so the resolver and the
//! comparator can be exercised without network access, plus a `ureq`-backed
//! production client.

use crate::cancel::{CancellationToken, Cancelled};
use log::debug;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::sync::OnceLock;

/// Trait for fetching resources over HTTP.
///
/// # Examples
///
/// ```no_run
/// use provenance_verifier::cancel::CancellationToken;
/// use provenance_verifier::http::{HttpClient, UreqHttpClient};
///
/// let client = UreqHttpClient;
/// let body = client.get("https://registry.npmjs.org/left-pad", &CancellationToken::new())?;
/// assert!(!body.is_empty());
/// # Ok::<(), provenance_verifier::http::HttpError>(())
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient {
    /// Fetch `url` and return the response body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::NotFound`] for 404 responses,
    /// [`HttpError::Cancelled`] when `cancel` has fired, and
    /// [`HttpError::Request`] for every other failure.
    fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, HttpError>;
}

/// Errors arising from HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request failed or returned an error status.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The resource does not exist (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The request was not sent or was abandoned because of cancellation.
    #[error("request to {url} interrupted: {reason}")]
    Cancelled {
        /// The URL that was requested.
        url: String,
        /// Why the token fired.
        reason: Cancelled,
    },

    /// The body could not be decoded as the expected JSON document.
    #[error("invalid JSON from {url}: {reason}")]
    Decode {
        /// The URL that was requested.
        url: String,
        /// The decoder's error message.
        reason: String,
    },
}

/// HTTP client backed by `ureq`.
///
/// Requests share one agent. When the caller's token carries a deadline, a
/// dedicated agent is configured with the remaining time as its global
/// timeout so an in-flight transfer cannot outlive the deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqHttpClient;

impl HttpClient for UreqHttpClient {
    fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, HttpError> {
        cancel.check().map_err(|reason| HttpError::Cancelled {
            url: url.to_owned(),
            reason,
        })?;
        debug!("GET {url}");

        let bounded;
        let agent = match cancel.remaining() {
            Some(left) => {
                let config = ureq::Agent::config_builder()
                    .timeout_global(Some(left))
                    .build();
                bounded = ureq::Agent::new_with_config(config);
                &bounded
            }
            None => shared_agent(),
        };

        let response = agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e, cancel))?;
        let mut body = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|e| HttpError::Request {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(body)
    }
}

/// Fetch `url` and decode the body as JSON.
///
/// # Errors
///
/// Propagates transport errors from `client` and returns
/// [`HttpError::Decode`] when the body is not valid JSON for `T`.
pub fn fetch_json<T: DeserializeOwned>(
    client: &dyn HttpClient,
    url: &str,
    cancel: &CancellationToken,
) -> Result<T, HttpError> {
    let body = client.get(url, cancel)?;
    serde_json::from_slice(&body).map_err(|e| HttpError::Decode {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Shared `ureq` agent for requests without a deadline.
fn shared_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(ureq::Agent::new_with_defaults)
}

/// Map a ureq error to an [`HttpError`].
fn map_ureq_error(url: &str, err: &ureq::Error, cancel: &CancellationToken) -> HttpError {
    if let (ureq::Error::Timeout(_), Err(reason)) = (err, cancel.check()) {
        return HttpError::Cancelled {
            url: url.to_owned(),
            reason,
        };
    }
    match err {
        ureq::Error::StatusCode(404) => HttpError::NotFound {
            url: url.to_owned(),
        },
        other => HttpError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
