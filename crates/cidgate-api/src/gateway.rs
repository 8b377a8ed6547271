// Gateway HTTP client
//
// Wraps `reqwest::Client` with the handful of request shapes the engine
// needs against a gateway: a metadata probe, a small range read, a full
// streaming GET, and the public gateway list download. Every call takes
// its own deadline; nothing here can hang indefinitely.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT_RANGES, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    HeaderMap, RANGE,
};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Response metadata observed by a probe or integrity pre-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Final HTTP status after redirects.
    pub status: u16,
    /// Wall-clock time from request start to response headers.
    pub latency: Duration,
    /// Object size, from `Content-Length` or the total of a `Content-Range`.
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// Gateway advertised `Accept-Ranges: bytes` (or answered a range with 206).
    pub accepts_ranges: bool,
    /// Gateway sent `Access-Control-Allow-Origin`.
    pub cors: bool,
    /// URL that finally answered, after redirects.
    pub final_url: String,
}

/// Result of a small range read used for integrity verification.
#[derive(Debug, Clone)]
pub struct RangeRead {
    pub status: u16,
    /// `true` if the gateway honoured the range (HTTP 206).
    pub partial: bool,
    pub body: Bytes,
}

/// An in-flight full download. Headers have arrived; the body is pulled
/// chunk by chunk via [`next_chunk`](Self::next_chunk).
#[derive(Debug)]
pub struct ObjectStream {
    pub status: u16,
    pub latency: Duration,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub final_url: String,
    response: reqwest::Response,
    timeout_ms: u64,
}

impl ObjectStream {
    /// Pull the next body chunk, `None` at end of body.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        self.response
            .chunk()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout_ms))
    }
}

/// Raw HTTP client for IPFS path and subdomain gateways.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── Metadata ────────────────────────────────────────────────────

    /// Metadata-only request against `url`.
    ///
    /// Issues `HEAD`; gateways that reject it (405/501) are re-asked with a
    /// one-byte ranged `GET` inside the same deadline. Latency is measured
    /// from the first request start to the final response headers.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<ObjectHead, Error> {
        let timeout_ms = millis(timeout);
        let started = Instant::now();

        let resp = self
            .http
            .head(parse_url(url)?)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;

        let status = resp.status();
        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            debug!(url, status = status.as_u16(), "HEAD rejected, retrying as ranged GET");
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::Timeout { timeout_ms });
            }
            let resp = self
                .http
                .get(parse_url(url)?)
                .header(RANGE, "bytes=0-0")
                .timeout(remaining)
                .send()
                .await
                .map_err(|e| Error::from_reqwest(e, timeout_ms))?;
            return into_head(&resp, started.elapsed());
        }

        into_head(&resp, started.elapsed())
    }

    // ── Range verification ──────────────────────────────────────────

    /// Read bytes `start..=end` of the object at `url`.
    ///
    /// Succeeds on 200 as well as 206; callers decide whether a gateway
    /// that ignored the range is acceptable.
    pub async fn read_range(
        &self,
        url: &str,
        start: u64,
        end: u64,
        timeout: Duration,
    ) -> Result<RangeRead, Error> {
        let timeout_ms = millis(timeout);
        let resp = self
            .http
            .get(parse_url(url)?)
            .header(RANGE, format!("bytes={start}-{end}"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;
        trace!(url, len = body.len(), "range read complete");

        Ok(RangeRead {
            status: status.as_u16(),
            partial: status == StatusCode::PARTIAL_CONTENT,
            body,
        })
    }

    // ── Full download ───────────────────────────────────────────────

    /// Start a full `GET`. `timeout` bounds the whole transfer, body included.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<ObjectStream, Error> {
        let timeout_ms = millis(timeout);
        let started = Instant::now();
        let response = self
            .http
            .get(parse_url(url)?)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        Ok(ObjectStream {
            status: status.as_u16(),
            latency: started.elapsed(),
            content_length: header_u64(headers, CONTENT_LENGTH.as_str()),
            content_type: header_string(headers, CONTENT_TYPE.as_str()),
            final_url: response.url().to_string(),
            response,
            timeout_ms,
        })
    }

    // ── Public gateway lists ────────────────────────────────────────

    /// Download a public gateway list: a JSON array of URL templates such as
    /// `"https://ipfs.io/ipfs/:hash"`.
    pub async fn fetch_gateway_list(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, Error> {
        let timeout_ms = millis(timeout);
        let resp = self
            .http
            .get(parse_url(url)?)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout_ms))?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

// ── Header helpers ──────────────────────────────────────────────────

fn into_head(resp: &reqwest::Response, latency: Duration) -> Result<ObjectHead, Error> {
    let status = resp.status();
    if !(status.is_success() || status.is_redirection()) {
        return Err(Error::Http {
            status: status.as_u16(),
        });
    }

    let headers = resp.headers();
    // `Response::content_length` reports the (empty) body of a HEAD, so the
    // header is parsed directly. A ranged GET reports the total in Content-Range.
    let content_length = if status == StatusCode::PARTIAL_CONTENT {
        header_string(headers, CONTENT_RANGE.as_str())
            .as_deref()
            .and_then(content_range_total)
    } else {
        header_u64(headers, CONTENT_LENGTH.as_str())
    };

    let accepts_ranges = status == StatusCode::PARTIAL_CONTENT
        || header_string(headers, ACCEPT_RANGES.as_str())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

    Ok(ObjectHead {
        status: status.as_u16(),
        latency,
        content_length,
        content_type: header_string(headers, CONTENT_TYPE.as_str()),
        accepts_ranges,
        cors: headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN),
        final_url: resp.url().to_string(),
    })
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_string(headers, name).and_then(|v| v.parse().ok())
}

/// Total size from `Content-Range: bytes 0-0/12345`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

/// Reject malformed gateway URLs before any request goes out.
fn parse_url(url: &str) -> Result<Url, Error> {
    Ok(Url::parse(url)?)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_parses_known_size() {
        assert_eq!(content_range_total("bytes 0-0/12345"), Some(12345));
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(matches!(parse_url("not a url"), Err(Error::InvalidUrl(_))));
        assert!(parse_url("https://ipfs.io/ipfs/bafkqaaa").is_ok());
    }

    #[test]
    fn content_range_total_rejects_unknown_size() {
        assert_eq!(content_range_total("bytes 0-0/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }
}
