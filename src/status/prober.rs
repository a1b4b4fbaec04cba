use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Default third-party status lookup endpoint.
pub const DEFAULT_STATUS_API: &str = "https://v2.xxapi.cn/api/status";

/// Upper bound on the lookup response body; the service answers with a tiny JSON object.
const MAX_LOOKUP_BODY: usize = 64 * 1024;

/// Reasons the status lookup did not confirm a site as live.
///
/// These never leave the prober; they exist so the fallback can be logged
/// with a precise cause.
#[derive(Debug, Error)]
enum LookupError {
    #[error("invalid lookup endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("lookup returned HTTP {0}")]
    HttpStatus(u16),
    #[error("lookup response too large")]
    TooLarge,
    #[error("malformed lookup response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("lookup reported code {code}, data {data}")]
    Unconfirmed {
        code: serde_json::Value,
        data: serde_json::Value,
    },
}

/// Body shape of the lookup service: `{"code": 200, "data": "301"}`.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    data: serde_json::Value,
}

/// One way of answering "is this site up?".
///
/// Every strategy has the same shape: given a URL it returns `Some(answer)`
/// when it reached a definite verdict, or `None` to defer to the next one.
#[derive(Debug, Clone)]
pub enum ProbeStrategy {
    /// Ask a remote status service. Only ever confirms liveness; every other
    /// outcome defers.
    StatusLookup { endpoint: String, timeout: Duration },
    /// Send a HEAD request to the site itself. Always definite.
    DirectHead { timeout: Duration },
}

impl ProbeStrategy {
    pub async fn attempt(&self, client: &reqwest::Client, url: &str) -> Option<bool> {
        match self {
            ProbeStrategy::StatusLookup { endpoint, timeout } => {
                match lookup(client, endpoint, url, *timeout).await {
                    Ok(()) => Some(true),
                    Err(e) => {
                        tracing::info!(
                            url = %url,
                            reason = %e,
                            "Status lookup did not confirm site, falling back"
                        );
                        None
                    }
                }
            }
            ProbeStrategy::DirectHead { timeout } => Some(direct_head(client, url, *timeout).await),
        }
    }
}

/// Determines whether a URL is reachable by trying strategies in order.
///
/// The default chain is a [`ProbeStrategy::StatusLookup`] (5s) followed by a
/// [`ProbeStrategy::DirectHead`] (10s). If every strategy defers the site
/// counts as offline.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    strategies: Vec<ProbeStrategy>,
}

impl Prober {
    pub fn new(client: reqwest::Client, strategies: Vec<ProbeStrategy>) -> Self {
        Self { client, strategies }
    }

    /// Standard lookup-then-direct chain with endpoint and timeouts from `config`.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            vec![
                ProbeStrategy::StatusLookup {
                    endpoint: config.status_api_url.clone(),
                    timeout: config.lookup_timeout(),
                },
                ProbeStrategy::DirectHead {
                    timeout: config.direct_timeout(),
                },
            ],
        )
    }

    pub fn strategies(&self) -> &[ProbeStrategy] {
        &self.strategies
    }

    /// Returns `true` if the site answered. Never fails: network errors,
    /// timeouts and odd responses all end up as `false`.
    pub async fn probe(&self, url: &str) -> bool {
        for strategy in &self.strategies {
            if let Some(live) = strategy.attempt(&self.client, url).await {
                return live;
            }
        }
        false
    }
}

async fn lookup(
    client: &reqwest::Client,
    endpoint: &str,
    target: &str,
    timeout: Duration,
) -> Result<(), LookupError> {
    let lookup_url = Url::parse_with_params(endpoint, &[("url", target)])?;

    let body = tokio::time::timeout(timeout, async {
        let response = client.get(lookup_url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, MAX_LOOKUP_BODY).await
    })
    .await
    .map_err(|_| LookupError::Timeout)??;

    let parsed: LookupResponse = serde_json::from_slice(&body)?;
    let confirmed = parsed.code.as_f64() == Some(200.0)
        && status_code_of(&parsed.data).is_some_and(|code| (200..400).contains(&code));

    if confirmed {
        Ok(())
    } else {
        Err(LookupError::Unconfirmed {
            code: parsed.code,
            data: parsed.data,
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, LookupError> {
    if response.content_length().is_some_and(|len| len as usize > limit) {
        return Err(LookupError::TooLarge);
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(LookupError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Reads the site's HTTP status out of the lookup `data` field, which the
/// service sends either as a number or as a string such as `"301"`.
fn status_code_of(data: &serde_json::Value) -> Option<i64> {
    match data {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => leading_int(s),
        _ => None,
    }
}

/// Parses the integer prefix of `s` (after leading whitespace), so `"200 OK"`
/// yields 200 and `"abc"` yields nothing.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

async fn direct_head(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, client.head(url).send()).await {
        Ok(Ok(response)) => {
            let status = response.status();
            let live = status.is_success() || status.is_redirection();
            if !live {
                tracing::debug!(url = %url, status = %status, "Direct probe got error status");
            }
            live
        }
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "Direct probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(url = %url, timeout_secs = timeout.as_secs_f32(), "Direct probe timed out");
            false
        }
    }
}
