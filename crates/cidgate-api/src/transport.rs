// Shared transport configuration for building reqwest::Client instances.
//
// The prober and the fetcher share one client (connection pool, user agent,
// redirect policy). Per-request deadlines are applied at call sites, so the
// client itself only carries a connect timeout.

use std::time::Duration;

use reqwest::redirect::Policy;

const USER_AGENT: &str = concat!("cidgate/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP + TLS connect deadline.
    pub connect_timeout: Duration,
    /// Maximum redirects to follow. Subdomain gateways redirect
    /// `/ipfs/{cid}` to `{cid}.ipfs.host`, so this must stay above zero.
    pub max_redirects: usize,
    /// Idle connections kept per gateway host.
    pub pool_max_idle_per_host: usize,
    /// Accept invalid TLS certificates (self-hosted gateways only).
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_redirects: 5,
            pool_max_idle_per_host: 4,
            accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(self.max_redirects))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| crate::error::Error::Client(format!("failed to build HTTP client: {e}")))
    }
}
