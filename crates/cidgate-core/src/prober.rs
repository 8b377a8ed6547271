// ── Prober ──
//
// Availability checks against every gateway in a sweep, at most
// `concurrency` in flight. The prober only produces `ProbeResult`s; the
// engine decides what gets merged into the health store.

use std::sync::Arc;

use cidgate_api::GatewayClient;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::duration_ms;
use crate::error::CoreError;
use crate::gauge::Gauge;
use crate::model::{Cid, FailureKind, GatewayConfig, ProbeResult, SampleSource};

/// Results of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// One result per gateway that finished, in completion order.
    pub results: Vec<ProbeResult>,
    /// Gateways the sweep was asked to probe.
    pub requested: usize,
    /// The sweep was cancelled before every probe finished.
    pub cancelled: bool,
}

/// Bounded-concurrency gateway prober.
#[derive(Debug, Clone)]
pub struct Prober {
    client: GatewayClient,
    config: ProbeConfig,
    test_cid: Cid,
    in_flight: Arc<Gauge>,
}

impl Prober {
    pub fn new(client: GatewayClient, config: ProbeConfig) -> Result<Self, CoreError> {
        let test_cid = Cid::parse(&config.test_cid)?;
        Ok(Self {
            client,
            config,
            test_cid,
            in_flight: Arc::new(Gauge::default()),
        })
    }

    /// Highest number of probes ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }

    /// Probe one gateway, retrying failures up to the configured count.
    pub async fn probe(&self, gateway: &GatewayConfig) -> ProbeResult {
        let url = gateway.url_for(&self.test_cid);
        let timeout_ms = duration_ms(self.config.timeout);
        let mut attempt = 0;

        loop {
            match self.client.head(&url, self.config.timeout).await {
                Ok(head) => {
                    debug!(
                        gateway = %gateway.id,
                        latency_ms = duration_ms(head.latency),
                        status = head.status,
                        "probe succeeded"
                    );
                    return ProbeResult::success(
                        gateway.id.clone(),
                        SampleSource::Probe,
                        duration_ms(head.latency),
                    )
                    .with_status(head.status)
                    .with_capabilities(head.cors, head.accepts_ranges);
                }
                Err(e) => {
                    if e.is_timeout() {
                        debug!(gateway = %gateway.id, timeout_ms, attempt, "probe timed out");
                    } else {
                        debug!(gateway = %gateway.id, error = %e, attempt, "probe failed");
                    }
                    if attempt >= self.config.retries {
                        return ProbeResult::failure(
                            gateway.id.clone(),
                            SampleSource::Probe,
                            FailureKind::from(e),
                        );
                    }
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Probe every gateway. On cancellation the in-flight probes are
    /// aborted and whatever already finished is returned.
    pub async fn sweep(
        &self,
        gateways: &[GatewayConfig],
        cancel: &CancellationToken,
    ) -> SweepOutcome {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();

        for gateway in gateways.iter().cloned() {
            let prober = self.clone();
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                let _slot = prober.in_flight.enter();
                Some(prober.probe(&gateway).await)
            });
        }

        let mut outcome = SweepOutcome {
            results: Vec::with_capacity(gateways.len()),
            requested: gateways.len(),
            cancelled: false,
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    set.abort_all();
                    break;
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok(Some(result))) => outcome.results.push(result),
                    Some(Ok(None)) => {}
                    Some(Err(e)) => warn!(error = %e, "probe task failed"),
                },
            }
        }

        if outcome.cancelled {
            // Aborted tasks resolve immediately; probes that finished in
            // the meantime are kept.
            while let Some(joined) = set.join_next().await {
                if let Ok(Some(result)) = joined {
                    outcome.results.push(result);
                }
            }
            info!(
                completed = outcome.results.len(),
                requested = outcome.requested,
                "sweep cancelled by caller"
            );
        }

        outcome
    }
}
