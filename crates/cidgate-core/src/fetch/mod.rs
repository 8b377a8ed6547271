// ── Selector / fetcher ──
//
// Given ranked candidates for a CID: pre-check the head of the list in
// parallel, then try candidates strictly one at a time (verify, transfer)
// until one delivers. Every gateway outcome feeds the health store.

mod sink;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use cidgate_api::{GatewayClient, ObjectHead};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub(crate) use sink::Sink;
pub use state::FetchState;

use crate::config::FetchConfig;
use crate::duration_ms;
use crate::error::{CoreError, GatewayFailure};
use crate::gauge::Gauge;
use crate::model::{
    Cid, DownloadMapping, FailureKind, GatewayConfig, ProbeResult, RankedGateway, SampleSource,
};
use crate::store::HealthStore;

/// Summary of a successful smart fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    pub cid: Cid,
    /// Gateway that delivered the content.
    pub gateway: GatewayConfig,
    /// URL that finally answered, after redirects.
    pub url: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// Request start to response headers of the winning transfer.
    pub latency_ms: u64,
    /// Gateways that failed before the winner, in attempt order.
    pub failures: Vec<GatewayFailure>,
    pub transitions: Vec<FetchState>,
}

/// Content fetched into memory.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub report: FetchReport,
    pub bytes: Bytes,
}

/// Content fetched onto disk.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub report: FetchReport,
    pub path: PathBuf,
}

/// A gateway URL that passed the metadata pre-check and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    pub cid: Cid,
    pub gateway: GatewayConfig,
    pub url: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub failures: Vec<GatewayFailure>,
}

/// Why one candidate attempt ended.
enum Abort {
    /// The gateway misbehaved; move on to the next one.
    Gateway(FailureKind),
    /// Stop the whole fetch (cancellation, local I/O).
    Fatal(CoreError),
}

impl Abort {
    fn integrity(message: impl Into<String>) -> Self {
        Self::Gateway(FailureKind::Integrity {
            message: message.into(),
        })
    }
}

impl From<cidgate_api::Error> for Abort {
    fn from(err: cidgate_api::Error) -> Self {
        Self::Gateway(FailureKind::from(err))
    }
}

impl From<CoreError> for Abort {
    fn from(err: CoreError) -> Self {
        Self::Fatal(err)
    }
}

struct Transferred {
    url: String,
    size: u64,
    content_type: Option<String>,
    latency_ms: u64,
}

/// Sequential, verifying, self-healing CID fetcher.
#[derive(Debug)]
pub struct Fetcher {
    client: GatewayClient,
    config: FetchConfig,
    health: Arc<HealthStore>,
    mappings: DashMap<Cid, DownloadMapping>,
    transfers: Arc<Gauge>,
}

impl Fetcher {
    pub fn new(client: GatewayClient, config: FetchConfig, health: Arc<HealthStore>) -> Self {
        Self {
            client,
            config,
            health,
            mappings: DashMap::new(),
            transfers: Arc::new(Gauge::default()),
        }
    }

    /// Highest number of transfers ever streaming at once.
    pub fn peak_concurrent_transfers(&self) -> usize {
        self.transfers.peak()
    }

    /// The live download session for `cid`, if any.
    pub fn mapping(&self, cid: &Cid) -> Option<DownloadMapping> {
        self.mappings.get(cid).map(|m| m.value().clone())
    }

    /// Drop download sessions past their expiry. Returns how many were removed.
    pub fn sweep_expired_mappings(&self) -> usize {
        let now = Utc::now();
        let before = self.mappings.len();
        self.mappings.retain(|_, m| !m.is_expired(now));
        before.saturating_sub(self.mappings.len())
    }

    // ── Entry points ─────────────────────────────────────────────────

    pub async fn fetch(
        &self,
        cid: &Cid,
        filename: Option<String>,
        candidates: Vec<RankedGateway>,
        cancel: &CancellationToken,
    ) -> Result<FetchedContent, CoreError> {
        let mut sink = Sink::memory();
        let report = self.run(cid, filename, candidates, &mut sink, cancel).await?;
        Ok(FetchedContent {
            report,
            bytes: sink.into_bytes(),
        })
    }

    pub async fn fetch_to_file(
        &self,
        cid: &Cid,
        dest: PathBuf,
        candidates: Vec<RankedGateway>,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile, CoreError> {
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let mut sink = Sink::file(&dest).await?;
        match self.run(cid, filename, candidates, &mut sink, cancel).await {
            Ok(report) => {
                let path = sink.finish_file().await?.unwrap_or(dest);
                Ok(FetchedFile { report, path })
            }
            Err(e) => {
                sink.discard().await;
                Err(e)
            }
        }
    }

    /// Pre-check and verify candidates in order without transferring the
    /// body; the first one that passes is returned.
    pub async fn resolve(
        &self,
        cid: &Cid,
        candidates: Vec<RankedGateway>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedUrl, CoreError> {
        let candidates = self.order(cid, None, candidates);
        let mut failures = Vec::new();

        for candidate in candidates {
            let gw = candidate.gateway;
            let url = gw.url_for(cid);
            let head =
                or_cancel(cancel, self.client.head(&url, self.config.metadata_timeout)).await?;
            let verdict = match head {
                Ok(head) => self.verify(&url, &head, cancel).await.map(|()| head),
                Err(e) => Err(Abort::from(e)),
            };
            match verdict {
                Ok(head) => {
                    let result = ProbeResult::success(
                        gw.id.clone(),
                        SampleSource::Probe,
                        duration_ms(head.latency),
                    )
                    .with_status(head.status)
                    .with_capabilities(head.cors, head.accepts_ranges);
                    self.health.upsert(&gw.id, gw.region, &result);
                    return Ok(ResolvedUrl {
                        cid: cid.clone(),
                        url,
                        size: head.content_length,
                        content_type: head.content_type,
                        gateway: gw,
                        failures,
                    });
                }
                Err(Abort::Gateway(reason)) => {
                    self.record_failure(cid, &gw, SampleSource::Probe, &reason);
                    failures.push(failure(&gw, reason));
                }
                Err(Abort::Fatal(e)) => return Err(e),
            }
        }

        Err(CoreError::AllCandidatesExhausted {
            cid: cid.to_string(),
            errors: failures,
        })
    }

    // ── State machine ────────────────────────────────────────────────

    async fn run(
        &self,
        cid: &Cid,
        filename: Option<String>,
        candidates: Vec<RankedGateway>,
        sink: &mut Sink,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, CoreError> {
        let mut transitions = vec![FetchState::Idle];
        enter(&mut transitions, cid, FetchState::Ranking);
        let candidates = self.order(cid, filename, candidates);
        let urls: Vec<String> = candidates.iter().map(|c| c.gateway.url_for(cid)).collect();

        // Pre-check the head of the list concurrently; the rest are
        // checked lazily when their turn comes.
        let eager = self.config.parallel_gateways.max(1).min(urls.len());
        let heads = urls
            .iter()
            .take(eager)
            .map(|url| self.client.head(url, self.config.metadata_timeout));
        let mut prechecks: Vec<Option<Result<ObjectHead, cidgate_api::Error>>> =
            or_cancel(cancel, join_all(heads))
                .await
                .inspect_err(|_| info!(cid = %cid, "fetch cancelled by caller"))?
                .into_iter()
                .map(Some)
                .collect();
        prechecks.resize_with(urls.len(), || None);

        let mut failures = Vec::new();
        for (i, (candidate, url)) in candidates.iter().zip(&urls).enumerate() {
            let gw = &candidate.gateway;
            enter(&mut transitions, cid, FetchState::Trying(i));

            let outcome = self
                .attempt(cid, i, url, prechecks[i].take(), sink, cancel, &mut transitions)
                .await;
            match outcome {
                Ok(done) => {
                    let result = ProbeResult::success(
                        gw.id.clone(),
                        SampleSource::Download,
                        done.latency_ms,
                    );
                    self.health.upsert(&gw.id, gw.region, &result);
                    self.mappings.remove(cid);
                    enter(&mut transitions, cid, FetchState::Success(i));
                    info!(cid = %cid, gateway = %gw.id, size = done.size, "fetch complete");
                    return Ok(FetchReport {
                        cid: cid.clone(),
                        gateway: gw.clone(),
                        url: done.url,
                        size: done.size,
                        content_type: done.content_type,
                        latency_ms: done.latency_ms,
                        failures,
                        transitions,
                    });
                }
                Err(Abort::Gateway(reason)) => {
                    warn!(
                        cid = %cid,
                        gateway = %gw.id,
                        reason = %reason,
                        "candidate failed, falling back"
                    );
                    self.record_failure(cid, gw, SampleSource::Download, &reason);
                    failures.push(failure(gw, reason));
                    sink.reset().await?;
                }
                Err(Abort::Fatal(e)) => {
                    if e.is_cancelled() {
                        info!(cid = %cid, gateway = %gw.id, "fetch cancelled by caller");
                    }
                    return Err(e);
                }
            }
        }

        enter(&mut transitions, cid, FetchState::Exhausted);
        Err(CoreError::AllCandidatesExhausted {
            cid: cid.to_string(),
            errors: failures,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        cid: &Cid,
        index: usize,
        url: &str,
        precheck: Option<Result<ObjectHead, cidgate_api::Error>>,
        sink: &mut Sink,
        cancel: &CancellationToken,
        transitions: &mut Vec<FetchState>,
    ) -> Result<Transferred, Abort> {
        let head = match precheck {
            Some(head) => head?,
            None => {
                or_cancel(cancel, self.client.head(url, self.config.metadata_timeout)).await??
            }
        };
        if let Some(mut mapping) = self.mappings.get_mut(cid) {
            mapping.size = head.content_length.or(mapping.size);
        }

        enter(transitions, cid, FetchState::Verifying(index));
        self.verify(url, &head, cancel).await?;
        self.transfer(url, head.content_length, sink, cancel).await
    }

    /// Integrity pre-check. Metadata must be present; objects under the
    /// size ceiling on range-capable gateways also get a small range read.
    async fn verify(
        &self,
        url: &str,
        head: &ObjectHead,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        if head.content_length.is_none() && head.content_type.is_none() {
            return Err(Abort::integrity("gateway sent no content metadata"));
        }
        let Some(size) = head.content_length else {
            return Ok(());
        };
        if size > self.config.verify_size_ceiling {
            trace!(url, size, "object above verification ceiling, trusting metadata");
            return Ok(());
        }
        if !head.accepts_ranges || size == 0 {
            // The transfer holds the body to the metadata length.
            return Ok(());
        }

        let expected = size.min(self.config.range_probe_bytes.max(1));
        let read = or_cancel(
            cancel,
            self.client
                .read_range(url, 0, expected - 1, self.config.metadata_timeout),
        )
        .await??;
        let got = u64::try_from(read.body.len()).unwrap_or(u64::MAX);
        let ok = if read.partial { got == expected } else { got == size };
        if ok {
            Ok(())
        } else {
            Err(Abort::integrity(format!(
                "range read returned {got} bytes, expected {expected}"
            )))
        }
    }

    /// Stream the body into `sink`. `expected` is the length from the
    /// metadata pre-check; the body must match it exactly.
    async fn transfer(
        &self,
        url: &str,
        expected: Option<u64>,
        sink: &mut Sink,
        cancel: &CancellationToken,
    ) -> Result<Transferred, Abort> {
        let _active = self.transfers.enter();
        let mut stream =
            or_cancel(cancel, self.client.get(url, self.config.download_timeout)).await??;

        let expected = expected.filter(|n| *n > 0);
        let advertised = stream.content_length.filter(|n| *n > 0);
        if let (Some(advertised), Some(expected)) = (advertised, expected) {
            if advertised != expected {
                return Err(Abort::integrity(format!(
                    "gateway advertised {advertised} bytes, metadata said {expected}"
                )));
            }
        }

        let mut received: u64 = 0;
        while let Some(chunk) = or_cancel(cancel, stream.next_chunk()).await?? {
            sink.write(&chunk).await?;
            received = received.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }

        if let Some(want) = expected.or(advertised) {
            if want != received {
                return Err(Abort::integrity(format!(
                    "received {received} bytes, expected {want}"
                )));
            }
        }

        Ok(Transferred {
            url: stream.final_url.clone(),
            size: received,
            content_type: stream.content_type.clone(),
            latency_ms: duration_ms(stream.latency),
        })
    }

    // ── Bookkeeping ──────────────────────────────────────────────────

    /// Open (or reuse) the download session for `cid` and push gateways
    /// that already failed it to the back of the list.
    fn order(
        &self,
        cid: &Cid,
        filename: Option<String>,
        candidates: Vec<RankedGateway>,
    ) -> Vec<RankedGateway> {
        let now = Utc::now();
        let mut mapping = self.mappings.entry(cid.clone()).or_insert_with(|| {
            DownloadMapping::new(cid.clone(), filename.clone(), now, self.config.mapping_ttl)
        });
        if mapping.is_expired(now) {
            *mapping =
                DownloadMapping::new(cid.clone(), filename.clone(), now, self.config.mapping_ttl);
        }
        if filename.is_some() {
            mapping.filename = filename;
        }

        let (fresh, failed): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !mapping.has_failed(&c.gateway.id));
        if !failed.is_empty() {
            debug!(
                cid = %cid,
                demoted = failed.len(),
                "demoting gateways that already failed this CID"
            );
        }
        fresh.into_iter().chain(failed).collect()
    }

    fn record_failure(
        &self,
        cid: &Cid,
        gw: &GatewayConfig,
        source: SampleSource,
        reason: &FailureKind,
    ) {
        let result = ProbeResult::failure(gw.id.clone(), source, reason.clone());
        self.health.upsert(&gw.id, gw.region, &result);

        if let Some(mut mapping) = self.mappings.get_mut(cid) {
            mapping.tried.push(gw.id.clone());
            if !mapping.failed.contains(&gw.id) {
                mapping.failed.push(gw.id.clone());
            }
        }
    }
}

fn enter(transitions: &mut Vec<FetchState>, cid: &Cid, next: FetchState) {
    let from = transitions.last().copied().unwrap_or(FetchState::Idle);
    debug!(cid = %cid, from = %from, to = %next, "fetch state");
    transitions.push(next);
}

fn failure(gw: &GatewayConfig, reason: FailureKind) -> GatewayFailure {
    GatewayFailure {
        gateway_id: gw.id.clone(),
        gateway_name: gw.name.clone(),
        reason,
    }
}

/// Race `fut` against the caller's cancellation.
async fn or_cancel<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, CoreError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CoreError::Cancelled),
        out = fut => Ok(out),
    }
}
