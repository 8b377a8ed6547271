#![allow(clippy::unwrap_used)]
// Integration tests for `Engine` against wiremock gateways.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cidgate_core::{
    CoreError, CustomGateway, Engine, EngineConfig, FailureKind, FetchState, GatewayConfig,
    GatewayId, GatewayOrigin, GatewayStatus, Region,
};

// ── Helpers ─────────────────────────────────────────────────────────

const CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";
const PROBE_PATH: &str = "/ipfs/bafkqaaa";
const SLOW: Duration = Duration::from_secs(3);

fn object_path() -> String {
    format!("/ipfs/{CID}")
}

fn config(state_dir: Option<PathBuf>) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.probe.timeout = Duration::from_millis(400);
    cfg.probe.retries = 0;
    cfg.probe.retry_delay = Duration::from_millis(10);
    cfg.fetch.metadata_timeout = Duration::from_millis(800);
    cfg.fetch.download_timeout = Duration::from_millis(800);
    cfg.cleanup.interval = Duration::ZERO;
    // Keep localhost latency out of the ordering.
    cfg.scoring.latency_penalty_per_second = 0;
    cfg.public_lists = Vec::new();
    cfg.state_dir = state_dir;
    cfg
}

fn gateway(server: &MockServer, priority: u32) -> GatewayConfig {
    GatewayConfig::new(
        format!("gw{priority}"),
        &format!("{}/ipfs/{{cid}}", server.uri()),
        priority,
        Region::Intl,
        GatewayOrigin::BuiltIn,
    )
    .unwrap()
}

async fn servers(n: usize) -> Vec<MockServer> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(MockServer::start().await);
    }
    out
}

async fn healthy_probe(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path(PROBE_PATH))
        .respond_with(
            ResponseTemplate::new(200).insert_header("content-type", "application/vnd.ipld.raw"),
        )
        .mount(server)
        .await;
}

async fn slow_probe(server: &MockServer) {
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(SLOW))
        .mount(server)
        .await;
}

async fn object_head(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .insert_header("content-length", "11"),
        )
        .mount(server)
        .await;
}

async fn object_body(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(server)
        .await;
}

fn id(server: &MockServer) -> GatewayId {
    gateway(server, 0).id
}

// ── Sweeps ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_ranks_successes_above_timeouts() {
    let gws = servers(5).await;
    // Gateways 0, 2, 4 time out; 1 and 3 answer.
    for (i, server) in gws.iter().enumerate() {
        if i % 2 == 0 {
            slow_probe(server).await;
        } else {
            healthy_probe(server).await;
        }
    }

    let mut cfg = config(None);
    cfg.probe.concurrency = 2;
    let gateways = gws.iter().zip(1..).map(|(s, p)| gateway(s, p)).collect();
    let engine = Engine::with_gateways(cfg, gateways).unwrap();

    let report = engine.refresh_sweep(true).await.unwrap();

    assert!(!report.from_cache);
    assert!(!report.cancelled);
    assert_eq!(report.ranked.len(), 5);
    assert_eq!(report.probed, 5);
    assert_eq!(report.succeeded, 2);
    assert!(engine.peak_concurrent_probes() <= 2);

    let top: Vec<_> = report.ranked[..2].iter().map(|r| r.gateway.id.clone()).collect();
    assert_eq!(top, vec![id(&gws[1]), id(&gws[3])]);
    assert!(report.ranked[..2].iter().all(|r| r.status == GatewayStatus::Available));
    assert!(report.ranked[2..].iter().all(|r| r.status == GatewayStatus::Degraded));

    let timed_out = engine.health_record(&id(&gws[0])).unwrap();
    assert_eq!(timed_out.consecutive_failures, 1);
    assert!(timed_out.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_cancel_sweep_keeps_finished_probes() {
    let gws = servers(5).await;
    healthy_probe(&gws[0]).await;
    healthy_probe(&gws[1]).await;
    for server in &gws[2..] {
        slow_probe(server).await;
    }

    let mut cfg = config(None);
    cfg.probe.concurrency = 2;
    cfg.probe.timeout = Duration::from_secs(10);
    let gateways = gws.iter().zip(1..).map(|(s, p)| gateway(s, p)).collect();
    let engine = Engine::with_gateways(cfg, gateways).unwrap();

    let sweeping = engine.clone();
    let task = tokio::spawn(async move { sweeping.refresh_sweep(true).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(engine.cancel_sweep().await);

    let report = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("cancelled sweep must return promptly")
        .unwrap()
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.ranked.len(), 5);
    assert_eq!(report.probed, 2);
    assert_eq!(report.ranked[0].status, GatewayStatus::Available);
    assert_eq!(report.ranked[1].status, GatewayStatus::Available);
    assert!(engine.health_record(&id(&gws[2])).is_none());
    assert!(engine.cached_sweep().is_none(), "cancelled sweeps are never cached");
    assert!(!engine.cancel_sweep().await);
}

#[tokio::test]
async fn test_cancel_reaches_sweep_queued_behind_another() {
    let gws = servers(2).await;
    for server in &gws {
        slow_probe(server).await;
    }

    let mut cfg = config(None);
    cfg.probe.timeout = Duration::from_secs(10);
    let gateways = gws.iter().zip(1..).map(|(s, p)| gateway(s, p)).collect();
    let engine = Engine::with_gateways(cfg, gateways).unwrap();

    let first = engine.clone();
    let running = tokio::spawn(async move { first.refresh_sweep(true).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = engine.clone();
    let queued = tokio::spawn(async move { second.refresh_sweep(true).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(engine.cancel_sweep().await);

    let (running, queued) = tokio::time::timeout(Duration::from_secs(2), async {
        (running.await.unwrap().unwrap(), queued.await.unwrap().unwrap())
    })
    .await
    .expect("both sweeps must stop promptly");

    assert!(running.cancelled);
    assert!(queued.cancelled);
    assert_eq!(queued.probed, 0);
    assert_eq!(queued.requested, 2);
    // Only the running sweep reached the gateways.
    for server in &gws {
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
    assert!(!engine.cancel_sweep().await);
}

#[tokio::test]
async fn test_failed_check_is_retried_after_delay() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    healthy_probe(&server).await;

    let mut cfg = config(None);
    cfg.probe.retries = 1;
    cfg.probe.retry_delay = Duration::from_millis(200);
    let engine = Engine::with_gateways(cfg, vec![gateway(&server, 1)]).unwrap();

    let started = std::time::Instant::now();
    let report = engine.refresh_sweep(true).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(report.succeeded, 1);
    let record = engine.health_record(&id(&server)).unwrap();
    assert_eq!(record.success_count, 1);
    assert_eq!(record.failure_count, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_retries_exhausted_record_one_failure() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let mut cfg = config(None);
    cfg.probe.retries = 2;
    cfg.probe.retry_delay = Duration::from_millis(20);
    let engine = Engine::with_gateways(cfg, vec![gateway(&server, 1)]).unwrap();

    let report = engine.refresh_sweep(true).await.unwrap();

    assert_eq!(report.succeeded, 0);
    let record = engine.health_record(&id(&server)).unwrap();
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.success_count, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_fresh_sweep_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::with_gateways(config(None), vec![gateway(&server, 1)]).unwrap();

    let first = engine.refresh_sweep(false).await.unwrap();
    let second = engine.refresh_sweep(false).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.ranked, second.ranked);
}

// ── Smart fetch ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_smart_fetch_falls_back_after_transfer_failure() {
    let gws = servers(3).await;
    let (a, b, c) = (&gws[0], &gws[1], &gws[2]);

    // A and B probe fine; C is down.
    for server in [a, b] {
        healthy_probe(server).await;
        object_head(server).await;
    }
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(502))
        .mount(c)
        .await;

    // A's headers arrive for the pre-check, but the transfer stalls.
    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world").set_delay(SLOW))
        .mount(a)
        .await;
    object_body(b).await;

    let gateways = vec![gateway(a, 1), gateway(b, 2), gateway(c, 3)];
    let engine = Engine::with_gateways(config(None), gateways).unwrap();

    // Three sweeps push C past the unavailable threshold.
    for _ in 0..3 {
        engine.refresh_sweep(true).await.unwrap();
    }
    let ranked = engine.ranked();
    let statuses: Vec<_> = ranked.iter().map(|r| (r.gateway.id.clone(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (id(a), GatewayStatus::Available),
            (id(b), GatewayStatus::Available),
            (id(c), GatewayStatus::Unavailable),
        ]
    );

    let a_before = engine.health_record(&id(a)).unwrap();
    let b_before = engine.health_record(&id(b)).unwrap();

    let fetched = assert_ok!(engine.smart_fetch(CID, Some("hello.txt".into())).await);

    assert_eq!(&fetched.bytes[..], b"hello world");
    assert_eq!(fetched.report.gateway.id, id(b));
    assert_eq!(fetched.report.failures.len(), 1);
    assert_eq!(fetched.report.failures[0].gateway_id, id(a));
    assert!(matches!(fetched.report.failures[0].reason, FailureKind::Timeout { .. }));
    assert_eq!(
        fetched.report.transitions,
        vec![
            FetchState::Idle,
            FetchState::Ranking,
            FetchState::Trying(0),
            FetchState::Verifying(0),
            FetchState::Trying(1),
            FetchState::Verifying(1),
            FetchState::Success(1),
        ]
    );

    let a_after = engine.health_record(&id(a)).unwrap();
    let b_after = engine.health_record(&id(b)).unwrap();
    assert_eq!(a_after.failure_count, a_before.failure_count + 1);
    assert_eq!(a_after.success_count, a_before.success_count);
    assert_eq!(b_after.success_count, b_before.success_count + 1);
    assert_eq!(b_after.failure_count, b_before.failure_count);

    assert_eq!(engine.peak_concurrent_transfers(), 1);
}

#[tokio::test]
async fn test_range_verification_mismatch_is_a_gateway_failure() {
    let gws = servers(2).await;
    let (a, b) = (&gws[0], &gws[1]);

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .insert_header("content-length", "4096")
                .insert_header("accept-ranges", "bytes"),
        )
        .mount(a)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path()))
        .and(header("range", "bytes=0-1023"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-9/4096")
                .set_body_bytes(vec![0u8; 10]),
        )
        .mount(a)
        .await;

    object_head(b).await;
    object_body(b).await;

    let engine = Engine::with_gateways(config(None), vec![gateway(a, 1), gateway(b, 2)]).unwrap();
    let fetched = assert_ok!(engine.smart_fetch(CID, None).await);

    assert_eq!(fetched.report.gateway.id, id(b));
    assert!(matches!(
        fetched.report.failures[0].reason,
        FailureKind::Integrity { .. }
    ));
    assert_eq!(engine.health_record(&id(a)).unwrap().failure_count, 1);
}

/// Any ranged GET against `server` answers garbage; tests assert it is never hit.
async fn forbid_range_reads(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(object_path()))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8; 3]))
        .expect(0)
        .mount(server)
        .await;
}

async fn range_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.headers.contains_key("range"))
        .count()
}

#[tokio::test]
async fn test_short_body_is_rejected_when_ranges_are_unsupported() {
    let gws = servers(2).await;
    let (a, b) = (&gws[0], &gws[1]);

    // A claims 4096 bytes without range support, then serves 10.
    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .insert_header("content-length", "4096"),
        )
        .mount(a)
        .await;
    forbid_range_reads(a).await;
    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 10]))
        .mount(a)
        .await;

    object_head(b).await;
    object_body(b).await;

    let engine = Engine::with_gateways(config(None), vec![gateway(a, 1), gateway(b, 2)]).unwrap();
    let fetched = assert_ok!(engine.smart_fetch(CID, None).await);

    assert_eq!(&fetched.bytes[..], b"hello world");
    assert_eq!(fetched.report.gateway.id, id(b));
    assert_eq!(fetched.report.size, 11);
    assert_eq!(fetched.report.failures.len(), 1);
    assert_eq!(fetched.report.failures[0].gateway_id, id(a));
    assert!(matches!(
        fetched.report.failures[0].reason,
        FailureKind::Integrity { .. }
    ));
    assert_eq!(engine.health_record(&id(a)).unwrap().failure_count, 1);
    assert_eq!(range_requests(a).await, 0);
}

#[tokio::test]
async fn test_short_body_to_file_leaves_no_partial_download() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .insert_header("content-length", "4096"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 10]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("object.bin");
    let engine = Engine::with_gateways(config(None), vec![gateway(&server, 1)]).unwrap();

    let err = assert_err!(engine.smart_fetch_to_file(CID, &dest).await);
    match err {
        CoreError::AllCandidatesExhausted { errors, .. } => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0].reason, FailureKind::Integrity { .. }));
        }
        other => panic!("expected AllCandidatesExhausted, got {other:?}"),
    }
    assert!(!dest.exists());
    assert!(!dir.path().join("object.bin.part").exists());
}

#[tokio::test]
async fn test_objects_above_verify_ceiling_skip_range_read() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .insert_header("content-length", "11")
                .insert_header("accept-ranges", "bytes"),
        )
        .mount(&server)
        .await;
    forbid_range_reads(&server).await;
    object_body(&server).await;

    let mut cfg = config(None);
    cfg.fetch.verify_size_ceiling = 4;
    let engine = Engine::with_gateways(cfg, vec![gateway(&server, 1)]).unwrap();

    let fetched = assert_ok!(engine.smart_fetch(CID, None).await);

    assert_eq!(&fetched.bytes[..], b"hello world");
    assert_eq!(fetched.report.size, 11);
    assert!(fetched.report.failures.is_empty());
    assert_eq!(range_requests(&server).await, 0);
}

#[tokio::test]
async fn test_objects_under_verify_ceiling_get_range_read() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .insert_header("content-length", "11")
                .insert_header("accept-ranges", "bytes"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path()))
        .and(header("range", "bytes=0-10"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-10/11")
                .set_body_string("hello world"),
        )
        .expect(1)
        .mount(&server)
        .await;
    object_body(&server).await;

    let engine = Engine::with_gateways(config(None), vec![gateway(&server, 1)]).unwrap();
    let fetched = assert_ok!(engine.smart_fetch(CID, None).await);

    assert_eq!(fetched.report.size, 11);
    assert_eq!(range_requests(&server).await, 1);
}

#[tokio::test]
async fn test_smart_fetch_exhausted_reports_every_gateway() {
    let gws = servers(3).await;
    for server in &gws {
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    let gateways = gws.iter().zip(1..).map(|(s, p)| gateway(s, p)).collect();
    let mut cfg = config(None);
    cfg.fetch.parallel_gateways = 2;
    let engine = Engine::with_gateways(cfg, gateways).unwrap();

    let err = assert_err!(engine.smart_fetch(CID, None).await);
    match err {
        CoreError::AllCandidatesExhausted { cid, errors } => {
            assert_eq!(cid, CID);
            assert_eq!(errors.len(), 3);
            assert!(errors.iter().all(|e| e.reason == FailureKind::Http { status: 404 }));
        }
        other => panic!("expected AllCandidatesExhausted, got {other:?}"),
    }
    assert_eq!(engine.peak_concurrent_transfers(), 0);
}

#[tokio::test]
async fn test_smart_fetch_rejects_invalid_cid() {
    let engine = Engine::with_gateways(config(None), Vec::new()).unwrap();
    let err = assert_err!(engine.smart_fetch("not-a-cid", None).await);
    assert!(matches!(err, CoreError::InvalidCid { .. }));
}

#[tokio::test]
async fn test_cancelled_fetch_records_nothing() {
    let server = MockServer::start().await;
    object_head(&server).await;
    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world").set_delay(SLOW))
        .mount(&server)
        .await;

    let mut cfg = config(None);
    cfg.fetch.download_timeout = Duration::from_secs(10);
    let engine = Engine::with_gateways(cfg, vec![gateway(&server, 1)]).unwrap();

    let fetching = engine.clone();
    let task = tokio::spawn(async move { fetching.smart_fetch(CID, None).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.cancel_fetches().await;

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(CoreError::Cancelled)));
    assert!(engine.health_record(&id(&server)).is_none());
}

#[tokio::test]
async fn test_smart_fetch_to_file_renames_part_file() {
    let server = MockServer::start().await;
    object_head(&server).await;
    object_body(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("hello.txt");
    let engine = Engine::with_gateways(config(None), vec![gateway(&server, 1)]).unwrap();

    let fetched = engine.smart_fetch_to_file(CID, &dest).await.unwrap();

    assert_eq!(fetched.path, dest);
    assert_eq!(fetched.report.size, 11);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello world");
    assert!(!dir.path().join("hello.txt.part").exists());
}

#[tokio::test]
async fn test_resolve_url_skips_failing_gateway() {
    let gws = servers(2).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&gws[0])
        .await;
    object_head(&gws[1]).await;

    let gateways = vec![gateway(&gws[0], 1), gateway(&gws[1], 2)];
    let engine = Engine::with_gateways(config(None), gateways).unwrap();

    let resolved = engine.resolve_url(CID).await.unwrap();
    assert_eq!(resolved.gateway.id, id(&gws[1]));
    assert_eq!(resolved.url, format!("{}{}", gws[1].uri(), object_path()));
    assert_eq!(resolved.failures.len(), 1);
}

// ── Registry ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_gateway_lifecycle() {
    let engine = Engine::with_gateways(config(None), Vec::new()).unwrap();

    let bad = engine
        .add_custom_gateway(CustomGateway {
            name: "broken".into(),
            url: "gopher://nowhere".into(),
            ..CustomGateway::default()
        })
        .await;
    assert!(matches!(bad, Err(CoreError::ConfigInvalid { .. })));
    assert!(engine.list_gateways().is_empty());

    let gw = engine
        .add_custom_gateway(CustomGateway {
            name: "Mine".into(),
            url: "https://gw.example.com/ipfs/:hash".into(),
            region: Some(Region::Cn),
            ..CustomGateway::default()
        })
        .await
        .unwrap();
    assert_eq!(gw.url_template, "https://gw.example.com/ipfs/{cid}");
    assert_eq!(engine.list_gateways().len(), 1);

    engine.remove_custom_gateway(&gw.id).await.unwrap();
    assert!(engine.list_gateways().is_empty());
}

#[tokio::test]
async fn test_refresh_public_gateways_imports_new_entries() {
    let list = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateways.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "https://ipfs.io/ipfs/:hash",
            "https://gw.example.org/ipfs/:hash",
            "not a gateway",
        ])))
        .mount(&list)
        .await;

    let mut cfg = config(None);
    cfg.public_lists = vec![format!("{}/gateways.json", list.uri())];
    let engine = Engine::new(cfg).unwrap();
    let before = engine.list_gateways().len();

    let added = engine.refresh_public_gateways().await.unwrap();

    assert_eq!(added, 1);
    let entries = engine.list_gateways();
    assert_eq!(entries.len(), before + 1);
    let imported = &entries.last().unwrap().gateway;
    assert_eq!(imported.id.as_str(), "gw.example.org");
    assert_eq!(imported.origin, GatewayOrigin::FetchedPublic);
}

#[tokio::test]
async fn test_refresh_public_gateways_fails_when_every_list_fails() {
    let list = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&list)
        .await;

    let mut cfg = config(None);
    cfg.public_lists = vec![format!("{}/gateways.json", list.uri())];
    let engine = Engine::with_gateways(cfg, Vec::new()).unwrap();

    let err = assert_err!(engine.refresh_public_gateways().await);
    assert!(matches!(err, CoreError::GatewayList { .. }));
}

// ── Cleanup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cleanup_marks_without_deleting_until_applied() {
    let gws = servers(2).await;
    healthy_probe(&gws[0]).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&gws[1])
        .await;

    let gateways = vec![gateway(&gws[0], 1), gateway(&gws[1], 2)];
    let engine = Engine::with_gateways(config(None), gateways).unwrap();

    for _ in 0..6 {
        engine.refresh_sweep(true).await.unwrap();
    }
    let bad = id(&gws[1]);
    assert_eq!(engine.health_record(&bad).unwrap().failure_count, 6);

    let report = engine.cleanup_report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].gateway_id, bad);

    // auto_delete is off: a scheduled pass only marks.
    let run = engine.run_cleanup().await;
    assert_eq!(run.marked.len(), 1);
    assert!(run.removed.is_empty());
    assert!(engine.list_gateways().iter().any(|e| e.gateway.id == bad));

    let outcome = engine
        .apply_cleanup(&[bad.clone(), id(&gws[0])])
        .await;
    assert_eq!(outcome.removed.len(), 1);
    assert_eq!(outcome.skipped, vec![id(&gws[0])]);
    assert!(engine.list_gateways().iter().all(|e| e.gateway.id != bad));
    assert!(engine.health_record(&bad).is_none());
}

#[tokio::test]
async fn test_auto_delete_removes_marked_gateways() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut cfg = config(None);
    cfg.cleanup.auto_delete = true;
    let engine = Engine::with_gateways(cfg, vec![gateway(&server, 1)]).unwrap();
    for _ in 0..4 {
        engine.refresh_sweep(true).await.unwrap();
    }

    let run = engine.run_cleanup().await;
    assert_eq!(run.removed, vec![id(&server)]);
    assert!(engine.list_gateways().is_empty());
}

#[tokio::test]
async fn test_start_and_shutdown_cleanup_task() {
    let mut cfg = config(None);
    cfg.cleanup.interval = Duration::from_millis(20);
    let engine = Engine::with_gateways(cfg, Vec::new()).unwrap();

    engine.start().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .expect("shutdown must join the cleanup task");
}

#[tokio::test]
async fn test_repeated_start_keeps_one_cleanup_task() {
    let mut cfg = config(None);
    cfg.cleanup.interval = Duration::from_millis(20);
    let engine = Engine::with_gateways(cfg, Vec::new()).unwrap();

    engine.start().await;
    engine.start().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .expect("shutdown must stop every cleanup task");

    // A stopped engine can be started again.
    engine.start().await;
    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .expect("second shutdown must join the restarted task");
}

// ── Persistence ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_all_succeed() {
    let server = MockServer::start().await;
    healthy_probe(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_path_buf();
    let engine =
        Engine::with_gateways(config(Some(state_dir.clone())), vec![gateway(&server, 1)]).unwrap();
    engine.refresh_sweep(true).await.unwrap();

    for _ in 0..5 {
        let saves = (0..8).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.save_state().await })
        });
        for result in futures_util::future::join_all(saves).await {
            assert_ok!(result.unwrap());
        }
    }

    let leftovers: Vec<_> = std::fs::read_dir(&state_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");

    let reopened =
        Engine::with_gateways(config(Some(state_dir)), vec![gateway(&server, 1)]).unwrap();
    reopened.load_state().await.unwrap();
    assert_eq!(reopened.health_record(&id(&server)).unwrap().success_count, 1);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let server = MockServer::start().await;
    healthy_probe(&server).await;
    let custom = MockServer::start().await;
    healthy_probe(&custom).await;

    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_path_buf();

    let engine =
        Engine::with_gateways(config(Some(state_dir.clone())), vec![gateway(&server, 1)]).unwrap();
    let added = engine
        .add_custom_gateway(CustomGateway {
            name: "Mine".into(),
            url: custom.uri(),
            ..CustomGateway::default()
        })
        .await
        .unwrap();
    engine.refresh_sweep(true).await.unwrap();
    engine.shutdown().await;

    for file in ["health.json", "sweep.json", "gateways.json"] {
        assert!(state_dir.join(file).exists(), "{file} should be written");
    }

    let restarted =
        Engine::with_gateways(config(Some(state_dir)), vec![gateway(&server, 1)]).unwrap();
    restarted.load_state().await.unwrap();

    assert_eq!(restarted.list_gateways().len(), 2);
    assert_eq!(
        restarted.health_record(&added.id).unwrap().success_count,
        1
    );
    let report = restarted.refresh_sweep(false).await.unwrap();
    assert!(report.from_cache);
    assert_eq!(report.ranked.len(), 2);
}

#[tokio::test]
async fn test_cache_version_bump_discards_persisted_sweep() {
    let server = MockServer::start().await;
    healthy_probe(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_path_buf();

    let engine =
        Engine::with_gateways(config(Some(state_dir.clone())), vec![gateway(&server, 1)]).unwrap();
    engine.refresh_sweep(true).await.unwrap();

    let mut bumped = config(Some(state_dir));
    bumped.cache.version += 1;
    let restarted = Engine::with_gateways(bumped, vec![gateway(&server, 1)]).unwrap();
    restarted.load_state().await.unwrap();

    assert!(restarted.cached_sweep().is_none());
    // Health is versioned separately and survives.
    assert!(restarted.health_record(&id(&server)).is_some());
}
