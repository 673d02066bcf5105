use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use checkvisor::{
    BackendError, BackendFn, BackendRef, CHECK_STATES, Check, Config, EventKind, PushRegistry,
    RunParams, Runtime, RuntimeError, State, StatusUpdate,
};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.backend_grace = Duration::from_millis(200);
    cfg.grace = Duration::from_secs(5);
    cfg
}

fn runtime(backend: BackendRef) -> (Runtime, Arc<PushRegistry>) {
    let registry = Arc::new(PushRegistry::default());
    let rt = Runtime::builder(config(), backend)
        .with_registry(Arc::clone(&registry))
        .with_push_address("http://127.0.0.1:9")
        .build();
    (rt, registry)
}

/// Backend that waits for cancellation and records it.
fn until_cancelled(flag: Arc<AtomicBool>) -> BackendRef {
    BackendFn::arc("until-cancelled", move |ctx: CancellationToken, _p: RunParams| {
        let flag = Arc::clone(&flag);
        async move {
            ctx.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Err::<Vec<u8>, _>(BackendError::Canceled)
        }
    })
}

async fn wait_registered(registry: &PushRegistry, n: usize) {
    while registry.len() < n {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn backend_success_finishes() {
    let backend = BackendFn::arc("ok", |_ctx: CancellationToken, p: RunParams| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, BackendError>(format!("scanned {}", p.target).into_bytes())
    });
    let (rt, registry) = runtime(backend);

    let outcome = rt.run(Check::new("acme/scan:1", "example.com")).await.unwrap();
    assert_eq!(outcome.state, State::Finished);
    assert_eq!(outcome.output, b"scanned example.com");
    assert_eq!(
        outcome.history,
        [State::Created, State::Init, State::Running, State::Finished]
    );
    assert!(outcome.error.is_none());
    assert!(registry.is_empty());
    assert!(rt.running().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_the_backend() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (rt, registry) = runtime(until_cancelled(Arc::clone(&cancelled)));

    let check = Check::new("acme/scan:1", "example.com").with_timeout(Duration::from_secs(1));
    let outcome = rt.run(check).await.unwrap();
    assert_eq!(outcome.state, State::Timeout);
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn terminal_push_wins_and_cancels_the_backend() {
    let registry = Arc::new(PushRegistry::default());
    let cancelled = Arc::new(AtomicBool::new(false));
    let backend = {
        let registry = Arc::clone(&registry);
        let cancelled = Arc::clone(&cancelled);
        BackendFn::arc("inconclusive", move |ctx: CancellationToken, p: RunParams| {
            let registry = Arc::clone(&registry);
            let cancelled = Arc::clone(&cancelled);
            async move {
                registry
                    .deliver(
                        StatusUpdate::new(p.check_id.as_str())
                            .with_status(State::Inconclusive)
                            .with_report("no open ports"),
                    )
                    .await
                    .map_err(|e| BackendError::run(e.to_string()))?;
                ctx.cancelled().await;
                cancelled.store(true, Ordering::SeqCst);
                Ok::<_, BackendError>(b"partial".to_vec())
            }
        })
    };
    let rt = Runtime::builder(config(), backend)
        .with_registry(Arc::clone(&registry))
        .build();

    let outcome = rt.run(Check::new("acme/scan:1", "example.com")).await.unwrap();
    assert_eq!(outcome.state, State::Inconclusive);
    assert_eq!(outcome.report.as_deref(), Some("no open ports"));
    assert_eq!(outcome.output, b"partial");
    assert!(outcome.error.is_none());
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn regressions_are_discarded() {
    let registry = Arc::new(PushRegistry::default());
    let backend = {
        let registry = Arc::clone(&registry);
        BackendFn::arc("regress", move |_ctx: CancellationToken, p: RunParams| {
            let registry = Arc::clone(&registry);
            async move {
                for update in [
                    StatusUpdate::new(p.check_id.as_str()).with_status(State::Running),
                    StatusUpdate::new(p.check_id.as_str())
                        .with_status(State::Init)
                        .with_progress(0.9),
                    StatusUpdate::new(p.check_id.as_str()).with_progress(0.4),
                ] {
                    registry
                        .deliver(update)
                        .await
                        .map_err(|e| BackendError::run(e.to_string()))?;
                }
                Ok::<_, BackendError>(Vec::new())
            }
        })
    };
    let rt = Runtime::builder(config(), backend)
        .with_registry(Arc::clone(&registry))
        .build();
    let mut events = rt.subscribe();

    let outcome = rt.run(Check::new("acme/scan:1", "example.com")).await.unwrap();
    assert_eq!(outcome.state, State::Finished);
    assert_eq!(outcome.progress, Some(0.4));
    assert_eq!(
        outcome.history,
        [State::Created, State::Init, State::Running, State::Finished]
    );

    let mut discarded = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::PushDiscarded {
            discarded.push((ev.previous, ev.state));
        }
    }
    assert_eq!(discarded, [(Some(State::Running), Some(State::Init))]);
}

#[tokio::test]
async fn backend_failure_fails() {
    let backend = BackendFn::arc("exit-2", |_ctx: CancellationToken, _p: RunParams| async move {
        Err::<Vec<u8>, _>(BackendError::Run {
            code: Some(2),
            error: "nmap: host unreachable".into(),
        })
    });
    let (rt, _registry) = runtime(backend);

    let outcome = rt.run(Check::new("acme/scan:1", "example.com")).await.unwrap();
    assert_eq!(outcome.state, State::Failed);
    assert!(outcome.error.unwrap().contains("host unreachable"));
}

#[tokio::test]
async fn abort_settles_in_aborted() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (rt, registry) = runtime(until_cancelled(Arc::clone(&cancelled)));

    let handle = rt.submit(Check::new("acme/scan:1", "example.com"));
    wait_registered(&registry, 1).await;
    assert_eq!(rt.running(), [handle.id().to_string()]);
    assert!(rt.abort(handle.id()));
    assert!(!rt.abort("no-such-check"));

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.state, State::Aborted);
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(rt.running().is_empty());
}

#[tokio::test]
async fn shutdown_kills_every_run() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (rt, registry) = runtime(until_cancelled(Arc::clone(&cancelled)));
    let mut events = rt.subscribe();

    let handles: Vec<_> = (0..5)
        .map(|i| rt.submit(Check::new("acme/scan:1", format!("host-{i}"))))
        .collect();
    wait_registered(&registry, 5).await;

    rt.shutdown().await.unwrap();
    for h in handles {
        assert_eq!(h.outcome().await.unwrap().state, State::Killed);
    }
    assert!(registry.is_empty());
    assert!(rt.running().is_empty());

    let late = rt.run(Check::new("acme/scan:1", "late")).await.unwrap();
    assert_eq!(late.state, State::Killed);

    let mut kinds = Vec::new();
    let mut last_seq = None;
    while let Ok(ev) = events.try_recv() {
        if let Some(prev) = last_seq {
            assert!(ev.seq > prev);
        }
        last_seq = Some(ev.seq);
        kinds.push(ev.kind);
    }
    assert!(kinds.contains(&EventKind::ShutdownRequested));
    assert!(kinds.contains(&EventKind::AllStoppedWithin));
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::CheckFinished).count(),
        6
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_stuck_runs() {
    let backend = BackendFn::arc("stubborn", |_ctx: CancellationToken, _p: RunParams| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<_, BackendError>(Vec::new())
    });
    let mut cfg = config();
    cfg.grace = Duration::from_millis(100);
    cfg.backend_grace = Duration::from_secs(10);
    let registry = Arc::new(PushRegistry::default());
    let rt = Runtime::builder(cfg, backend)
        .with_registry(Arc::clone(&registry))
        .build();

    let handle = rt.submit(Check::new("acme/scan:1", "example.com"));
    wait_registered(&registry, 1).await;

    match rt.shutdown().await {
        Err(RuntimeError::GraceExceeded { stuck, .. }) => {
            assert_eq!(stuck, [handle.id().to_string()]);
        }
        other => panic!("unexpected shutdown result: {other:?}"),
    }
    // The run itself is already terminal; it is only salvaging output.
    assert!(registry.is_empty());
    assert_eq!(handle.outcome().await.unwrap().state, State::Killed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_stay_isolated() {
    let registry = Arc::new(PushRegistry::default());
    let backend = {
        let registry = Arc::clone(&registry);
        BackendFn::arc("random", move |_ctx: CancellationToken, p: RunParams| {
            let registry = Arc::clone(&registry);
            async move {
                let latency: u64 = p.metadata["latency_ms"].parse().unwrap_or(0);
                for status in p.metadata["pushes"].split(',').filter(|s| !s.is_empty()) {
                    let update = StatusUpdate::new(p.check_id.as_str())
                        .with_raw_status(status)
                        .with_report(p.check_id.as_str());
                    // The run may already be terminal and deregistered.
                    let _ = registry.deliver(update).await;
                    tokio::task::yield_now().await;
                }
                tokio::time::sleep(Duration::from_millis(latency)).await;
                if p.metadata["fail"] == "true" {
                    Err(BackendError::run("random failure"))
                } else {
                    Ok(p.check_id.into_bytes())
                }
            }
        })
    };
    let rt = Runtime::builder(config(), backend)
        .with_registry(Arc::clone(&registry))
        .build();

    let pool = [
        "INIT",
        "RUNNING",
        "RUNNING",
        "CREATED",
        "FINISHED",
        "INCONCLUSIVE",
        "FAILED",
    ];
    let handles: Vec<_> = {
        let mut rng = rand::rng();
        (0..100)
            .map(|i| {
                let mut pushes: Vec<&str> = pool
                    .iter()
                    .copied()
                    .filter(|_| rng.random_bool(0.4))
                    .collect();
                pushes.shuffle(&mut rng);
                let check = Check::new("acme/scan:1", format!("host-{i}"))
                    .with_metadata("latency_ms", rng.random_range(0..30u64).to_string())
                    .with_metadata("pushes", pushes.join(","))
                    .with_metadata("fail", rng.random_bool(0.2).to_string());
                rt.submit(check)
            })
            .collect()
    };

    let mut ids = std::collections::HashSet::new();
    for h in handles {
        let outcome = h.outcome().await.unwrap();
        assert!(ids.insert(outcome.id.clone()));
        assert!(CHECK_STATES.is_terminal(outcome.state), "{:?}", outcome.state);
        assert_eq!(
            outcome.history.iter().filter(|s| CHECK_STATES.is_terminal(**s)).count(),
            1
        );
        if let Some(report) = &outcome.report {
            assert_eq!(report, &outcome.id);
        }
        if !outcome.output.is_empty() {
            assert_eq!(outcome.output, outcome.id.as_bytes());
        }
        let stages: Vec<_> = outcome
            .history
            .iter()
            .filter_map(|s| CHECK_STATES.stage_of(*s))
            .collect();
        assert!(stages.windows(2).all(|w| w[0] < w[1]), "{:?}", outcome.history);
    }
    assert!(registry.is_empty());
    assert!(rt.running().is_empty());
}
