//! # Drive a single check run to its terminal state.
//!
//! [`run_check`] owns one [`CheckRun`] and merges every source that can move
//! it forward in a single `select!` loop:
//!
//! ```text
//!            ┌── abort token      → ABORTED ┐
//!  stop ─────┼── runtime token    → KILLED  ├─► terminal
//!            └── deadline         → TIMEOUT ┘
//!  push stream ──► apply_push ──► advance / discard / MALFORMED / terminal
//!  backend.run ──► Ok  → RUNNING
//!              └─► Err → FAILED
//!  run handle  ──► Ok  → FINISHED
//!              └─► Err → ABORTED | KILLED | TIMEOUT | FAILED (by which scope fired)
//! ```
//!
//! ## Rules
//! - Stop sources are polled first, then pushes, then the backend.
//! - The id is deregistered as soon as the terminal state is assigned; the
//!   stream is closed and drained before the backend is awaited.
//! - After a terminal decision the backend is cancelled and awaited for at most
//!   `backend_grace`, only to salvage its output.
//! - A [`Registration`] guard deregisters the id even if the future is dropped.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::check::{Check, CheckOutcome};
use super::run::{CheckRun, Verdict};
use crate::backend::{BackendRef, RunHandle, RunResult};
use crate::error::BackendError;
use crate::events::{Bus, Event, EventKind};
use crate::push::{PushRegistry, StatusUpdate};
use crate::states::State;

/// Everything a runner needs from the runtime.
pub(crate) struct RunContext {
    pub backend: BackendRef,
    pub registry: Arc<PushRegistry>,
    pub bus: Bus,
    pub push_address: String,
    pub default_timeout: Option<Duration>,
    pub backend_grace: Duration,
    pub runtime_token: CancellationToken,
}

/// Which stop source fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Aborted,
    Killed,
    Timeout,
}

impl Stop {
    fn state(self) -> State {
        match self {
            Stop::Aborted => State::Aborted,
            Stop::Killed => State::Killed,
            Stop::Timeout => State::Timeout,
        }
    }
}

enum Signal {
    Stop(Stop),
    Push(StatusUpdate),
    PushClosed,
    Launched(Result<RunHandle, BackendError>),
    Finished(RunResult),
}

/// Removes the push registration on drop.
struct Registration<'a> {
    registry: &'a PushRegistry,
    id: &'a str,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

/// Runs `check` as `id` until it reaches a terminal state.
pub(crate) async fn run_check(
    ctx: &RunContext,
    id: String,
    check: Check,
    abort: CancellationToken,
) -> CheckOutcome {
    let mut run = CheckRun::new(id.clone());
    ctx.bus.publish(
        Event::new(EventKind::CheckCreated)
            .with_check(id.as_str())
            .with_state(State::Created),
    );

    let mut rx = match ctx.registry.register(&id) {
        Ok(rx) => rx,
        Err(err) => {
            warn!(check_id = %id, error = %err, "unable to register check");
            run.terminate(State::Failed);
            let outcome = run.into_outcome(Vec::new(), Some(err.to_string()));
            publish_finished(&ctx.bus, &outcome);
            return outcome;
        }
    };
    let registration = Registration {
        registry: &ctx.registry,
        id: &id,
    };

    let timeout = check.timeout.or(ctx.default_timeout);
    let deadline = timeout
        .filter(|d| *d > Duration::ZERO)
        .and_then(|d| Instant::now().checked_add(d));
    let backend_token = ctx.runtime_token.child_token();
    let _cancel_backend = backend_token.clone().drop_guard();

    transition(ctx, &mut run, State::Init, "launch");
    let params = check.run_params(&id, &ctx.push_address);
    info!(check_id = %id, image = %check.image, target = %check.target, timeout = ?timeout, "running check");

    let mut launch: Option<BoxFuture<'_, Result<RunHandle, BackendError>>> =
        Some(ctx.backend.run(backend_token.clone(), params));
    let mut handle: Option<RunHandle> = None;
    let mut push_open = true;
    let mut error: Option<String> = None;
    let mut output = Vec::new();

    while !run.is_terminal() {
        let signal = tokio::select! {
            biased;
            stop = stop_reason(&abort, &ctx.runtime_token, deadline) => Signal::Stop(stop),
            update = rx.recv(), if push_open => match update {
                Some(update) => Signal::Push(update),
                None => Signal::PushClosed,
            },
            res = wait_result(&mut handle) => Signal::Finished(res),
            res = wait_launch(&mut launch) => Signal::Launched(res),
        };

        match signal {
            Signal::Stop(stop) => {
                info!(check_id = %id, state = %stop.state(), "check stopped");
                finish(ctx, &mut run, stop.state(), "stop");
            }
            Signal::Push(update) => apply_push(ctx, &mut run, update),
            Signal::PushClosed => push_open = false,
            Signal::Launched(Ok(h)) => {
                handle = Some(h);
                debug!(check_id = %id, backend = ctx.backend.name(), "check launched");
                transition(ctx, &mut run, State::Running, "launched");
            }
            Signal::Launched(Err(err)) => {
                warn!(check_id = %id, error = %err, "unable to launch check");
                error = Some(err.to_string());
                finish(ctx, &mut run, State::Failed, "launch failed");
            }
            Signal::Finished(res) => {
                output = res.output;
                let state = match res.result {
                    Ok(()) => State::Finished,
                    Err(err) => {
                        let state = classify(&abort, &ctx.runtime_token, deadline);
                        warn!(check_id = %id, state = %state, error = %err, "check run failed");
                        error = Some(err.to_string());
                        state
                    }
                };
                finish(ctx, &mut run, state, "backend");
            }
        }
    }

    drop(registration);
    rx.close();
    while rx.try_recv().is_ok() {}
    backend_token.cancel();

    if let Some(res) = salvage(launch, handle, ctx.backend_grace).await {
        output = res.output;
    } else if output.is_empty() && error.is_none() {
        debug!(check_id = %id, "no backend output salvaged");
    }

    let outcome = run.into_outcome(output, error);
    publish_finished(&ctx.bus, &outcome);
    info!(check_id = %outcome.id, state = %outcome.state, "check finished");
    outcome
}

/// Resolves with the first stop source to fire; abort wins over runtime
/// cancellation, which wins over the deadline.
async fn stop_reason(
    abort: &CancellationToken,
    runtime: &CancellationToken,
    deadline: Option<Instant>,
) -> Stop {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Stop::Aborted,
        _ = runtime.cancelled() => Stop::Killed,
        _ = sleep_until(deadline) => Stop::Timeout,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => pending().await,
    }
}

async fn wait_launch(
    launch: &mut Option<BoxFuture<'_, Result<RunHandle, BackendError>>>,
) -> Result<RunHandle, BackendError> {
    match launch.as_mut() {
        Some(fut) => {
            let res = fut.await;
            *launch = None;
            res
        }
        None => pending().await,
    }
}

async fn wait_result(handle: &mut Option<RunHandle>) -> RunResult {
    match handle.as_mut() {
        Some(h) => {
            let res = h.await;
            *handle = None;
            res
        }
        None => pending().await,
    }
}

/// Terminal state for a backend error, by which scope had fired.
fn classify(
    abort: &CancellationToken,
    runtime: &CancellationToken,
    deadline: Option<Instant>,
) -> State {
    if abort.is_cancelled() {
        State::Aborted
    } else if runtime.is_cancelled() {
        State::Killed
    } else if deadline.is_some_and(|at| Instant::now() >= at) {
        State::Timeout
    } else {
        State::Failed
    }
}

/// Waits at most `grace` for a backend that was cancelled or is finishing.
async fn salvage(
    launch: Option<BoxFuture<'_, Result<RunHandle, BackendError>>>,
    handle: Option<RunHandle>,
    grace: Duration,
) -> Option<RunResult> {
    let wait = async move {
        let handle = match (handle, launch) {
            (Some(h), _) => h,
            (None, Some(launch)) => launch.await.ok()?,
            (None, None) => return None,
        };
        Some(handle.await)
    };
    time::timeout(grace, wait).await.ok().flatten()
}

fn apply_push(ctx: &RunContext, run: &mut CheckRun, update: StatusUpdate) {
    match run.apply_push(update) {
        Verdict::Updated => {
            debug!(check_id = run.id(), state = %run.state(), "push applied");
            ctx.bus.publish(
                Event::new(EventKind::PushApplied)
                    .with_check(run.id())
                    .with_state(run.state()),
            );
        }
        Verdict::Advanced { from, to } => {
            info!(check_id = run.id(), from = %from, to = %to, "state changed by push");
            ctx.bus.publish(
                Event::new(EventKind::StateChanged)
                    .with_check(run.id())
                    .with_transition(from, to)
                    .with_reason("push"),
            );
        }
        Verdict::Discarded { current, reported } => {
            warn!(check_id = run.id(), current = %current, reported = %reported, "discarding push, state regression");
            ctx.bus.publish(
                Event::new(EventKind::PushDiscarded)
                    .with_check(run.id())
                    .with_transition(current, reported),
            );
        }
        Verdict::Malformed(raw) => {
            warn!(check_id = run.id(), status = %raw, "invalid status pushed");
            finish(ctx, run, State::Malformed, "invalid status pushed");
        }
        Verdict::Closed => {}
    }
}

/// Moves to a later non-terminal state, publishing the change.
fn transition(ctx: &RunContext, run: &mut CheckRun, to: State, reason: &'static str) {
    let from = run.state();
    if run.advance(to) {
        debug!(check_id = run.id(), from = %from, to = %to, reason, "state changed");
        ctx.bus.publish(
            Event::new(EventKind::StateChanged)
                .with_check(run.id())
                .with_transition(from, to)
                .with_reason(reason),
        );
    }
}

/// Assigns the terminal state, publishing the change.
fn finish(ctx: &RunContext, run: &mut CheckRun, to: State, reason: &'static str) {
    let from = run.state();
    if run.terminate(to) {
        ctx.bus.publish(
            Event::new(EventKind::StateChanged)
                .with_check(run.id())
                .with_transition(from, to)
                .with_reason(reason),
        );
    }
}

fn publish_finished(bus: &Bus, outcome: &CheckOutcome) {
    let mut ev = Event::new(EventKind::CheckFinished)
        .with_check(outcome.id.as_str())
        .with_state(outcome.state);
    if let Some(err) = &outcome.error {
        ev = ev.with_reason(err.as_str());
    }
    bus.publish(ev);
}
