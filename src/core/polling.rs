//! Bounded, cancellable refresh of a solution's grading status.
//!
//! A session issues one status request per interval, the first one a full
//! interval after it starts. Every successful response is handed to the
//! listener before the stop condition is checked, so non-terminal updates
//! are observed too. The session stops when a terminal status is seen or
//! once the number of successful responses exceeds `max_attempts`.
//!
//! Failed requests are logged and skipped: they neither reach the listener
//! nor count as an attempt. Ticks never overlap, a slow response pushes the
//! next tick back instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::{
    config::PollingConfig,
    core::{
        domain::{Solution, SolutionId, SolutionStatus},
        traits::grading::GradingApi,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub struct PollSession {
    pub id: Uuid,
    pub solution_id: SolutionId,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl PollSession {
    fn new(solution_id: SolutionId, config: &PollingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            solution_id,
            attempts_made: 0,
            max_attempts: config.max_attempts,
            interval: config.interval().max(Duration::from_millis(1)),
            started_at: chrono::Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    Terminal(SolutionStatus),
    Exhausted {
        attempts: u32,
        last_status: SolutionStatus,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollState {
    Active,
    Stopped(StopReason),
    Cancelled,
}

pub trait PollListener: Send + 'static {
    fn on_update(&mut self, solution: &Solution);

    fn on_stop(&mut self, _reason: &StopReason) {}
}

impl<F> PollListener for F
where
    F: FnMut(&Solution) + Send + 'static,
{
    fn on_update(&mut self, solution: &Solution) {
        self(solution)
    }
}

#[derive(Debug)]
struct Shared {
    attempts: AtomicU32,
    state: watch::Sender<PollState>,
}

impl Shared {
    fn is_active(&self) -> bool {
        matches!(*self.state.borrow(), PollState::Active)
    }

    /// Leaves `Active` at most once; later transitions are ignored.
    fn finish(&self, next: PollState) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, PollState::Active) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

/// Dropping the handle detaches the session; call `cancel` to stop it.
#[derive(Debug)]
pub struct PollHandle {
    session: PollSession,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn solution_id(&self) -> SolutionId {
        self.session.solution_id
    }

    pub fn attempts_made(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> PollSession {
        PollSession {
            attempts_made: self.attempts_made(),
            ..self.session.clone()
        }
    }

    pub fn state(&self) -> PollState {
        self.shared.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Stops the timer. A no-op once the session is cancelled or stopped.
    pub fn cancel(&self) {
        if self.shared.finish(PollState::Cancelled) {
            self.task.abort();
            tracing::debug!(
                session_id = %self.session.id,
                solution_id = self.session.solution_id,
                attempts_made = self.attempts_made(),
                "Poll session cancelled"
            );
        }
    }

    /// Resolves once the session is no longer active.
    pub async fn wait(&self) -> PollState {
        let mut rx = self.shared.state.subscribe();
        match rx
            .wait_for(|state| !matches!(state, PollState::Active))
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

#[tracing::instrument(skip(api, config, listener))]
pub fn start_polling<L>(
    api: Arc<dyn GradingApi>,
    solution_id: SolutionId,
    config: &PollingConfig,
    listener: L,
) -> PollHandle
where
    L: PollListener,
{
    let session = PollSession::new(solution_id, config);
    let shared = Arc::new(Shared {
        attempts: AtomicU32::new(0),
        state: watch::Sender::new(PollState::Active),
    });

    tracing::info!(
        session_id = %session.id,
        interval_ms = session.interval.as_millis() as u64,
        max_attempts = session.max_attempts,
        "Poll session started"
    );

    let task = tokio::spawn(run_session(
        api,
        session.clone(),
        shared.clone(),
        listener,
    ));

    PollHandle {
        session,
        shared,
        task,
    }
}

async fn run_session<L: PollListener>(
    api: Arc<dyn GradingApi>,
    session: PollSession,
    shared: Arc<Shared>,
    mut listener: L,
) {
    let mut ticker = time::interval_at(Instant::now() + session.interval, session.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let solution = match api.fetch_solution(session.solution_id).await {
            Ok(solution) => solution,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    solution_id = session.solution_id,
                    error = %e,
                    "Poll tick failed, waiting for the next one"
                );
                continue;
            }
        };

        if !shared.is_active() {
            return;
        }

        let attempts_made = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            session_id = %session.id,
            attempts_made,
            status = %solution.status,
            "Poll tick"
        );

        listener.on_update(&solution);

        let reason = if solution.status.is_terminal() {
            StopReason::Terminal(solution.status)
        } else if attempts_made > session.max_attempts {
            StopReason::Exhausted {
                attempts: attempts_made,
                last_status: solution.status,
            }
        } else {
            continue;
        };

        if shared.finish(PollState::Stopped(reason.clone())) {
            tracing::info!(
                session_id = %session.id,
                solution_id = session.solution_id,
                ?reason,
                "Poll session stopped"
            );
            listener.on_stop(&reason);
        }
        return;
    }
}
