use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{
    config::PollingConfig,
    core::{
        domain::{
            Endpoint, Solution, SolutionId, SubmissionRequest, SubmitOutcome, Task,
            ValidationErrors,
        },
        errors::LifecycleError,
        polling::{self, PollHandle, PollListener, StopReason},
        traits::grading::GradingApi,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    AwaitingResult,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    SubmitForm,
    ResultDetail,
}

/// What the rendering layer needs to draw one task's submission flow.
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleSnapshot {
    pub phase: Phase,
    pub surface: Surface,
    pub solution: Option<Solution>,
    pub errors: Option<ValidationErrors>,
    pub failure: Option<String>,
    pub poll_session: Option<Uuid>,
    pub stop_reason: Option<StopReason>,
    /// Bumped on every accepted submission. Poll updates carrying an older
    /// value are dropped.
    pub submission: u64,
}

impl Default for LifecycleSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            surface: Surface::SubmitForm,
            solution: None,
            errors: None,
            failure: None,
            poll_session: None,
            stop_reason: None,
            submission: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    ValidationFailed(ValidationErrors),
    Submitting,
    SubmissionFailed { msg: String },
    SurfaceChanged { closed: Surface, opened: Surface },
    PollingStarted { session_id: Uuid, solution_id: SolutionId },
    SolutionUpdated(Solution),
    PollingStopped(StopReason),
    PollingCancelled { session_id: Uuid },
}

pub type LifecycleEvents = UnboundedReceiverStream<LifecycleEvent>;

/// Drives submission and result polling for a single task.
///
/// At most one poll session is alive per controller: a new submission
/// cancels the previous session before anything else happens, and dropping
/// the controller cancels whatever is still running.
#[derive(Debug)]
pub struct SolutionLifecycleController {
    task: Task,
    api: Arc<dyn GradingApi>,
    polling: PollingConfig,
    state: Arc<watch::Sender<LifecycleSnapshot>>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    poll: Option<PollHandle>,
}

impl SolutionLifecycleController {
    pub fn new(
        task: Task,
        api: Arc<dyn GradingApi>,
        polling: PollingConfig,
    ) -> (Self, LifecycleEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            task,
            api,
            polling,
            state: Arc::new(watch::Sender::new(LifecycleSnapshot::default())),
            events,
            poll: None,
        };
        (controller, UnboundedReceiverStream::new(events_rx))
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.state.subscribe()
    }

    pub fn poll_handle(&self) -> Option<&PollHandle> {
        self.poll.as_ref()
    }

    #[tracing::instrument(
        skip(self, request),
        fields(task_id = self.task.id, kind = %request.kind())
    )]
    pub async fn submit(
        &mut self,
        request: SubmissionRequest,
        endpoint: &Endpoint,
    ) -> Result<Solution, LifecycleError> {
        self.check_request(&request)?;

        self.cancel_polling();
        self.open_submit_surface();
        self.state.send_modify(|s| {
            s.phase = Phase::Submitting;
            s.errors = None;
            s.failure = None;
        });
        self.emit(LifecycleEvent::Submitting);

        tracing::debug!("Sending submission to {} {}", endpoint.method, endpoint.url);
        let outcome = self.api.submit(endpoint, &request).await;

        match outcome {
            Ok(SubmitOutcome::Accepted(solution)) => {
                tracing::info!(
                    solution_id = solution.id,
                    status = %solution.status,
                    "Submission accepted"
                );
                self.accept(solution.clone());
                Ok(solution)
            }
            Ok(SubmitOutcome::Rejected(errors)) => {
                tracing::info!("Submission rejected: {}", errors);
                self.state.send_modify(|s| {
                    s.phase = Phase::Idle;
                    s.errors = Some(errors.clone());
                });
                self.emit(LifecycleEvent::ValidationFailed(errors.clone()));
                Err(LifecycleError::Validation(errors))
            }
            Err(e) => {
                tracing::warn!("Submission failed: {}", e);
                let msg = e.to_string();
                self.state.send_modify(|s| {
                    s.phase = Phase::Idle;
                    s.failure = Some(msg.clone());
                });
                self.emit(LifecycleEvent::SubmissionFailed { msg });
                Err(e.into())
            }
        }
    }

    /// Starts refreshing `solution_id`, replacing any running session.
    pub fn start_polling(&mut self, solution_id: SolutionId) -> &PollHandle {
        self.cancel_polling();

        let listener = ResultListener {
            submission: self.state.borrow().submission,
            state: self.state.clone(),
            events: self.events.clone(),
        };
        let handle =
            polling::start_polling(self.api.clone(), solution_id, &self.polling, listener);
        let session_id = handle.session_id();

        self.state.send_modify(|s| {
            s.phase = Phase::AwaitingResult;
            s.poll_session = Some(session_id);
            s.stop_reason = None;
        });
        self.emit(LifecycleEvent::PollingStarted {
            session_id,
            solution_id,
        });

        self.poll.insert(handle)
    }

    /// Stops the running session, if any. The last observed solution stays
    /// on display and the submission counts as resolved.
    pub fn cancel_polling(&self) {
        let Some(handle) = &self.poll else {
            return;
        };
        if !handle.is_active() {
            return;
        }

        handle.cancel();
        let session_id = handle.session_id();
        self.state.send_modify(|s| {
            if s.poll_session == Some(session_id) {
                s.poll_session = None;
            }
            if s.phase == Phase::AwaitingResult {
                s.phase = Phase::Resolved;
            }
        });
        self.emit(LifecycleEvent::PollingCancelled { session_id });
    }

    pub fn open_submit_surface(&self) {
        self.switch_surface(Surface::SubmitForm);
    }

    pub fn focus_result_surface(&self) {
        self.switch_surface(Surface::ResultDetail);
    }

    /// Resolves once nothing is in flight: the submission was resolved,
    /// cancelled, or sent back to `Phase::Idle` by a failure.
    pub async fn wait_until_resolved(&self) -> LifecycleSnapshot {
        let mut rx = self.state.subscribe();
        let settled = |s: &LifecycleSnapshot| matches!(s.phase, Phase::Resolved | Phase::Idle);
        match rx.wait_for(settled).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    fn check_request(&self, request: &SubmissionRequest) -> Result<(), LifecycleError> {
        let expected = self.task.submission_kind();
        if request.kind() != expected {
            return Err(LifecycleError::MismatchedSubmission {
                expected,
                got: request.kind(),
            });
        }

        if let SubmissionRequest::Code { code } = request {
            if code.is_empty() {
                let errors = ValidationErrors::no_code();
                tracing::debug!("Rejecting empty code before submission");
                self.state.send_modify(|s| s.errors = Some(errors.clone()));
                self.emit(LifecycleEvent::ValidationFailed(errors.clone()));
                return Err(LifecycleError::Validation(errors));
            }
        }

        Ok(())
    }

    fn accept(&mut self, solution: Solution) {
        let gradable = self.task.gradable;
        self.state.send_modify(|s| {
            s.submission += 1;
            s.phase = if gradable {
                Phase::AwaitingResult
            } else {
                Phase::Resolved
            };
            s.solution = Some(solution.clone());
            s.poll_session = None;
            s.stop_reason = None;
        });

        self.focus_result_surface();

        if gradable {
            self.start_polling(solution.id);
        }
    }

    fn switch_surface(&self, opened: Surface) {
        let mut closed = opened;
        let changed = self.state.send_if_modified(|s| {
            if s.surface == opened {
                return false;
            }
            closed = s.surface;
            s.surface = opened;
            true
        });
        if changed {
            self.emit(LifecycleEvent::SurfaceChanged { closed, opened });
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for SolutionLifecycleController {
    fn drop(&mut self) {
        if let Some(handle) = &self.poll {
            handle.cancel();
        }
    }
}

struct ResultListener {
    submission: u64,
    state: Arc<watch::Sender<LifecycleSnapshot>>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
}

impl PollListener for ResultListener {
    fn on_update(&mut self, solution: &Solution) {
        let submission = self.submission;
        let applied = self.state.send_if_modified(|s| {
            if s.submission != submission {
                return false;
            }
            s.solution = Some(solution.clone());
            true
        });
        if applied {
            let _ = self.events.send(LifecycleEvent::SolutionUpdated(solution.clone()));
        }
    }

    fn on_stop(&mut self, reason: &StopReason) {
        let submission = self.submission;
        let applied = self.state.send_if_modified(|s| {
            if s.submission != submission {
                return false;
            }
            s.phase = Phase::Resolved;
            s.poll_session = None;
            s.stop_reason = Some(reason.clone());
            true
        });
        if applied {
            let _ = self.events.send(LifecycleEvent::PollingStopped(reason.clone()));
        }
    }
}
