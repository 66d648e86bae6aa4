use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::core::{
    domain::{Endpoint, Solution, SolutionId, SolutionStatus, SubmissionRequest, SubmitOutcome},
    errors::ApiError,
    traits::grading::GradingApi,
};

/// Grading backend that answers submissions with a fixed outcome and walks
/// polled solutions through a scripted list of statuses.
#[derive(Debug)]
pub struct GradingApiStub {
    submit_result: Result<SubmitOutcome, ApiError>,
    statuses: Mutex<VecDeque<SolutionStatus>>,
    final_status: SolutionStatus,
    test_output: Option<serde_json::Value>,
    delay: Duration,
}

impl GradingApiStub {
    pub fn new(
        submit_result: Result<SubmitOutcome, ApiError>,
        statuses: Vec<SolutionStatus>,
        delay: Duration,
    ) -> Self {
        let final_status = statuses.last().copied().unwrap_or_default();
        Self {
            submit_result,
            statuses: Mutex::new(statuses.into()),
            final_status,
            test_output: None,
            delay,
        }
    }

    /// Attached to the solution once it reaches a terminal status.
    pub fn with_test_output(mut self, test_output: serde_json::Value) -> Self {
        self.test_output = Some(test_output);
        self
    }
}

#[async_trait::async_trait]
impl GradingApi for GradingApiStub {
    #[tracing::instrument]
    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Submission result: {:?}", self.submit_result);

        self.submit_result.clone()
    }

    #[tracing::instrument]
    async fn fetch_solution(&self, solution_id: SolutionId) -> Result<Solution, ApiError> {
        tokio::time::sleep(self.delay).await;
        let status = self
            .statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or(self.final_status);
        tracing::debug!("Polled status: {:?}", status);

        Ok(Solution {
            id: solution_id,
            status,
            test_output: status
                .is_terminal()
                .then(|| self.test_output.clone())
                .flatten(),
            ..Default::default()
        })
    }
}
