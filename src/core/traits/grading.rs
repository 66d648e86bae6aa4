use crate::core::{
    domain::{Endpoint, Solution, SolutionId, SubmissionRequest, SubmitOutcome},
    errors::ApiError,
};

#[mockall::automock]
#[async_trait::async_trait]
pub trait GradingApi: std::fmt::Debug + Send + Sync {
    /// Sends one submission. Server-side validation failures come back as
    /// `SubmitOutcome::Rejected`, not as an error.
    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmitOutcome, ApiError>;

    async fn fetch_solution(&self, solution_id: SolutionId) -> Result<Solution, ApiError>;
}
