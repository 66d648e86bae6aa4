use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::config::{ClientConfig, PollingConfig};
use crate::core::domain::{
    Endpoint, Solution, SolutionStatus, SubmissionRequest, SubmitEndpoints, SubmitOutcome, Task,
    TaskTest,
};
use crate::core::errors::{ApiError, LifecycleError};
use crate::core::lifecycle::{LifecycleEvent, Phase, SolutionLifecycleController, Surface};
use crate::core::polling::{PollState, StopReason};
use crate::core::progress::{TestOutputSummary, has_passing_solution};
use crate::stubs::grading::GradingApiStub;

const STUDENT: u64 = 21;

fn binary_task() -> Task {
    Task {
        id: 3,
        name: "Build a shared library".to_string(),
        gradable: true,
        test: Some(TaskTest {
            language: "c".to_string(),
            source: false,
        }),
        solutions: vec![],
    }
}

fn endpoints() -> SubmitEndpoints {
    SubmitEndpoints {
        gradable: Endpoint::post("/course/1/task/3/gradable-solution/"),
        non_gradable: Endpoint::post("/course/1/task/3/not-gradable-solution/"),
    }
}

fn accepted(status: SolutionStatus) -> Result<SubmitOutcome, ApiError> {
    Ok(SubmitOutcome::Accepted(Solution {
        id: 77,
        student: Some(STUDENT),
        status,
        ..Default::default()
    }))
}

fn binary_upload() -> SubmissionRequest {
    SubmissionRequest::File {
        file_name: "libsolution.so".to_string(),
        bytes: vec![0x7f, b'E', b'L', b'F'],
    }
}

#[tokio::test(start_paused = true)]
async fn test_binary_submission_graded_end_to_end() {
    let api = GradingApiStub::new(
        accepted(SolutionStatus::Pending),
        vec![
            SolutionStatus::Pending,
            SolutionStatus::Running,
            SolutionStatus::Failed,
        ],
        Duration::from_millis(300),
    )
    .with_test_output(serde_json::json!([
        {"test_status": "OK"},
        {"test_status": "OK"},
        {"test_status": "NOT_OK"}
    ]));

    let mut task = binary_task();
    let (mut controller, events) =
        SolutionLifecycleController::new(task.clone(), Arc::new(api), PollingConfig::default());

    let submitted = controller
        .submit(binary_upload(), endpoints().for_task(&task))
        .await
        .unwrap();
    assert_eq!(submitted.status, SolutionStatus::Pending);

    let resolved = controller.wait_until_resolved().await;
    assert_eq!(resolved.phase, Phase::Resolved);
    assert_eq!(resolved.surface, Surface::ResultDetail);
    assert_eq!(
        resolved.stop_reason,
        Some(StopReason::Terminal(SolutionStatus::Failed))
    );

    let graded = resolved.solution.unwrap();
    let summary = TestOutputSummary::from_solution(&graded).unwrap();
    assert_eq!(summary.to_string(), "2 out of 3 passed");

    task.solutions.push(Solution {
        student: Some(STUDENT),
        ..graded
    });
    assert!(!has_passing_solution(&task, Some(STUDENT)));

    drop(controller);
    let seen: Vec<LifecycleEvent> = events.collect().await;
    let statuses: Vec<SolutionStatus> = seen
        .iter()
        .filter_map(|event| match event {
            LifecycleEvent::SolutionUpdated(solution) => Some(solution.status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            SolutionStatus::Pending,
            SolutionStatus::Running,
            SolutionStatus::Failed
        ]
    );
    assert!(matches!(
        seen.last(),
        Some(LifecycleEvent::PollingStopped(StopReason::Terminal(
            SolutionStatus::Failed
        )))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_keeps_last_status() {
    let api = GradingApiStub::new(
        accepted(SolutionStatus::Pending),
        vec![SolutionStatus::Running],
        Duration::ZERO,
    );
    let polling = PollingConfig {
        interval_ms: 2000,
        max_attempts: 2,
    };

    let task = binary_task();
    let (mut controller, _events) =
        SolutionLifecycleController::new(task.clone(), Arc::new(api), polling);

    controller
        .submit(binary_upload(), endpoints().for_task(&task))
        .await
        .unwrap();
    let resolved = controller.wait_until_resolved().await;

    assert_eq!(
        resolved.stop_reason,
        Some(StopReason::Exhausted {
            attempts: 3,
            last_status: SolutionStatus::Running,
        })
    );
    assert_eq!(resolved.solution.unwrap().status, SolutionStatus::Running);
    assert!(matches!(
        controller.poll_handle().unwrap().state(),
        PollState::Stopped(_)
    ));

    controller.cancel_polling();
    assert!(matches!(
        controller.poll_handle().unwrap().state(),
        PollState::Stopped(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_can_be_retried() {
    let failing = GradingApiStub::new(
        Err(ApiError::Status {
            status: 503,
            body: "maintenance".to_string(),
        }),
        vec![],
        Duration::from_millis(50),
    );

    let task = binary_task();
    let (mut controller, _events) =
        SolutionLifecycleController::new(task.clone(), Arc::new(failing), PollingConfig::default());

    let err = controller
        .submit(binary_upload(), endpoints().for_task(&task))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Transport(ApiError::Status { status: 503, .. })
    ));
    assert_eq!(controller.snapshot().phase, Phase::Idle);
    assert!(controller.poll_handle().is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(controller.snapshot().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_configured_student_sees_passed_task() {
    let config: ClientConfig = serde_json::from_str(
        r#"{"base_url": "http://localhost", "student_id": 21, "polling": {"interval_ms": 500}}"#,
    )
    .unwrap();
    let api = GradingApiStub::new(
        accepted(SolutionStatus::Pending),
        vec![SolutionStatus::Passed],
        Duration::ZERO,
    );

    let mut task = binary_task();
    let (mut controller, _events) =
        SolutionLifecycleController::new(task.clone(), Arc::new(api), config.polling.clone());

    controller
        .submit(binary_upload(), endpoints().for_task(&task))
        .await
        .unwrap();
    let resolved = controller.wait_until_resolved().await;
    let graded = resolved.solution.unwrap();
    task.solutions.push(Solution {
        student: graded.student.or(config.student_id),
        ..graded
    });

    assert!(has_passing_solution(&task, config.student_id));
    assert!(!has_passing_solution(&task, Some(STUDENT + 1)));
}
