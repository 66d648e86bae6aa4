use std::panic;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use solution_lifecycle::{
    ClientConfig, HttpGradingApi, LifecycleEvent, SolutionLifecycleController,
    core::{
        domain::{Endpoint, Solution, SubmissionKind, SubmissionRequest, Task},
        progress::{TestOutputSummary, has_passing_solution},
    },
};

const USAGE: &str = concat!(
    "usage: solution-lifecycle <config.json> <task.json> <submit-url> ",
    "<code-file | binary-file | solution-url>"
);

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, task_path, submit_url, payload] = args.as_slice() else {
        return Err(USAGE.into());
    };

    let config = ClientConfig::from_json_file(config_path).await?;
    let task: Task = serde_json::from_slice(&tokio::fs::read(task_path).await?)?;
    let request = build_request(&task, payload).await?;

    let api = Arc::new(HttpGradingApi::new(config.clone())?);
    let (mut controller, mut events) =
        SolutionLifecycleController::new(task.clone(), api, config.polling.clone());

    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                LifecycleEvent::SolutionUpdated(solution) => {
                    tracing::info!("solution {} is {}", solution.id, solution.status)
                }
                other => tracing::debug!("{:?}", other),
            }
        }
    });

    let solution = controller
        .submit(request, &Endpoint::post(submit_url))
        .await?;
    tracing::info!("submitted solution {}", solution.id);

    let resolved = controller.wait_until_resolved().await;
    if let Some(solution) = resolved.solution {
        println!("status: {}", solution.status);
        if let Some(summary) = TestOutputSummary::from_solution(&solution) {
            println!("{}", summary);
        }

        let mut task = task;
        task.solutions.push(Solution {
            student: solution.student.or(config.student_id),
            ..solution
        });
        let solved = has_passing_solution(&task, config.student_id);
        println!("task solved: {}", if solved { "yes" } else { "no" });
    }

    Ok(())
}

async fn build_request(task: &Task, payload: &str) -> std::io::Result<SubmissionRequest> {
    Ok(match task.submission_kind() {
        SubmissionKind::Code => SubmissionRequest::Code {
            code: tokio::fs::read_to_string(payload).await?,
        },
        SubmissionKind::File => {
            let path = PathBuf::from(payload);
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| payload.to_string());
            SubmissionRequest::File {
                file_name,
                bytes: tokio::fs::read(&path).await?,
            }
        }
        SubmissionKind::Url => SubmissionRequest::Url {
            url: payload.to_string(),
        },
    })
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
