use serde_json::Value;

use crate::core::domain::{Solution, SolutionId, SolutionStatus, StudentId, Task};

const PASSING_TEST_STATUS: &str = "OK";

/// Non-gradable tasks count any accepted URL submission, whoever made it.
pub fn is_passing_solution(solution: &Solution, task: &Task, student: Option<StudentId>) -> bool {
    let own_and_passed = student.is_some()
        && solution.student == student
        && solution.status == SolutionStatus::Passed
        && task.gradable;
    let submitted_url =
        !task.gradable && solution.status == SolutionStatus::NonGradableSubmitted;

    own_and_passed || submitted_url
}

pub fn has_passing_solution(task: &Task, student: Option<StudentId>) -> bool {
    task.solutions
        .iter()
        .any(|solution| is_passing_solution(solution, task, student))
}

pub fn count_passed_tasks(tasks: &[Task], student: Option<StudentId>) -> usize {
    tasks
        .iter()
        .filter(|task| has_passing_solution(task, student))
        .count()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolvedRatio {
    pub passed: usize,
    pub total: usize,
}

impl std::fmt::Display for SolvedRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.passed, self.total)
    }
}

pub fn solved_ratio(tasks: &[Task], student: Option<StudentId>) -> SolvedRatio {
    SolvedRatio {
        passed: count_passed_tasks(tasks, student),
        total: tasks.len(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestOutputSummary {
    /// Per-test verdicts from a binary test run, in run order.
    Binary {
        solution_id: SolutionId,
        verdicts: Vec<bool>,
    },
    Source(String),
}

impl TestOutputSummary {
    pub fn from_solution(solution: &Solution) -> Option<Self> {
        match solution.test_output.as_ref()? {
            Value::Array(items) => Some(TestOutputSummary::Binary {
                solution_id: solution.id,
                verdicts: items
                    .iter()
                    .map(|item| {
                        item.get("test_status").and_then(Value::as_str)
                            == Some(PASSING_TEST_STATUS)
                    })
                    .collect(),
            }),
            Value::Object(fields) => fields
                .get("test_output")
                .map(|output| TestOutputSummary::Source(text_of(output))),
            Value::String(text) => Some(TestOutputSummary::Source(text.clone())),
            _ => None,
        }
    }

    pub fn passing_count(&self) -> Option<usize> {
        match self {
            TestOutputSummary::Binary { verdicts, .. } => {
                Some(verdicts.iter().filter(|passed| **passed).count())
            }
            TestOutputSummary::Source(_) => None,
        }
    }

    pub fn test_count(&self) -> Option<usize> {
        match self {
            TestOutputSummary::Binary { verdicts, .. } => Some(verdicts.len()),
            TestOutputSummary::Source(_) => None,
        }
    }
}

impl std::fmt::Display for TestOutputSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestOutputSummary::Binary { verdicts, .. } => write!(
                f,
                "{} out of {} passed",
                verdicts.iter().filter(|passed| **passed).count(),
                verdicts.len()
            ),
            TestOutputSummary::Source(text) => f.write_str(text),
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
