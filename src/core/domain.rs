use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type TaskId = u64;
pub type SolutionId = u64;
pub type StudentId = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub gradable: bool,
    #[serde(default)]
    pub test: Option<TaskTest>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

impl Task {
    /// Which kind of submission this task accepts.
    pub fn submission_kind(&self) -> SubmissionKind {
        match (&self.test, self.gradable) {
            (_, false) => SubmissionKind::Url,
            (Some(test), true) if !test.source => SubmissionKind::File,
            _ => SubmissionKind::Code,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskTest {
    pub language: String,
    pub source: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SolutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Submitted,
    Missing,
    NonGradableSubmitted,
    Other(i64),
}

impl SolutionStatus {
    /// Polling stops once one of these is observed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SolutionStatus::Passed | SolutionStatus::Failed)
    }

    pub fn verbose(&self) -> &'static str {
        match self {
            SolutionStatus::Pending => "pending",
            SolutionStatus::Running => "running",
            SolutionStatus::Passed => "ok",
            SolutionStatus::Failed => "not_ok",
            SolutionStatus::Submitted => "submitted",
            SolutionStatus::Missing => "missing",
            SolutionStatus::NonGradableSubmitted => "submitted_without_grading",
            SolutionStatus::Other(_) => "unknown",
        }
    }
}

impl Default for SolutionStatus {
    fn default() -> Self {
        SolutionStatus::Pending
    }
}

impl From<i64> for SolutionStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => SolutionStatus::Pending,
            1 => SolutionStatus::Running,
            2 => SolutionStatus::Passed,
            3 => SolutionStatus::Failed,
            4 => SolutionStatus::Submitted,
            5 => SolutionStatus::Missing,
            6 => SolutionStatus::NonGradableSubmitted,
            other => SolutionStatus::Other(other),
        }
    }
}

impl From<SolutionStatus> for i64 {
    fn from(status: SolutionStatus) -> Self {
        match status {
            SolutionStatus::Pending => 0,
            SolutionStatus::Running => 1,
            SolutionStatus::Passed => 2,
            SolutionStatus::Failed => 3,
            SolutionStatus::Submitted => 4,
            SolutionStatus::Missing => 5,
            SolutionStatus::NonGradableSubmitted => 6,
            SolutionStatus::Other(code) => code,
        }
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verbose())
    }
}

/// Always replaced wholesale by the latest server response, never merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub id: SolutionId,
    #[serde(default, alias = "participant")]
    pub student: Option<StudentId>,
    #[serde(default)]
    pub task: Option<TaskId>,
    #[serde(default)]
    pub status: SolutionStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub test_output: Option<serde_json::Value>,
    #[serde(default)]
    pub return_code: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionKind {
    Code,
    File,
    Url,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionKind::Code => f.write_str("code"),
            SubmissionKind::File => f.write_str("file"),
            SubmissionKind::Url => f.write_str("url"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionRequest {
    Code { code: String },
    File { file_name: String, bytes: Vec<u8> },
    Url { url: String },
}

impl SubmissionRequest {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            SubmissionRequest::Code { .. } => SubmissionKind::Code,
            SubmissionRequest::File { .. } => SubmissionKind::File,
            SubmissionRequest::Url { .. } => SubmissionKind::Url,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    pub method: reqwest::Method,
    pub url: String,
}

impl Endpoint {
    pub fn post(url: &str) -> Self {
        Self {
            method: reqwest::Method::POST,
            url: url.to_string(),
        }
    }
}

/// Submission endpoints for one task; which one is used depends on
/// whether the task is gradable.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitEndpoints {
    pub gradable: Endpoint,
    pub non_gradable: Endpoint,
}

impl SubmitEndpoints {
    pub fn for_task(&self, task: &Task) -> &Endpoint {
        if task.gradable {
            &self.gradable
        } else {
            &self.non_gradable
        }
    }
}

/// Field name -> ordered messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub const NO_CODE: &'static str = "no code";

    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self(errors)
    }

    pub fn no_code() -> Self {
        Self::field("code", Self::NO_CODE)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first message for each field, which is what gets shown inline.
    pub fn first_messages(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|(field, messages)| {
                messages
                    .first()
                    .map(|message| (field.as_str(), message.as_str()))
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .first_messages()
            .into_iter()
            .map(|(field, message)| format!("{field} : {message}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Accepted(Solution),
    Rejected(ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(gradable: bool, source: Option<bool>) -> Task {
        Task {
            id: 1,
            name: "fizzbuzz".to_string(),
            gradable,
            test: source.map(|source| TaskTest {
                language: "python".to_string(),
                source,
            }),
            solutions: vec![],
        }
    }

    #[test]
    fn test_submission_kind_follows_task() {
        assert_eq!(task(true, Some(true)).submission_kind(), SubmissionKind::Code);
        assert_eq!(task(true, Some(false)).submission_kind(), SubmissionKind::File);
        assert_eq!(task(false, None).submission_kind(), SubmissionKind::Url);
        assert_eq!(task(false, Some(true)).submission_kind(), SubmissionKind::Url);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SolutionStatus::from(2), SolutionStatus::Passed);
        assert_eq!(SolutionStatus::from(3), SolutionStatus::Failed);
        assert_eq!(SolutionStatus::from(6), SolutionStatus::NonGradableSubmitted);
        assert_eq!(SolutionStatus::from(42), SolutionStatus::Other(42));
        assert_eq!(i64::from(SolutionStatus::Other(42)), 42);

        assert!(SolutionStatus::Passed.is_terminal());
        assert!(SolutionStatus::Failed.is_terminal());
        assert!(!SolutionStatus::NonGradableSubmitted.is_terminal());
        assert!(!SolutionStatus::Other(42).is_terminal());
    }

    #[test]
    fn test_solution_from_json() {
        let solution: Solution = serde_json::from_str(
            r#"{"id": 7, "participant": 3, "status": 1, "build_id": null, "test_output": null}"#,
        )
        .unwrap();

        assert_eq!(solution.id, 7);
        assert_eq!(solution.student, Some(3));
        assert_eq!(solution.status, SolutionStatus::Running);
        assert_eq!(solution.test_output, None);
    }

    #[test]
    fn test_validation_errors_first_messages() {
        let errors: ValidationErrors = serde_json::from_str(
            r#"{"url": ["Enter a valid URL.", "Too long."], "code": ["Required."]}"#,
        )
        .unwrap();

        assert_eq!(
            errors.first_messages(),
            vec![("code", "Required."), ("url", "Enter a valid URL.")]
        );
        assert_eq!(errors.messages("url").len(), 2);
        assert!(errors.messages("file").is_empty());
        assert_eq!(errors.to_string(), "code : Required.; url : Enter a valid URL.");
    }

    #[test]
    fn test_endpoint_selection() {
        let endpoints = SubmitEndpoints {
            gradable: Endpoint::post("/gradable/"),
            non_gradable: Endpoint::post("/non-gradable/"),
        };

        assert_eq!(endpoints.for_task(&task(true, Some(true))).url, "/gradable/");
        assert_eq!(endpoints.for_task(&task(false, None)).url, "/non-gradable/");
    }
}
