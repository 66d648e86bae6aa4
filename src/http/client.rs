use reqwest::{Client, RequestBuilder, header, multipart};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    config::ClientConfig,
    core::{
        domain::{
            Endpoint, Solution, SolutionId, SubmissionRequest, SubmitOutcome, ValidationErrors,
        },
        errors::ApiError,
        traits::grading::GradingApi,
    },
};

pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

fn default_headers() -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    [
        (header::ACCEPT, header::HeaderValue::from_static("application/json")),
        (
            header::HeaderName::from_static("x-requested-with"),
            header::HeaderValue::from_static("XMLHttpRequest"),
        ),
    ]
    .into_iter()
    .for_each(|(name, value)| {
        headers.insert(name, value);
    });
    headers
}

#[derive(Debug, Clone)]
pub struct HttpGradingApi {
    client: Client,
    config: ClientConfig,
}

impl HttpGradingApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(default_headers())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn get_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.into();
        }

        let mut res = self.config.base_url.clone();
        if !res.ends_with('/') {
            res.push('/');
        }
        res.push_str(url.trim_start_matches('/'));
        res
    }

    fn submit_request(&self, endpoint: &Endpoint, request: &SubmissionRequest) -> RequestBuilder {
        let mut builder = self
            .client
            .request(endpoint.method.clone(), self.get_url(&endpoint.url));
        let token = self.config.csrf_token.as_deref();
        if let Some(token) = token {
            builder = builder.header(CSRF_HEADER, token);
        }

        match request {
            SubmissionRequest::Code { code } => builder.form(&form_fields("code", code, token)),
            SubmissionRequest::Url { url } => builder.form(&form_fields("url", url, token)),
            SubmissionRequest::File { file_name, bytes } => {
                let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                let mut form = multipart::Form::new().part("file", part);
                if let Some(token) = token {
                    form = form.text(CSRF_FIELD, token.to_string());
                }
                builder.multipart(form)
            }
        }
    }
}

fn form_fields<'a>(
    field: &'a str,
    value: &'a str,
    token: Option<&'a str>,
) -> Vec<(&'a str, &'a str)> {
    let mut fields = vec![(field, value)];
    if let Some(token) = token {
        fields.push((CSRF_FIELD, token));
    }
    fields
}

/// Interprets a submission response body.
///
/// A non-null `errors` object, or a bare field -> messages map on a 400, is
/// a validation failure. Any other non-2xx status is an error.
pub fn parse_submit_response(status: u16, body: &str) -> Result<SubmitOutcome, ApiError> {
    let success = (200..300).contains(&status);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) if success => return Err(e.into()),
        Err(_) => {
            return Err(ApiError::Status {
                status,
                body: body.to_string(),
            });
        }
    };

    if success || status == 400 {
        if let Some(errors) = value.get("errors").filter(|errors| !errors.is_null()) {
            let errors = ValidationErrors::deserialize(errors)?;
            return Ok(SubmitOutcome::Rejected(errors));
        }
    }

    if status == 400 {
        if let Ok(errors) = ValidationErrors::deserialize(&value) {
            return Ok(SubmitOutcome::Rejected(errors));
        }
    }

    if !success {
        return Err(ApiError::Status {
            status,
            body: body.to_string(),
        });
    }

    Ok(SubmitOutcome::Accepted(serde_json::from_value(value)?))
}

#[async_trait::async_trait]
impl GradingApi for HttpGradingApi {
    #[tracing::instrument(skip(self, request))]
    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        let response = self.submit_request(endpoint, request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!("Submission response: status={}, body={:?}", status, body);

        parse_submit_response(status, &body)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_solution(&self, solution_id: SolutionId) -> Result<Solution, ApiError> {
        let url = self.get_url(&self.config.solution_url(solution_id));
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<Solution>().await?)
    }
}
