use crate::protocol::{
    AuthResponse, CreateProjectRequest, LogEvent, LoginRequest, Project, ProjectListResponse,
    ProvisionResponse, RegisterRequest, RunStartResponse, RunStatusResponse,
};
use futures::StreamExt;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("no auth token; pass --token or set RUNWAY_TOKEN (see `runway login`)")]
    MissingToken,
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: HttpClient,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            token,
            http: HttpClient::new(),
        }
    }

    fn token(&self) -> ApiResult<&str> {
        self.token.as_deref().ok_or(ApiError::MissingToken)
    }

    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/register", self.base_url))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/login", self.base_url))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        let response = self
            .http
            .get(format!("{}/api/v1/projects", self.base_url))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        let body: ProjectListResponse = decode(response).await?;
        Ok(body.projects)
    }

    pub async fn create_project(&self, request: &CreateProjectRequest) -> ApiResult<Project> {
        let response = self
            .http
            .post(format!("{}/api/v1/projects", self.base_url))
            .bearer_auth(self.token()?)
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn provision_project(&self, project_id: &str) -> ApiResult<ProvisionResponse> {
        let response = self
            .http
            .post(format!(
                "{}/api/v1/projects/{}/provision",
                self.base_url, project_id
            ))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn start_run(&self, project_id: &str) -> ApiResult<RunStartResponse> {
        let response = self
            .http
            .post(format!(
                "{}/api/v1/projects/{}/agent/run",
                self.base_url, project_id
            ))
            .bearer_auth(self.token()?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn run_status(&self, project_id: &str, run_id: &str) -> ApiResult<RunStatusResponse> {
        let response = self
            .http
            .get(format!(
                "{}/api/v1/projects/{}/agent/runs/{}",
                self.base_url, project_id, run_id
            ))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        decode(response).await
    }

    // The subscription primitive for one run's event feed. Events are handed
    // to `on_event` in server-emission order; `on_done` fires exactly once,
    // with the transport error's message or None on graceful close. The
    // returned handle cancels the feed; cancelling is idempotent.
    pub fn stream_run_events<F, FF, D, DF>(
        &self,
        project_id: &str,
        run_id: &str,
        mut on_event: F,
        on_done: D,
    ) -> StreamHandle
    where
        F: FnMut(LogEvent) -> FF + Send + 'static,
        FF: Future<Output = ()> + Send,
        D: FnOnce(Option<String>) -> DF + Send + 'static,
        DF: Future<Output = ()> + Send,
    {
        let url = format!(
            "{}/api/v1/projects/{}/agent/runs/{}/stream",
            self.base_url, project_id, run_id
        );
        let token = self.token.clone();
        let http = self.http.clone();
        let task = tokio::spawn(async move {
            debug!(%url, "opening run event stream");
            let result = run_stream(http, url, token, &mut on_event).await;
            match &result {
                Ok(()) => debug!("run event stream closed"),
                Err(err) => warn!(error = %err, "run event stream failed"),
            }
            on_done(result.err().map(|err| err.to_string())).await;
        });
        StreamHandle::new(task.abort_handle())
    }
}

pub struct StreamHandle {
    abort: AbortHandle,
}

impl StreamHandle {
    pub(crate) fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }
}

async fn run_stream<F, FF>(
    http: HttpClient,
    url: String,
    token: Option<String>,
    on_event: &mut F,
) -> ApiResult<()>
where
    F: FnMut(LogEvent) -> FF,
    FF: Future<Output = ()>,
{
    let mut request = http.get(&url);
    if let Some(token) = &token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = String::from_utf8_lossy(&chunk);
        if chunk.contains('\r') {
            buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            buffer.push_str(&chunk);
        }

        while let Some(idx) = buffer.find("\n\n") {
            let frame = buffer[..idx].to_string();
            buffer = buffer[idx + 2..].to_string();
            if let Some(event) = parse_sse_frame(&frame) {
                on_event(event).await;
            }
        }
    }

    Ok(())
}

// One SSE frame: `event:`/`data:` lines up to a blank line. Multiple data
// lines join with newlines; comment lines (keep-alives) are skipped.
fn parse_sse_frame(raw: &str) -> Option<LogEvent> {
    let mut event_name: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(name) = line.strip_prefix("event:") {
            event_name = Some(name.trim_start().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(decode_event(
        event_name.as_deref().unwrap_or_default(),
        &data_lines.join("\n"),
    ))
}

fn decode_event(event_name: &str, payload: &str) -> LogEvent {
    match serde_json::from_str::<Value>(payload) {
        Ok(data) => LogEvent::from_wire(event_name, data),
        // Non-JSON data degrades to a plain log line carrying the raw text.
        Err(_) => LogEvent {
            kind: if event_name.is_empty() {
                "log".to_string()
            } else {
                event_name.to_string()
            },
            message: Some(payload.to_string()),
            ..LogEvent::default()
        },
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(response.json().await?)
}
