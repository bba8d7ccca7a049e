use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub status: String,
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectListResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
pub struct CreateProjectRequest {
    pub repo_url: String,
    pub branch: String,
    pub init_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionResponse {
    pub container_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
            RunState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunStartResponse {
    pub run_id: String,
    pub status: RunState,
    pub phase: String,
}

#[derive(Debug, Deserialize)]
pub struct RunStatusResponse {
    pub status: RunState,
    pub phase: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

// One record of a run's event feed. The producer is not schema-constrained
// across kinds, so every payload field is optional and `content` is free-form.
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub kind: String,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub content: Option<Value>,
    pub results: Option<Vec<Value>>,
    pub tool_calls: Option<Vec<Value>>,
    pub metadata: Option<Value>,
}

impl LogEvent {
    // Builds an event from one SSE frame: the frame's event name plus its
    // decoded JSON payload. Known fields are lifted out of an object payload;
    // whatever remains becomes `content` so per-kind data (usage counters,
    // completion status) stays reachable by the renderer.
    pub fn from_wire(event_name: &str, data: Value) -> Self {
        let mut event = LogEvent::default();
        match data {
            Value::Object(mut fields) => {
                event.kind = match fields.remove("kind") {
                    Some(Value::String(kind)) if !kind.is_empty() => kind,
                    Some(other) => {
                        fields.insert("kind".to_string(), other);
                        default_kind(event_name)
                    }
                    None => default_kind(event_name),
                };
                match fields.remove("timestamp") {
                    Some(Value::String(timestamp)) => event.timestamp = Some(timestamp),
                    Some(Value::Number(timestamp)) => event.timestamp = Some(timestamp.to_string()),
                    Some(other) => {
                        fields.insert("timestamp".to_string(), other);
                    }
                    None => {}
                }
                match fields.remove("message") {
                    Some(Value::String(message)) => event.message = Some(message),
                    Some(other) => {
                        fields.insert("message".to_string(), other);
                    }
                    None => {}
                }
                event.content = fields.remove("content");
                match fields.remove("results") {
                    Some(Value::Array(results)) => event.results = Some(results),
                    Some(other) => {
                        fields.insert("results".to_string(), other);
                    }
                    None => {}
                }
                match fields
                    .remove("tool_calls")
                    .or_else(|| fields.remove("toolCalls"))
                {
                    Some(Value::Array(calls)) => event.tool_calls = Some(calls),
                    Some(other) => {
                        fields.insert("tool_calls".to_string(), other);
                    }
                    None => {}
                }
                event.metadata = fields.remove("metadata");
                if event.content.is_none() && !fields.is_empty() {
                    event.content = Some(Value::Object(fields));
                }
            }
            Value::Null => event.kind = default_kind(event_name),
            other => {
                event.kind = default_kind(event_name);
                event.content = Some(other);
            }
        }
        event
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.kind)
    }
}

fn default_kind(event_name: &str) -> String {
    if event_name.is_empty() {
        "message".to_string()
    } else {
        event_name.to_string()
    }
}

// The feed's kind set is open-ended; anything unrecognized stays renderable
// through the Unknown arm. The alias lists are a fixed compatibility set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ModelContent,
    Thinking,
    ToolCalls,
    ToolResults,
    TokenUsage,
    ResponseMetadata,
    Status,
    Log,
    Message,
    Unknown,
}

impl EventKind {
    pub fn classify(kind: &str) -> Self {
        match kind {
            "ai_content" | "ai_message" => EventKind::ModelContent,
            "ai_thinking" | "thinking" => EventKind::Thinking,
            "tool_calls" | "tool_call" => EventKind::ToolCalls,
            "tools_execution" | "tool_results" | "tool_result" => EventKind::ToolResults,
            "token_usage" => EventKind::TokenUsage,
            "response_metadata" => EventKind::ResponseMetadata,
            "status" => EventKind::Status,
            "log" => EventKind::Log,
            "message" | "event" => EventKind::Message,
            _ => EventKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_wire_lifts_known_fields() {
        let event = LogEvent::from_wire(
            "log",
            json!({"timestamp": "2026-08-06T10:00:00", "message": "cloning repo"}),
        );
        assert_eq!(event.kind, "log");
        assert_eq!(event.timestamp.as_deref(), Some("2026-08-06T10:00:00"));
        assert_eq!(event.message.as_deref(), Some("cloning repo"));
        assert!(event.content.is_none());
    }

    #[test]
    fn from_wire_moves_leftover_fields_into_content() {
        let event = LogEvent::from_wire(
            "token_usage",
            json!({"input_tokens": 10, "output_tokens": 5, "total_tokens": 15}),
        );
        let content = event.content.expect("leftover fields become content");
        assert_eq!(content["input_tokens"], json!(10));
        assert_eq!(content["total_tokens"], json!(15));
    }

    #[test]
    fn from_wire_extracts_tool_calls() {
        let event = LogEvent::from_wire(
            "tool_calls",
            json!({"tool_calls": [{"name": "search", "args": {"q": "foo"}}]}),
        );
        let calls = event.tool_calls.expect("tool call list");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["name"], json!("search"));
    }

    #[test]
    fn from_wire_accepts_camel_case_tool_calls() {
        let event = LogEvent::from_wire("tool_calls", json!({"toolCalls": [{"name": "grep"}]}));
        assert_eq!(event.tool_calls.map(|calls| calls.len()), Some(1));
    }

    #[test]
    fn from_wire_prefers_embedded_kind() {
        let event = LogEvent::from_wire("message", json!({"kind": "status", "status": "success"}));
        assert_eq!(event.kind, "status");
        assert_eq!(event.kind(), EventKind::Status);
    }

    #[test]
    fn from_wire_wraps_non_object_payloads() {
        let event = LogEvent::from_wire("ai_content", json!("partial text"));
        assert_eq!(event.content, Some(json!("partial text")));

        let unnamed = LogEvent::from_wire("", json!(42));
        assert_eq!(unnamed.kind, "message");
    }

    #[test]
    fn classify_covers_the_compatibility_list() {
        assert_eq!(EventKind::classify("ai_content"), EventKind::ModelContent);
        assert_eq!(EventKind::classify("ai_thinking"), EventKind::Thinking);
        assert_eq!(EventKind::classify("tool_calls"), EventKind::ToolCalls);
        assert_eq!(EventKind::classify("tools_execution"), EventKind::ToolResults);
        assert_eq!(EventKind::classify("token_usage"), EventKind::TokenUsage);
        assert_eq!(
            EventKind::classify("response_metadata"),
            EventKind::ResponseMetadata
        );
        assert_eq!(EventKind::classify("status"), EventKind::Status);
        assert_eq!(EventKind::classify("log"), EventKind::Log);
        assert_eq!(EventKind::classify("something_new"), EventKind::Unknown);
    }

    #[test]
    fn run_state_tolerates_unknown_values() {
        let state: RunState = serde_json::from_value(json!("running")).unwrap();
        assert_eq!(state, RunState::Running);

        let state: RunState = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(state, RunState::Unknown);
        assert_eq!(state.label(), "unknown");
    }
}
