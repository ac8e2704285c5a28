//! Typed items and tool events parsed from the agent's stream-json output.

use serde::Serialize;
use serde_json::Value;

/// Number of lines kept from a successful tool result.
pub const RESULT_PREVIEW_LINES: usize = 15;

/// One classified content item from a single stream-json line.
///
/// Each line is an object with a `type` discriminant; assistant and user
/// messages may carry several content items, so a line yields a list of these.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Assistant requested a tool invocation
    ToolUse {
        id: Option<String>,
        name: String,
        input: Value,
    },
    /// A tool returned (delivered to the agent as a user message)
    ToolResult {
        tool_use_id: Option<String>,
        content: String,
        is_error: bool,
    },
    /// Plain assistant text
    Text(String),
    /// Terminal `result` object carrying the agent's final answer
    FinalResult { result: String, is_error: bool },
    /// Any other discriminant (system, init, ...)
    Unknown(String),
}

/// Kind of a tool event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    ToolUse,
    ToolResult,
    Text,
}

/// Key parameters of a tool invocation, as applicable to the tool kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Directory a search tool runs in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolPayload {
    /// Pull the well-known parameters out of a tool input object
    pub fn from_input(input: &Value) -> Self {
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| input.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };

        Self {
            file_path: field(&["file_path", "notebook_path"]),
            command: field(&["command"]),
            pattern: field(&["pattern", "query"]),
            path: field(&["path"]),
            url: field(&["url"]),
            description: field(&["description"]),
        }
    }

    /// The single most descriptive parameter, used for one-line display.
    ///
    /// Search tools show their pattern; the directory is only a fallback.
    pub fn primary(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .or(self.command.as_deref())
            .or(self.pattern.as_deref())
            .or(self.url.as_deref())
            .or(self.path.as_deref())
            .or(self.description.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}

/// A tool invocation, tool result or text event produced during one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolEvent {
    pub kind: ToolEventKind,
    pub tool_name: Option<String>,
    pub tool_use_id: Option<String>,
    pub payload: ToolPayload,
    pub is_error: bool,
    /// Text content or result preview
    pub content: Option<String>,
    /// Lines dropped from a truncated result preview
    pub omitted_lines: usize,
}

impl ToolEvent {
    /// Create a tool invocation event
    pub fn tool_use(name: impl Into<String>, id: Option<String>, input: &Value) -> Self {
        Self {
            kind: ToolEventKind::ToolUse,
            tool_name: Some(name.into()),
            tool_use_id: id,
            payload: ToolPayload::from_input(input),
            is_error: false,
            content: None,
            omitted_lines: 0,
        }
    }

    /// Create a tool result event; successful output is truncated, errors never are
    pub fn tool_result(tool_name: Option<String>, tool_use_id: Option<String>, content: &str, is_error: bool) -> Self {
        let (content, omitted_lines) = if is_error {
            (content.to_string(), 0)
        } else {
            preview(content, RESULT_PREVIEW_LINES)
        };

        Self {
            kind: ToolEventKind::ToolResult,
            tool_name,
            tool_use_id,
            payload: ToolPayload::default(),
            is_error,
            content: Some(content),
            omitted_lines,
        }
    }

    /// Create a plain text event
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ToolEventKind::Text,
            tool_name: None,
            tool_use_id: None,
            payload: ToolPayload::default(),
            is_error: false,
            content: Some(text.into()),
            omitted_lines: 0,
        }
    }
}

/// Keep the first `max_lines` lines of `content`, returning how many were dropped.
pub fn preview(content: &str, max_lines: usize) -> (String, usize) {
    let total = content.lines().count();
    if total <= max_lines {
        return (content.to_string(), 0);
    }
    let kept: Vec<&str> = content.lines().take(max_lines).collect();
    (kept.join("\n"), total - max_lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_from_read_input() {
        let payload = ToolPayload::from_input(&json!({"file_path": "src/main.rs", "limit": 20}));
        assert_eq!(payload.file_path.as_deref(), Some("src/main.rs"));
        assert_eq!(payload.primary(), Some("src/main.rs"));
    }

    #[test]
    fn test_payload_from_bash_input() {
        let payload = ToolPayload::from_input(&json!({"command": "cargo test", "description": "Run tests"}));
        assert_eq!(payload.command.as_deref(), Some("cargo test"));
        assert_eq!(payload.description.as_deref(), Some("Run tests"));
        assert_eq!(payload.primary(), Some("cargo test"));
    }

    #[test]
    fn test_payload_from_grep_input() {
        let payload = ToolPayload::from_input(&json!({"pattern": "fn main", "path": "src"}));
        assert_eq!(payload.pattern.as_deref(), Some("fn main"));
        assert_eq!(payload.path.as_deref(), Some("src"));
        assert_eq!(payload.file_path, None);
        assert_eq!(payload.primary(), Some("fn main"));
    }

    #[test]
    fn test_payload_glob_shows_pattern() {
        let event = ToolEvent::tool_use("Glob", None, &json!({"pattern": "**/*.rs", "path": "/repo"}));
        assert_eq!(event.payload.primary(), Some("**/*.rs"));

        let listing = ToolPayload::from_input(&json!({"path": "/repo/src"}));
        assert_eq!(listing.primary(), Some("/repo/src"));
    }

    #[test]
    fn test_payload_empty() {
        assert!(ToolPayload::from_input(&json!({"todos": []})).is_empty());
        assert!(ToolPayload::from_input(&Value::Null).is_empty());
    }

    #[test]
    fn test_preview_short_content_untouched() {
        let (text, omitted) = preview("a\nb\nc", 15);
        assert_eq!(text, "a\nb\nc");
        assert_eq!(omitted, 0);
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let content: Vec<String> = (1..=40).map(|i| format!("line {}", i)).collect();
        let (text, omitted) = preview(&content.join("\n"), 15);
        assert_eq!(text.lines().count(), 15);
        assert!(text.ends_with("line 15"));
        assert_eq!(omitted, 25);
    }

    #[test]
    fn test_error_result_never_truncated() {
        let content: Vec<String> = (1..=40).map(|i| format!("error {}", i)).collect();
        let event = ToolEvent::tool_result(Some("Bash".into()), None, &content.join("\n"), true);
        assert!(event.is_error);
        assert_eq!(event.omitted_lines, 0);
        assert_eq!(event.content.unwrap().lines().count(), 40);
    }

    #[test]
    fn test_success_result_truncated() {
        let content: Vec<String> = (1..=30).map(|i| format!("ok {}", i)).collect();
        let event = ToolEvent::tool_result(Some("Read".into()), None, &content.join("\n"), false);
        assert_eq!(event.omitted_lines, 15);
        assert_eq!(event.content.unwrap().lines().count(), RESULT_PREVIEW_LINES);
    }

    #[test]
    fn test_event_serializes_kind_snake_case() {
        let event = ToolEvent::text("hello");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "text");
    }
}
