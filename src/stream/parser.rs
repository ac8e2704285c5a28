//! Line-oriented parser for the agent's stream-json output.
//!
//! Each line is parsed on its own. A malformed line is reported to the
//! handler and skipped; it never aborts the stream.

use std::collections::HashMap;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use super::decode::Utf8Carry;
use super::event::{StreamItem, ToolEvent};

/// Longest line the parser buffers; anything longer is reported and dropped
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Receives parsed events from a [`StreamParser`].
pub trait StreamHandler {
    /// A tool invocation, tool result or text event was parsed
    fn on_tool_event(&mut self, event: ToolEvent);

    /// A line could not be parsed as JSON
    fn on_error(&mut self, line: &str);
}

/// Parse one line of stream-json output into its content items.
///
/// Returns `Err` if the line is not valid JSON. Callers treat that as a
/// recoverable condition and continue with the next line.
pub fn parse_line(line: &str) -> std::result::Result<Vec<StreamItem>, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    Ok(classify(&value))
}

/// Extract the final answer from a terminal `result` object.
pub fn extract_final_result(value: &Value) -> Option<String> {
    if value.get("type").and_then(Value::as_str) != Some("result") {
        return None;
    }
    value.get("result").and_then(Value::as_str).map(str::to_string)
}

fn classify(value: &Value) -> Vec<StreamItem> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");

    match kind {
        "assistant" => content_items(value)
            .iter()
            .filter_map(|item| match item.get("type").and_then(Value::as_str) {
                Some("tool_use") => Some(StreamItem::ToolUse {
                    id: item.get("id").and_then(Value::as_str).map(str::to_string),
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    input: item.get("input").cloned().unwrap_or(Value::Null),
                }),
                Some("text") => item
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| StreamItem::Text(text.to_string())),
                _ => None,
            })
            .collect(),
        "user" => content_items(value)
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("tool_result"))
            .map(|item| StreamItem::ToolResult {
                tool_use_id: item.get("tool_use_id").and_then(Value::as_str).map(str::to_string),
                content: result_text(item.get("content")),
                is_error: item.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect(),
        "result" => match extract_final_result(value) {
            Some(result) => vec![StreamItem::FinalResult {
                result,
                is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            }],
            None => Vec::new(),
        },
        other => vec![StreamItem::Unknown(other.to_string())],
    }
}

fn content_items(value: &Value) -> &[Value] {
    value
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Tool result content is either a string or a list of text blocks.
fn result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Incremental parser state for one agent run.
///
/// Buffers partial lines across chunk boundaries, remembers tool names by
/// `tool_use_id` so results can be labelled, and keeps the last final result.
/// A line longer than [`MAX_LINE_BYTES`] is reported once and skipped.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: String,
    discarding: bool,
    tool_names: HashMap<String, String>,
    final_result: Option<String>,
    malformed_lines: usize,
}

impl StreamParser {
    /// Create a new stream parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk of output; complete lines are parsed immediately.
    pub fn feed(&mut self, chunk: &str, handler: &mut dyn StreamHandler) {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.find('\n') {
                Some(pos) => {
                    chunk = &chunk[pos + 1..];
                    self.discarding = false;
                }
                None => return,
            }
        }

        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if line.len() > MAX_LINE_BYTES {
                self.report_overlong(line.len(), handler);
            } else {
                self.process_line(&line, handler);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            self.report_overlong(self.buffer.len(), handler);
            self.buffer = String::new();
            self.discarding = true;
        }
    }

    /// Flush a trailing line that had no terminating newline.
    pub fn finish(&mut self, handler: &mut dyn StreamHandler) {
        self.discarding = false;
        let rest = std::mem::take(&mut self.buffer);
        self.process_line(&rest, handler);
    }

    fn report_overlong(&mut self, seen: usize, handler: &mut dyn StreamHandler) {
        self.malformed_lines += 1;
        log::warn!("Dropping stream line of {}+ bytes", seen);
        handler.on_error(&format!("stream line exceeded {} bytes and was dropped", MAX_LINE_BYTES));
    }

    /// Parse a single complete line.
    pub fn process_line(&mut self, line: &str, handler: &mut dyn StreamHandler) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        match parse_line(trimmed) {
            Ok(items) => {
                for item in items {
                    self.dispatch(item, handler);
                }
            }
            Err(e) => {
                self.malformed_lines += 1;
                log::debug!("Skipping malformed stream line: {}", e);
                handler.on_error(trimmed);
            }
        }
    }

    fn dispatch(&mut self, item: StreamItem, handler: &mut dyn StreamHandler) {
        match item {
            StreamItem::ToolUse { id, name, input } => {
                if let Some(id) = &id {
                    self.tool_names.insert(id.clone(), name.clone());
                }
                handler.on_tool_event(ToolEvent::tool_use(name, id, &input));
            }
            StreamItem::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let name = tool_use_id
                    .as_ref()
                    .and_then(|id| self.tool_names.get(id))
                    .cloned();
                handler.on_tool_event(ToolEvent::tool_result(name, tool_use_id, &content, is_error));
            }
            StreamItem::Text(text) => handler.on_tool_event(ToolEvent::text(text)),
            StreamItem::FinalResult { result, is_error } => {
                if is_error {
                    log::warn!("Agent reported an error result");
                }
                self.final_result = Some(result);
            }
            StreamItem::Unknown(kind) => {
                log::trace!("Ignoring stream event type '{}'", kind);
            }
        }
    }

    /// The last final result seen so far
    pub fn final_result(&self) -> Option<&str> {
        self.final_result.as_deref()
    }

    /// Take the last final result, leaving `None`
    pub fn take_final_result(&mut self) -> Option<String> {
        self.final_result.take()
    }

    /// Number of lines that failed to parse
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }
}

/// Drive a fresh parser over `reader` until EOF.
///
/// Chunks go through the same buffered `feed` path the process client uses,
/// so the line cap and split-character handling apply. Returns the parser so
/// the caller can recover the final result.
pub async fn attach<R>(mut reader: R, handler: &mut dyn StreamHandler) -> std::io::Result<StreamParser>
where
    R: AsyncRead + Unpin,
{
    let mut parser = StreamParser::new();
    let mut text = Utf8Carry::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        parser.feed(&text.decode(&chunk[..n]), handler);
    }
    parser.feed(&text.finish(), handler);
    parser.finish(handler);

    Ok(parser)
}
