//! Stream event parsing for the agent's structured output mode
//!
//! This module provides:
//! - StreamItem: tagged union over one line's content items
//! - ToolEvent: the transient tool-use / tool-result / text event
//! - Utf8Carry: chunked decoding that never splits a character
//! - StreamParser: fault-tolerant, line-buffered parser with a line length cap
//! - format_tool_event: terminal rendering

pub mod decode;
pub mod event;
pub mod format;
pub mod parser;

pub use decode::Utf8Carry;
pub use event::{RESULT_PREVIEW_LINES, StreamItem, ToolEvent, ToolEventKind, ToolPayload};
pub use format::format_tool_event;
pub use parser::{MAX_LINE_BYTES, StreamHandler, StreamParser, attach, extract_final_result, parse_line};
