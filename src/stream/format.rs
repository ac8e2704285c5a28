//! Terminal rendering of tool events.

use colored::*;

use super::event::{ToolEvent, ToolEventKind};

/// Render a tool event for display in the terminal.
pub fn format_tool_event(event: &ToolEvent) -> String {
    let name = event.tool_name.as_deref().unwrap_or("tool");

    match event.kind {
        ToolEventKind::ToolUse => match event.payload.primary() {
            Some(detail) => format!("{} {} {}", "▶".cyan(), name.bold(), detail.dimmed()),
            None => format!("{} {}", "▶".cyan(), name.bold()),
        },
        ToolEventKind::ToolResult if event.is_error => {
            let mut out = format!("{} {} failed", "✗".red(), name.bold());
            if let Some(content) = event.content.as_deref().filter(|c| !c.is_empty()) {
                out.push('\n');
                out.push_str(&indent(content));
            }
            out
        }
        ToolEventKind::ToolResult => {
            let mut out = format!("{} {}", "✓".green(), name.bold());
            if let Some(content) = event.content.as_deref().filter(|c| !c.is_empty()) {
                out.push('\n');
                out.push_str(&indent(content).dimmed().to_string());
            }
            if event.omitted_lines > 0 {
                out.push_str(&format!("\n    … {} more lines", event.omitted_lines).dimmed().to_string());
            }
            out
        }
        ToolEventKind::Text => event.content.clone().unwrap_or_default(),
    }
}

fn indent(content: &str) -> String {
    content
        .lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_tool_use_shows_detail() {
        let event = ToolEvent::tool_use("Edit", None, &json!({"file_path": "src/main.rs"}));
        let out = format_tool_event(&event);
        assert!(out.contains("Edit"));
        assert!(out.contains("src/main.rs"));
    }

    #[test]
    fn test_format_error_result_keeps_full_text() {
        let body: Vec<String> = (1..=30).map(|i| format!("err {}", i)).collect();
        let event = ToolEvent::tool_result(Some("Bash".into()), None, &body.join("\n"), true);
        let out = format_tool_event(&event);
        assert!(out.contains("failed"));
        assert!(out.contains("err 30"));
    }

    #[test]
    fn test_format_truncated_result_mentions_omitted() {
        let body: Vec<String> = (1..=20).map(|i| format!("row {}", i)).collect();
        let event = ToolEvent::tool_result(Some("Read".into()), None, &body.join("\n"), false);
        let out = format_tool_event(&event);
        assert!(out.contains("row 15"));
        assert!(!out.contains("row 16"));
        assert!(out.contains("5 more lines"));
    }

    #[test]
    fn test_format_text() {
        let out = format_tool_event(&ToolEvent::text("thinking out loud"));
        assert_eq!(out, "thinking out loud");
    }
}
