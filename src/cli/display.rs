//! Terminal output for a running loop.

use colored::*;

use wiggum::domain::{LoopEvent, event_types};
use wiggum::runner::LoopObserver;
use wiggum::status::StatusChange;
use wiggum::stream::{ToolEvent, format_tool_event};

/// Prints iteration progress and streamed tool activity
pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl LoopObserver for ConsoleObserver {
    fn on_event(&self, event: &LoopEvent) {
        if let Some(line) = describe_event(event, self.verbose) {
            println!("{}", line);
        }
    }

    fn on_tool_event(&self, event: &ToolEvent) {
        println!("{}", format_tool_event(event));
    }
}

/// One-line rendering of `event`, None when it is not shown
pub fn describe_event(event: &LoopEvent, verbose: bool) -> Option<String> {
    let iteration = event.iteration.unwrap_or(0);
    let payload = &event.payload;
    let line = match event.event_type.as_str() {
        event_types::RUN_STARTED => format!(
            "{} {} mode, up to {} iterations",
            "Starting".cyan().bold(),
            payload["mode"].as_str().unwrap_or("loop"),
            payload["max_iterations"]
        ),
        event_types::ITERATION_STARTED => format!(
            "{} {}/{}",
            "Iteration".cyan(),
            iteration,
            payload["max_iterations"]
        ),
        event_types::ITERATION_COMPLETE => {
            let remaining = payload["remaining"]
                .as_u64()
                .map(|n| format!(", {} remaining", n))
                .unwrap_or_default();
            let seconds = payload["duration_ms"].as_i64().unwrap_or(0) as f64 / 1000.0;
            format!("  {} in {:.1}s{}", "done".green(), seconds, remaining)
        }
        event_types::MILESTONE if verbose => format!("{} iteration {}", "Milestone:".magenta(), iteration),
        event_types::ERROR => format!(
            "  {} {}",
            "error:".red().bold(),
            payload["message"].as_str().unwrap_or("unknown error")
        ),
        _ => return None,
    };
    Some(line)
}

/// One-line rendering of a status file change
pub fn describe_status_change(change: &StatusChange) -> String {
    let current = &change.current;
    let progress = current
        .progress
        .map(|p| format!("{}/{}", p.completed, p.total))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "  {} {}{}",
        "status:".dimmed(),
        progress,
        current
            .summary
            .as_deref()
            .map(|s| format!(" {}", s))
            .unwrap_or_default()
    )
}
