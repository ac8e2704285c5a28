//! Per-mode prompt strategies.
//!
//! Each iteration starts the agent with no memory of the last one, so the
//! system prompt restates the task and exactly how to report status.

use serde::Serialize;

use super::render::PromptRenderer;
use crate::domain::WorkMode;
use crate::error::Result;

const SYSTEM_TEMPLATE: &str = "system";
const PROMPT_TEMPLATE: &str = "prompt";

const LOOP_SYSTEM: &str = r#"You are working through a task list one item at a time. You have no memory of earlier iterations; the files are the only state.

Task: {{task}}

Task list: {{task_list_path}}
Status file: {{status_path}}

Rules:
- Pick the first unchecked item in the task list and complete exactly that item.
- If the task list has no real items yet, replace it with a concrete checklist for the task first.
- Check the item off in the task list once it is done.
- Before you stop, overwrite the status file with JSON of this shape:
  {"complete": <true only when every item is checked>, "progress": {"completed": <checked items>, "total": <all items>}, "summary": "<one line>", "lastUpdated": "<ISO 8601 time>"}
- Completion is read from the status file only. Saying you are done does nothing.
"#;

const LOOP_PROMPT: &str = "Iteration {{iteration}} of {{max_iterations}}.{{#if remaining}} {{remaining}} items remain.{{/if}} Complete the next unchecked item in {{task_list_path}}, then update {{status_path}}.";

const ITERATIVE_SYSTEM: &str = r#"You are working autonomously on a task. You have no memory of earlier iterations; the files are the only state.

Task: {{task}}

Notes and checklist: {{task_list_path}}
Status file: {{status_path}}

Rules:
- Look at the current state of the work, then make as much real progress as you can.
- Keep the checklist current: add items as you find work and check them off when done.
- Before you stop, overwrite the status file with JSON of this shape:
  {"complete": <true when the whole task is done>, "worked": <true if you changed anything this iteration>, "summary": "<one line>", "lastUpdated": "<ISO 8601 time>"}
- If there is nothing left worth doing, set "worked" to false.
- Completion is read from the status file only. Saying you are done does nothing.
"#;

const ITERATIVE_PROMPT: &str =
    "Iteration {{iteration}} of {{max_iterations}}. Continue the task, then update {{status_path}}.";

/// Values available to the templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub task: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status_path: String,
    pub task_list_path: String,
    pub remaining: Option<u32>,
}

/// Rendered prompt pair for one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPrompt {
    pub prompt: String,
    pub system_prompt: String,
}

/// Builds prompts for one workspace mode
pub struct ExecutionStrategy {
    mode: WorkMode,
    renderer: PromptRenderer,
}

impl ExecutionStrategy {
    pub fn for_mode(mode: WorkMode) -> Result<Self> {
        let (system, prompt) = match mode {
            WorkMode::Loop => (LOOP_SYSTEM, LOOP_PROMPT),
            WorkMode::Iterative => (ITERATIVE_SYSTEM, ITERATIVE_PROMPT),
        };

        let mut renderer = PromptRenderer::new();
        renderer.register_template(SYSTEM_TEMPLATE, system)?;
        renderer.register_template(PROMPT_TEMPLATE, prompt)?;
        Ok(Self { mode, renderer })
    }

    pub fn mode(&self) -> WorkMode {
        self.mode
    }

    /// Replace the system prompt template
    pub fn with_system_template(mut self, template: &str) -> Result<Self> {
        self.renderer.register_template(SYSTEM_TEMPLATE, template)?;
        Ok(self)
    }

    pub fn build(&self, context: &PromptContext) -> Result<IterationPrompt> {
        Ok(IterationPrompt {
            prompt: self.renderer.render_named(PROMPT_TEMPLATE, context)?,
            system_prompt: self.renderer.render_named(SYSTEM_TEMPLATE, context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PromptContext {
        PromptContext {
            task: "Add retries to the HTTP client".to_string(),
            iteration: 3,
            max_iterations: 20,
            status_path: ".wiggum/status.json".to_string(),
            task_list_path: ".wiggum/TODO.md".to_string(),
            remaining: Some(4),
        }
    }

    #[test]
    fn test_loop_strategy() {
        let strategy = ExecutionStrategy::for_mode(WorkMode::Loop).unwrap();
        let built = strategy.build(&context()).unwrap();

        assert_eq!(strategy.mode(), WorkMode::Loop);
        assert!(built.prompt.starts_with("Iteration 3 of 20. 4 items remain."));
        assert!(built.system_prompt.contains("Add retries to the HTTP client"));
        assert!(built.system_prompt.contains(r#""progress": {"completed""#));
        assert!(!built.system_prompt.contains("\"worked\""));
    }

    #[test]
    fn test_iterative_strategy() {
        let strategy = ExecutionStrategy::for_mode(WorkMode::Iterative).unwrap();
        let built = strategy.build(&context()).unwrap();

        assert!(built.prompt.contains("Iteration 3 of 20"));
        assert!(built.system_prompt.contains("\"worked\""));
        assert!(built.system_prompt.contains(".wiggum/status.json"));
    }

    #[test]
    fn test_unknown_remaining_omitted() {
        let strategy = ExecutionStrategy::for_mode(WorkMode::Loop).unwrap();
        let mut ctx = context();
        ctx.remaining = None;
        let built = strategy.build(&ctx).unwrap();
        assert!(!built.prompt.contains("remain"));
    }

    #[test]
    fn test_custom_system_template() {
        let strategy = ExecutionStrategy::for_mode(WorkMode::Loop)
            .unwrap()
            .with_system_template("Only: {{task}}")
            .unwrap();
        let built = strategy.build(&context()).unwrap();
        assert_eq!(built.system_prompt, "Only: Add retries to the HTTP client");
    }
}
