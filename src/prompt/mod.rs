//! Prompt System - per-mode templates rendered with Handlebars

mod render;
mod strategy;

pub use render::PromptRenderer;
pub use strategy::{ExecutionStrategy, IterationPrompt, PromptContext};
