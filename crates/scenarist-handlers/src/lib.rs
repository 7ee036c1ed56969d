//! # Scenarist Handlers
//!
//! Built-in step handlers for Scenarist.
//!
//! This crate provides:
//! - echo, template, set_value, user_input and llm_prompt handlers
//! - A factory building handlers from `HandlerSpec` config entries

mod builtin;
mod factory;

// Re-export the handler contract
pub use scenarist_core::handler::{
    HandlerMeta, StepContext, StepHandler, StepInput, StepResult,
};

pub use builtin::*;
pub use factory::{register_handlers, DefaultHandlerFactory, HandlerBuildError, HandlerFactory};
