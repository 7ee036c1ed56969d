//! # Scenarist Runtime
//!
//! Process-level wiring on top of scenarist-core:
//! - bootstrap from `scenarist.yaml` (handlers, engine settings, workspaces, tracing)
//! - runtime hooks fed by engine progress events
//! - the `Runtime` facade with workspace selection

mod bootstrap;
pub mod hooks;
mod runtime;

pub use bootstrap::{BootstrapError, DEFAULT_WORKSPACE_ID};
pub use hooks::{HookPoint, HookProgressReporter, HookRegistry, RuntimeHook, StepHookContext};
pub use runtime::{HandlerSummary, Runtime, RuntimeError};

pub use scenarist_core::prelude::*;
