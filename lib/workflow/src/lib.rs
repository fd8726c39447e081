//! Workflow engine for reportek envelopes.
//!
//! This crate turns declarative workflow definitions into executable state
//! machines bound to a bearer (an envelope):
//!
//! - **Definitions**: states, transitions, allowed actors and on-enter hooks,
//!   built in code or loaded from JSON with a callback registry
//! - **Validation**: a sound workflow has the final state as its only sink
//! - **Runtime**: available-transition queries and guarded transition starts
//! - **Execution**: compare-and-swap commits, automatic follow-on cascades,
//!   history recording and lifecycle notifications
//! - **Backends**: in-memory stores, broadcast and NATS notifiers

pub mod actor;
pub mod compiled;
pub mod config;
pub mod definition;
pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod history;
pub mod instance;
pub mod json_graph;
pub mod machine;
pub mod memory;
pub mod nats;
pub mod notify;
pub mod state;
pub mod store;
pub mod transition;
pub mod versioned;

pub use actor::{ActorContext, ActorKind};
pub use compiled::CompiledWorkflow;
pub use config::EngineConfig;
pub use definition::{DefinitionSpec, TransitionSpec, WorkflowDefinition, WorkflowDefinitionBuilder};
pub use error::{CallbackError, Misconfiguration, NotifyError, StoreError, Unavailable, WorkflowError};
pub use executor::Engine;
pub use history::{HistoryLog, NewTransitionEvent, TransitionEvent};
pub use instance::{Assignment, BearerRef, BearerSnapshot, WorkflowInstance};
pub use json_graph::JsonGraph;
pub use machine::StateMachine;
pub use notify::{BearerEvent, BroadcastNotifier, EnteredState, Notification, Notifier, Topic};
pub use state::WorkflowState;
pub use store::BearerStore;
pub use transition::{
    CallbackRegistry, EnterHook, OnEnter, TransitionContext, TransitionHandler, WorkflowTransition,
    handler_fn, noop,
};
pub use versioned::Versioned;
