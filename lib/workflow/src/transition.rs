//! Transitions and the callbacks that give them behaviour.
//!
//! A transition is declared as data (name, sources, target, allowed actors)
//! and paired with its callbacks at definition-load time through a
//! [`CallbackRegistry`]. The engine never discovers callbacks on its own.

use crate::actor::{ActorContext, ActorKind};
use crate::error::CallbackError;
use crate::instance::BearerSnapshot;
use crate::state::WorkflowState;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// What a callback gets to see while a transition runs.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// The bearer as it was when the transition started.
    pub bearer: &'a BearerSnapshot,
    /// The transition being executed (or, for on-enter hooks, the one that
    /// just entered the state).
    pub transition: &'a str,
    pub actor: &'a ActorContext,
}

/// The domain side effect of a transition.
///
/// Implementations may call out to external services. An error aborts the
/// transition before anything is committed.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    async fn run(&self, ctx: &TransitionContext<'_>) -> Result<(), CallbackError>;
}

/// Hook run right after a transition enters its target state.
///
/// Returns the name of the follow-on transition to start as the system
/// actor, or `None` to stop the cascade here.
#[async_trait]
pub trait EnterHook: Send + Sync {
    async fn on_enter(&self, ctx: &TransitionContext<'_>) -> Result<Option<String>, CallbackError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> TransitionHandler for FnHandler<F>
where
    F: Fn(&TransitionContext<'_>) -> Result<(), CallbackError> + Send + Sync,
{
    async fn run(&self, ctx: &TransitionContext<'_>) -> Result<(), CallbackError> {
        (self.0)(ctx)
    }
}

/// Wraps a synchronous closure as a transition implementation.
pub fn handler_fn<F>(f: F) -> Arc<dyn TransitionHandler>
where
    F: Fn(&TransitionContext<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// An implementation that does nothing beyond logging.
pub fn noop() -> Arc<dyn TransitionHandler> {
    handler_fn(|ctx| {
        tracing::debug!(transition = ctx.transition, "running no-op transition");
        Ok(())
    })
}

/// Behaviour attached to entering a transition's target state.
#[derive(Clone)]
pub enum OnEnter {
    /// Start the named transition automatically.
    Start(String),
    /// Ask a hook which transition, if any, to start.
    Hook(Arc<dyn EnterHook>),
}

impl OnEnter {
    /// Automatic follow-on transition by name.
    #[must_use]
    pub fn start(transition: impl Into<String>) -> Self {
        Self::Start(transition.into())
    }

    /// The statically known follow-on transition, if any.
    #[must_use]
    pub fn declared_target(&self) -> Option<&str> {
        match self {
            Self::Start(name) => Some(name),
            Self::Hook(_) => None,
        }
    }
}

impl fmt::Debug for OnEnter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(name) => f.debug_tuple("Start").field(name).finish(),
            Self::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

/// A declared transition with its callbacks attached.
#[derive(Clone)]
pub struct WorkflowTransition {
    name: String,
    sources: Vec<WorkflowState>,
    target: WorkflowState,
    allowed_actors: BTreeSet<ActorKind>,
    implementation: Arc<dyn TransitionHandler>,
    on_enter_target: Option<OnEnter>,
}

impl WorkflowTransition {
    /// Creates a transition allowed to the system and admin actors.
    ///
    /// Duplicate sources are collapsed; declaration order is kept.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        sources: impl IntoIterator<Item = WorkflowState>,
        target: WorkflowState,
        implementation: Arc<dyn TransitionHandler>,
    ) -> Self {
        let mut unique: Vec<WorkflowState> = Vec::new();
        for source in sources {
            if !unique.contains(&source) {
                unique.push(source);
            }
        }

        Self {
            name: name.into(),
            sources: unique,
            target,
            allowed_actors: BTreeSet::from([ActorKind::System, ActorKind::Admin]),
            implementation,
            on_enter_target: None,
        }
    }

    /// Replaces the set of actor kinds allowed to start this transition.
    #[must_use]
    pub fn allowed_actors(mut self, actors: impl IntoIterator<Item = ActorKind>) -> Self {
        self.allowed_actors = actors.into_iter().collect();
        self
    }

    #[must_use]
    pub fn on_enter_target(mut self, on_enter: OnEnter) -> Self {
        self.on_enter_target = Some(on_enter);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sources(&self) -> &[WorkflowState] {
        &self.sources
    }

    #[must_use]
    pub fn target(&self) -> &WorkflowState {
        &self.target
    }

    #[must_use]
    pub fn actors(&self) -> &BTreeSet<ActorKind> {
        &self.allowed_actors
    }

    /// Returns true if `state` is one of the sources.
    #[must_use]
    pub fn has_source(&self, state: &str) -> bool {
        self.sources.iter().any(|s| s.name() == state)
    }

    #[must_use]
    pub fn allows(&self, actor: ActorKind) -> bool {
        self.allowed_actors.contains(&actor)
    }

    /// True when only the system may start this transition.
    #[must_use]
    pub fn is_system_only(&self) -> bool {
        self.allowed_actors.len() == 1 && self.allows(ActorKind::System)
    }

    #[must_use]
    pub fn implementation(&self) -> &Arc<dyn TransitionHandler> {
        &self.implementation
    }

    #[must_use]
    pub fn on_enter(&self) -> Option<&OnEnter> {
        self.on_enter_target.as_ref()
    }
}

impl fmt::Debug for WorkflowTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowTransition")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("target", &self.target)
            .field("allowed_actors", &self.allowed_actors)
            .field("on_enter_target", &self.on_enter_target)
            .finish_non_exhaustive()
    }
}

/// Callbacks registered for one transition name.
#[derive(Clone)]
pub struct TransitionCallbacks {
    pub implementation: Arc<dyn TransitionHandler>,
    pub on_enter_target: Option<OnEnter>,
}

/// Explicit table of transition callbacks, keyed by transition name.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    entries: HashMap<String, TransitionCallbacks>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation of `transition`, replacing any earlier one.
    pub fn implement(
        &mut self,
        transition: impl Into<String>,
        implementation: Arc<dyn TransitionHandler>,
    ) -> &mut Self {
        let transition = transition.into();
        match self.entries.get_mut(&transition) {
            Some(entry) => entry.implementation = implementation,
            None => {
                self.entries.insert(
                    transition,
                    TransitionCallbacks {
                        implementation,
                        on_enter_target: None,
                    },
                );
            }
        }
        self
    }

    /// Attaches an on-enter hook to an already implemented transition.
    ///
    /// Returns false when `transition` has no implementation yet.
    pub fn on_enter(&mut self, transition: &str, on_enter: OnEnter) -> bool {
        match self.entries.get_mut(transition) {
            Some(entry) => {
                entry.on_enter_target = Some(on_enter);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, transition: &str) -> Option<&TransitionCallbacks> {
        self.entries.get(transition)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
