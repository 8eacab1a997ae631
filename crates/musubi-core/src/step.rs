//! Step trait and related types.

use crate::context::Context;
use crate::error::WorkflowError;
use crate::event::{Event, EventKind};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::{self, Debug};
use std::time::Duration;

/// Type-safe step name wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&StepName> for StepName {
    fn from(s: &StepName) -> Self {
        s.clone()
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Input criterion of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once per event of this kind.
    Single(EventKind),
    /// Fires once per run, after one event of every listed kind has arrived.
    Join(Vec<EventKind>),
}

impl Trigger {
    /// Creates a single-kind trigger.
    pub fn on(kind: EventKind) -> Self {
        Self::Single(kind)
    }

    /// Creates a join trigger over the given kinds.
    pub fn join(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::Join(kinds.into_iter().collect())
    }

    /// Returns every kind this trigger listens to.
    pub fn kinds(&self) -> &[EventKind] {
        match self {
            Trigger::Single(kind) => std::slice::from_ref(kind),
            Trigger::Join(kinds) => kinds,
        }
    }

    /// Returns `true` for join triggers.
    pub fn is_join(&self) -> bool {
        matches!(self, Trigger::Join(_))
    }
}

/// Events handed to one step invocation.
///
/// Holds the triggering event for single-kind steps, or the complete set for
/// joins, ordered as the trigger lists its kinds.
#[derive(Debug)]
pub struct StepInput<E> {
    events: Vec<E>,
}

impl<E: Event> StepInput<E> {
    /// Input for a single-kind trigger.
    pub fn single(event: E) -> Self {
        Self {
            events: vec![event],
        }
    }

    /// Input for a join trigger.
    pub fn joined(events: Vec<E>) -> Self {
        Self { events }
    }

    /// Returns the first event of the input.
    pub fn event(&self) -> Option<&E> {
        self.events.first()
    }

    /// Consumes the input and returns its first event.
    pub fn into_event(self) -> Option<E> {
        self.events.into_iter().next()
    }

    /// Returns the event of the given kind.
    pub fn get(&self, kind: EventKind) -> Option<&E> {
        self.events.iter().find(|e| e.kind() == kind)
    }

    /// Removes and returns the event of the given kind.
    pub fn take(&mut self, kind: EventKind) -> Option<E> {
        let index = self.events.iter().position(|e| e.kind() == kind)?;
        Some(self.events.remove(index))
    }

    /// Returns the kinds present in the input.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(Event::kind).collect()
    }

    /// Returns the number of events in the input.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the input holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consumes the input and returns all events.
    pub fn into_events(self) -> Vec<E> {
        self.events
    }
}

/// Output from a step execution.
#[derive(Debug)]
pub enum StepOutput<E> {
    /// Events to feed back into the run.
    Emit(Vec<E>),
    /// Nothing to dispatch; the step only touched the context.
    Nothing,
}

impl<E> StepOutput<E> {
    /// Emits a single event.
    pub fn emit(event: E) -> Self {
        Self::Emit(vec![event])
    }

    /// Emits every event of the iterator.
    pub fn emit_all(events: impl IntoIterator<Item = E>) -> Self {
        Self::Emit(events.into_iter().collect())
    }

    /// Emits nothing.
    pub fn nothing() -> Self {
        Self::Nothing
    }

    /// Consumes the output and returns the emitted events.
    pub fn into_events(self) -> Vec<E> {
        match self {
            StepOutput::Emit(events) => events,
            StepOutput::Nothing => Vec::new(),
        }
    }
}

/// Configuration for a workflow step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepConfig {
    /// Maximum time allowed for one invocation. `None` uses the engine default.
    pub timeout: Option<Duration>,
}

impl StepConfig {
    /// Creates a config with the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// A workflow step that can be executed asynchronously.
///
/// A step declares which event kinds it consumes ([`Trigger`]) and which it
/// may emit. It is stateless across invocations: anything it needs beyond its
/// input lives in the run's context store.
///
/// # Examples
///
/// ```
/// use musubi_core::{
///     Context, Event, EventKind, Step, StepInput, StepName, StepOutput, Trigger, WorkflowError,
/// };
/// use async_trait::async_trait;
///
/// #[derive(Debug, Clone)]
/// enum Ev {
///     Ping(u32),
///     Pong(u32),
/// }
///
/// const PING: EventKind = EventKind::new("Ping");
/// const PONG: EventKind = EventKind::new("Pong");
///
/// impl Event for Ev {
///     fn kind(&self) -> EventKind {
///         match self {
///             Ev::Ping(_) => PING,
///             Ev::Pong(_) => PONG,
///         }
///     }
/// }
///
/// #[derive(Debug)]
/// struct Reply;
///
/// #[async_trait]
/// impl Step<Ev> for Reply {
///     async fn execute(&self, input: StepInput<Ev>, ctx: &Context) -> Result<StepOutput<Ev>, WorkflowError> {
///         match input.into_event() {
///             Some(Ev::Ping(n)) => {
///                 ctx.insert("last_ping", n);
///                 Ok(StepOutput::emit(Ev::Pong(n)))
///             }
///             other => Err(WorkflowError::step(self.name(), format!("unexpected input {other:?}"))),
///         }
///     }
///
///     fn name(&self) -> StepName {
///         StepName::new("reply")
///     }
///
///     fn trigger(&self) -> Trigger {
///         Trigger::on(PING)
///     }
///
///     fn emits(&self) -> Vec<EventKind> {
///         vec![PONG]
///     }
/// }
/// ```
#[async_trait]
pub trait Step<E: Event>: Send + Sync + Debug {
    /// Executes the step logic.
    ///
    /// # Returns
    ///
    /// - `Ok(StepOutput::Emit(events))` - Feed these events back into the run
    /// - `Ok(StepOutput::Nothing)` - Side effects only
    /// - `Err(error)` - Step failed; the run fails with this error
    async fn execute(
        &self,
        input: StepInput<E>,
        ctx: &Context,
    ) -> Result<StepOutput<E>, WorkflowError>;

    /// Returns the step name. Must be unique within a workflow.
    fn name(&self) -> StepName;

    /// Returns the input criterion.
    fn trigger(&self) -> Trigger;

    /// Returns the event kinds this step may emit.
    fn emits(&self) -> Vec<EventKind> {
        Vec::new()
    }

    /// Returns the step configuration.
    fn config(&self) -> StepConfig {
        StepConfig::default()
    }
}
