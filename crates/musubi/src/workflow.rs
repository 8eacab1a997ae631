//! Workflow definition and the run handle callers interact with.

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::registry::StepRegistry;
use musubi_core::{
    ContextStore, Event, EventKind, NoopSink, ProgressSink, RunId, Step, StepConfig, StepName,
    WorkflowError,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunOutcome<E> {
    /// Id of the run.
    pub run_id: RunId,
    /// The terminal event that ended the run.
    pub terminal: E,
    /// The run's context store.
    pub context: Arc<ContextStore>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// A validated set of steps together with its start and terminal kinds.
///
/// A workflow is immutable once built. Every call to [`run`](Self::run) or
/// [`execute`](Self::execute) gets its own context store and join buffer, so
/// independent runs may proceed concurrently on the same workflow.
pub struct Workflow<E: Event> {
    registry: Arc<StepRegistry<E>>,
    seeds: Vec<EventKind>,
    terminal: EventKind,
    config: EngineConfig,
    sink: Arc<dyn ProgressSink>,
}

impl<E: Event> fmt::Debug for Workflow<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("steps", &self.registry.step_names().collect::<Vec<_>>())
            .field("seeds", &self.seeds)
            .field("terminal", &self.terminal)
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Event> Workflow<E> {
    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder<E> {
        WorkflowBuilder::new()
    }

    /// Returns the kinds a run may be seeded with.
    pub fn seed_kinds(&self) -> &[EventKind] {
        &self.seeds
    }

    /// Returns the kind that ends a run.
    pub fn terminal_kind(&self) -> EventKind {
        self.terminal
    }

    /// Returns the step registry.
    pub fn registry(&self) -> &StepRegistry<E> {
        &self.registry
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns an iterator over all registered step names.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.registry.step_names()
    }

    /// Returns `true` if a step with the given name exists.
    pub fn has_step(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Returns the number of registered steps.
    pub fn step_count(&self) -> usize {
        self.registry.len()
    }

    /// Runs the workflow from one start event and returns the terminal event.
    pub async fn run(&self, seed: E) -> Result<E, WorkflowError> {
        self.run_seeds([seed]).await
    }

    /// Runs the workflow from several start events and returns the terminal event.
    pub async fn run_seeds(&self, seeds: impl IntoIterator<Item = E>) -> Result<E, WorkflowError> {
        self.execute(seeds, CancellationToken::new())
            .await
            .map(|outcome| outcome.terminal)
    }

    /// Runs the workflow and returns the terminal event with the run's context.
    ///
    /// Cancelling `cancel` fails the run with [`WorkflowError::Cancelled`].
    /// The token is only observed; a failing run cancels a child of it.
    pub async fn execute(
        &self,
        seeds: impl IntoIterator<Item = E>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome<E>, WorkflowError> {
        let seeds: Vec<E> = seeds.into_iter().collect();
        if seeds.is_empty() {
            return Err(WorkflowError::Configuration(
                "A run needs at least one start event".to_string(),
            ));
        }
        if let Some(kind) = seeds
            .iter()
            .map(Event::kind)
            .find(|kind| !self.seeds.contains(kind))
        {
            return Err(WorkflowError::Configuration(format!(
                "'{kind}' is not a start event kind of this workflow"
            )));
        }

        let run_id = RunId::new();
        let store = Arc::new(ContextStore::new());
        let started_at = Instant::now();
        let seed_kinds: Vec<EventKind> = seeds.iter().map(Event::kind).collect();

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            self.terminal,
            self.config.clone(),
            Arc::clone(&self.sink),
            run_id,
            Arc::clone(&store),
            cancel.child_token(),
        );

        let span = info_span!("workflow_run", run_id = %run_id);
        async move {
            info!(seeds = ?seed_kinds, "workflow_started");
            let result = dispatcher.run(seeds).await;
            let elapsed = started_at.elapsed();
            match result {
                Ok(terminal) => {
                    info!(elapsed_ms = elapsed.as_millis() as u64, "workflow_completed");
                    Ok(RunOutcome {
                        run_id,
                        terminal,
                        context: store,
                        elapsed,
                    })
                }
                Err(e) => {
                    error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "workflow_failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Builder for constructing [`Workflow`] instances.
pub struct WorkflowBuilder<E: Event> {
    steps: Vec<(Arc<dyn Step<E>>, StepConfig)>,
    seeds: Vec<EventKind>,
    terminal: Option<EventKind>,
    config: EngineConfig,
    sink: Arc<dyn ProgressSink>,
}

impl<E: Event> fmt::Debug for WorkflowBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field(
                "steps",
                &self.steps.iter().map(|(s, _)| s.name()).collect::<Vec<_>>(),
            )
            .field("seeds", &self.seeds)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl<E: Event> Default for WorkflowBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> WorkflowBuilder<E> {
    /// Creates a new empty workflow builder.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            seeds: Vec::new(),
            terminal: None,
            config: EngineConfig::default(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Adds a step using its own [`Step::config`].
    pub fn add_step<S: Step<E> + 'static>(self, step: S) -> Self {
        let config = step.config();
        self.add_configured(step, config)
    }

    /// Adds a step that is already behind an `Arc`.
    pub fn add_shared(mut self, step: Arc<dyn Step<E>>) -> Self {
        let config = step.config();
        self.steps.push((step, config));
        self
    }

    /// Adds a step with custom timeout.
    pub fn add_with_timeout<S: Step<E> + 'static>(self, step: S, timeout: Duration) -> Self {
        self.add_configured(step, StepConfig::with_timeout(timeout))
    }

    /// Adds a fully configured step.
    pub fn add_configured<S: Step<E> + 'static>(mut self, step: S, config: StepConfig) -> Self {
        self.steps.push((Arc::new(step), config));
        self
    }

    /// Declares a kind runs may be seeded with. May be called repeatedly.
    pub fn start_with(mut self, kind: EventKind) -> Self {
        if !self.seeds.contains(&kind) {
            self.seeds.push(kind);
        }
        self
    }

    /// Declares the kind whose emission ends a run.
    pub fn finish_on(mut self, kind: EventKind) -> Self {
        self.terminal = Some(kind);
        self
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink receiving progress notices.
    pub fn progress_sink<P: ProgressSink + 'static>(self, sink: P) -> Self {
        self.shared_progress_sink(Arc::new(sink))
    }

    /// Sets a shared sink receiving progress notices.
    pub fn shared_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the workflow.
    pub fn build(self) -> Result<Workflow<E>, WorkflowError> {
        let terminal = self.terminal.ok_or_else(|| {
            WorkflowError::Configuration("Terminal event kind must be specified".to_string())
        })?;
        if self.config.step_timeout_seconds == 0 {
            return Err(WorkflowError::Configuration(
                "step_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.config.max_dispatches == 0 {
            return Err(WorkflowError::Configuration(
                "max_dispatches must be greater than 0".to_string(),
            ));
        }

        let mut registry = StepRegistry::new();
        for (step, config) in self.steps {
            registry.register(step, config)?;
        }
        registry.validate(&self.seeds, terminal)?;

        Ok(Workflow {
            registry: Arc::new(registry),
            seeds: self.seeds,
            terminal,
            config: self.config,
            sink: self.sink,
        })
    }
}
