//! The run loop: routes events, launches steps and collects their output.

use crate::config::EngineConfig;
use crate::join::{Contribution, JoinBuffer};
use crate::registry::{StepEntry, StepRegistry};
use futures::FutureExt;
use musubi_core::{
    Context, ContextStore, Event, EventKind, Phase, ProgressNotice, ProgressSink, RunId,
    StepInput, StepName, StepOutput, Trigger, WorkflowError,
};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Completion<E> {
    step: StepName,
    result: Result<StepOutput<E>, WorkflowError>,
}

/// State of one run.
///
/// Queue, join buffer and task set are only touched by the loop itself; step
/// bodies run concurrently as tasks and report back through the task set.
pub(crate) struct Dispatcher<E: Event> {
    registry: Arc<StepRegistry<E>>,
    terminal: EventKind,
    config: EngineConfig,
    sink: Arc<dyn ProgressSink>,
    run_id: RunId,
    store: Arc<ContextStore>,
    cancel: CancellationToken,
    permits: Option<Arc<Semaphore>>,
    joins: JoinBuffer<E>,
    fired: HashSet<StepName>,
    queue: VecDeque<E>,
    tasks: JoinSet<Completion<E>>,
    task_steps: HashMap<Id, StepName>,
    launched: usize,
}

impl<E: Event> Dispatcher<E> {
    pub(crate) fn new(
        registry: Arc<StepRegistry<E>>,
        terminal: EventKind,
        config: EngineConfig,
        sink: Arc<dyn ProgressSink>,
        run_id: RunId,
        store: Arc<ContextStore>,
        cancel: CancellationToken,
    ) -> Self {
        let permits = config
            .max_concurrent_steps
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self {
            registry,
            terminal,
            config,
            sink,
            run_id,
            store,
            cancel,
            permits,
            joins: JoinBuffer::new(),
            fired: HashSet::new(),
            queue: VecDeque::new(),
            tasks: JoinSet::new(),
            task_steps: HashMap::new(),
            launched: 0,
        }
    }

    /// Drives the run to its terminal event or first error.
    ///
    /// On success, steps still in flight are detached and their output is
    /// discarded. On failure, the run's token is cancelled and every
    /// outstanding task is aborted.
    pub(crate) async fn run(mut self, seeds: Vec<E>) -> Result<E, WorkflowError> {
        let result = match self.config.run_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.drive(seeds)).await {
                Ok(result) => result,
                Err(_) => Err(WorkflowError::RunTimeout(limit)),
            },
            None => self.drive(seeds).await,
        };

        match &result {
            Ok(_) => {
                if !self.tasks.is_empty() {
                    debug!(
                        run_id = %self.run_id,
                        in_flight = self.tasks.len(),
                        "detaching steps still in flight"
                    );
                }
                self.tasks.detach_all();
            }
            Err(_) => {
                self.cancel.cancel();
                self.tasks.abort_all();
            }
        }
        result
    }

    async fn drive(&mut self, seeds: Vec<E>) -> Result<E, WorkflowError> {
        if let Some(terminal) = self.enqueue(seeds) {
            return Ok(terminal);
        }

        loop {
            while let Some(event) = self.queue.pop_front() {
                self.dispatch(event)?;
            }

            if self.tasks.is_empty() {
                let waiting: Vec<String> =
                    self.joins.pending().iter().map(ToString::to_string).collect();
                warn!(run_id = %self.run_id, ?waiting, "run stalled before the terminal event");
                return Err(WorkflowError::Stalled { waiting });
            }

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(run_id = %self.run_id, "run cancelled");
                    return Err(WorkflowError::Cancelled);
                }
                joined = self.tasks.join_next_with_id() => joined,
            };

            let completion = match joined {
                Some(Ok((id, completion))) => {
                    self.task_steps.remove(&id);
                    completion
                }
                Some(Err(join_error)) => return Err(self.task_died(join_error)),
                None => continue,
            };

            let events = self.complete(completion)?;
            if let Some(terminal) = self.enqueue(events) {
                return Ok(terminal);
            }
        }
    }

    /// Queues events, stopping at the first terminal one.
    fn enqueue(&mut self, events: Vec<E>) -> Option<E> {
        for event in events {
            if event.kind() == self.terminal {
                info!(run_id = %self.run_id, kind = %self.terminal, "terminal event produced");
                return Some(event);
            }
            self.queue.push_back(event);
        }
        None
    }

    fn dispatch(&mut self, event: E) -> Result<(), WorkflowError> {
        let kind = event.kind();
        let registry = Arc::clone(&self.registry);
        let Some((&last, rest)) = registry.route_indices(kind).split_last() else {
            error!(run_id = %self.run_id, kind = %kind, "event matches no step");
            return Err(WorkflowError::UnroutedEvent { kind });
        };

        for &index in rest {
            self.route(registry.entry(index), event.clone())?;
        }
        self.route(registry.entry(last), event)
    }

    fn route(&mut self, entry: &StepEntry<E>, event: E) -> Result<(), WorkflowError> {
        let required = match &entry.trigger {
            Trigger::Single(_) => return self.launch(entry, StepInput::single(event)),
            Trigger::Join(required) => required,
        };

        match self.joins.contribute(&entry.name, required, event) {
            Contribution::Pending => {
                debug!(run_id = %self.run_id, step = %entry.name, "join waiting for more input");
                Ok(())
            }
            Contribution::Dropped(late) => {
                debug!(
                    run_id = %self.run_id,
                    step = %entry.name,
                    kind = %late.kind(),
                    "join already fired, dropping late event"
                );
                Ok(())
            }
            Contribution::Ready(events) => {
                if !self.fired.insert(entry.name.clone()) {
                    error!(run_id = %self.run_id, step = %entry.name, "join fired twice");
                    return Err(WorkflowError::JoinIntegrity {
                        step_name: entry.name.clone(),
                    });
                }
                self.launch(entry, StepInput::joined(events))
            }
        }
    }

    fn launch(&mut self, entry: &StepEntry<E>, input: StepInput<E>) -> Result<(), WorkflowError> {
        self.launched += 1;
        if self.launched > self.config.max_dispatches {
            return Err(WorkflowError::DispatchLimitExceeded(self.config.max_dispatches));
        }

        let name = entry.name.clone();
        let step = Arc::clone(&entry.step);
        let timeout = entry
            .timeout
            .unwrap_or_else(|| self.config.step_timeout());
        let ctx = Context::new(
            Arc::clone(&self.store),
            self.run_id,
            name.clone(),
            Arc::clone(&self.sink),
            self.cancel.clone(),
        );
        let permits = self.permits.clone();

        info!(run_id = %self.run_id, step = %name, inputs = ?input.kinds(), "step_started");
        self.notify(&name, Phase::Started, String::new());

        let handle = self.tasks.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let execution = tokio::time::timeout(timeout, step.execute(input, &ctx));
            let result = match AssertUnwindSafe(execution).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(WorkflowError::Timeout {
                    step_name: name.clone(),
                }),
                Err(panic) => Err(WorkflowError::StepPanicked {
                    step_name: name.clone(),
                    details: panic_message(panic.as_ref()),
                }),
            };
            Completion { step: name, result }
        });
        self.task_steps.insert(handle.id(), entry.name.clone());
        Ok(())
    }

    /// Attributes a task that ended without reporting back to its step.
    fn task_died(&mut self, join_error: JoinError) -> WorkflowError {
        let step = self
            .task_steps
            .remove(&join_error.id())
            .unwrap_or_else(|| StepName::new("unknown"));
        let details = if join_error.is_cancelled() {
            "step task was cancelled".to_string()
        } else {
            join_error.to_string()
        };
        let error = WorkflowError::StepPanicked {
            step_name: step.clone(),
            details,
        };
        self.fail(&step, &error);
        error
    }

    fn complete(&self, completion: Completion<E>) -> Result<Vec<E>, WorkflowError> {
        let Completion { step, result } = completion;
        let events = match result {
            Ok(output) => output.into_events(),
            Err(error) => {
                self.fail(&step, &error);
                return Err(error);
            }
        };

        let declared = self.registry.emits(step.as_str()).unwrap_or(&[]);
        let emitted: Vec<EventKind> = events.iter().map(Event::kind).collect();
        if let Some(kind) = emitted.iter().find(|k| !declared.contains(*k)) {
            let error = WorkflowError::UndeclaredEmission {
                step_name: step.clone(),
                kind: *kind,
            };
            self.fail(&step, &error);
            return Err(error);
        }

        info!(run_id = %self.run_id, step = %step, ?emitted, "step_completed");
        let message = if emitted.is_empty() {
            String::new()
        } else {
            let kinds: Vec<&str> = emitted.iter().map(EventKind::as_str).collect();
            format!("emitted=[{}]", kinds.join(", "))
        };
        self.notify(&step, Phase::Completed, message);
        Ok(events)
    }

    fn fail(&self, step: &StepName, error: &WorkflowError) {
        error!(run_id = %self.run_id, step = %step, error = %error, "step_failed");
        self.notify(step, Phase::Failed, error.to_string());
    }

    fn notify(&self, step: &StepName, phase: Phase, message: String) {
        self.sink.notify(ProgressNotice {
            run_id: self.run_id,
            step: step.clone(),
            phase,
            message,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}
