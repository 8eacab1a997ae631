//! Static table mapping event kinds to the steps they trigger.

use musubi_core::{Event, EventKind, Step, StepConfig, StepName, Trigger, WorkflowError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct StepEntry<E> {
    pub(crate) name: StepName,
    pub(crate) step: Arc<dyn Step<E>>,
    pub(crate) trigger: Trigger,
    pub(crate) emits: Vec<EventKind>,
    pub(crate) timeout: Option<Duration>,
}

/// Registered steps and the dispatch table derived from their triggers.
///
/// Built once by [`WorkflowBuilder`](crate::WorkflowBuilder) and never
/// modified afterwards; runs share it read-only.
pub struct StepRegistry<E> {
    entries: Vec<StepEntry<E>>,
    by_name: HashMap<StepName, usize>,
    routes: HashMap<EventKind, Vec<usize>>,
}

impl<E> fmt::Debug for StepRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field(
                "steps",
                &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>(),
            )
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Event> Default for StepRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> StepRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// Registers a step under its trigger.
    ///
    /// Fails on a duplicate name, a join over fewer than two kinds, or a join
    /// that lists the same kind twice.
    pub fn register(
        &mut self,
        step: Arc<dyn Step<E>>,
        config: StepConfig,
    ) -> Result<(), WorkflowError> {
        let name = step.name();
        if self.by_name.contains_key(&name) {
            return Err(WorkflowError::DuplicateStep(name));
        }

        let trigger = step.trigger();
        if let Trigger::Join(kinds) = &trigger {
            if kinds.len() < 2 {
                return Err(WorkflowError::Configuration(format!(
                    "join step '{name}' must require at least two event kinds"
                )));
            }
            let distinct: BTreeSet<_> = kinds.iter().collect();
            if distinct.len() != kinds.len() {
                return Err(WorkflowError::Configuration(format!(
                    "join step '{name}' lists the same event kind more than once"
                )));
            }
        }

        let index = self.entries.len();
        for kind in trigger.kinds() {
            self.routes.entry(*kind).or_default().push(index);
        }
        self.by_name.insert(name.clone(), index);
        self.entries.push(StepEntry {
            name,
            emits: step.emits(),
            step,
            trigger,
            timeout: config.timeout,
        });
        Ok(())
    }

    /// Returns the names of every step the event routes to, in registration order.
    ///
    /// For join steps this means the event contributes to the join, not that
    /// the step fires.
    pub fn matching(&self, kind: EventKind) -> Vec<&StepName> {
        self.route_indices(kind)
            .iter()
            .map(|&i| &self.entries[i].name)
            .collect()
    }

    /// Returns `true` if at least one step consumes the kind.
    pub fn routes(&self, kind: EventKind) -> bool {
        !self.route_indices(kind).is_empty()
    }

    /// Returns the trigger of the named step.
    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.entry_by_name(name).map(|e| &e.trigger)
    }

    /// Returns the declared output kinds of the named step.
    pub fn emits(&self, name: &str) -> Option<&[EventKind]> {
        self.entry_by_name(name).map(|e| e.emits.as_slice())
    }

    /// Returns every step name in registration order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.entries.iter().map(|e| &e.name)
    }

    /// Returns `true` if a step with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the number of registered steps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no step is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the whole graph against its seed and terminal kinds.
    pub fn validate(&self, seeds: &[EventKind], terminal: EventKind) -> Result<(), WorkflowError> {
        if seeds.is_empty() {
            return Err(WorkflowError::Configuration(
                "At least one start event kind must be specified".to_string(),
            ));
        }

        let produced: BTreeSet<EventKind> = seeds
            .iter()
            .copied()
            .chain(self.entries.iter().flat_map(|e| e.emits.iter().copied()))
            .collect();

        for seed in seeds {
            if *seed != terminal && !self.routes(*seed) {
                return Err(WorkflowError::Configuration(format!(
                    "start event kind '{seed}' is not consumed by any step"
                )));
            }
        }

        for entry in &self.entries {
            if entry.trigger.kinds().contains(&terminal) {
                return Err(WorkflowError::Configuration(format!(
                    "step '{}' is triggered by the terminal event kind '{terminal}'",
                    entry.name
                )));
            }
            if let Some(missing) = entry.trigger.kinds().iter().find(|k| !produced.contains(*k)) {
                return Err(WorkflowError::Configuration(format!(
                    "step '{}' waits for '{missing}', which no step emits",
                    entry.name
                )));
            }
            if let Some(orphan) = entry
                .emits
                .iter()
                .find(|k| **k != terminal && !self.routes(**k))
            {
                return Err(WorkflowError::Configuration(format!(
                    "step '{}' emits '{orphan}', which no step consumes",
                    entry.name
                )));
            }
        }

        if !produced.contains(&terminal) {
            return Err(WorkflowError::Configuration(format!(
                "no step emits the terminal event kind '{terminal}'"
            )));
        }

        Ok(())
    }

    pub(crate) fn route_indices(&self, kind: EventKind) -> &[usize] {
        self.routes.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn entry(&self, index: usize) -> &StepEntry<E> {
        &self.entries[index]
    }

    pub(crate) fn entry_by_name(&self, name: &str) -> Option<&StepEntry<E>> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use musubi_core::{Context, StepInput, StepOutput};

    const SEED: EventKind = EventKind::new("Seed");
    const LEFT: EventKind = EventKind::new("Left");
    const RIGHT: EventKind = EventKind::new("Right");
    const DONE: EventKind = EventKind::new("Done");

    #[derive(Debug, Clone)]
    struct Tagged(EventKind);

    impl Event for Tagged {
        fn kind(&self) -> EventKind {
            self.0
        }
    }

    #[derive(Debug)]
    struct Declared {
        name: &'static str,
        trigger: Trigger,
        emits: Vec<EventKind>,
    }

    #[async_trait]
    impl Step<Tagged> for Declared {
        async fn execute(
            &self,
            _input: StepInput<Tagged>,
            _ctx: &Context,
        ) -> Result<StepOutput<Tagged>, WorkflowError> {
            Ok(StepOutput::nothing())
        }

        fn name(&self) -> StepName {
            StepName::new(self.name)
        }

        fn trigger(&self) -> Trigger {
            self.trigger.clone()
        }

        fn emits(&self) -> Vec<EventKind> {
            self.emits.clone()
        }
    }

    fn step(name: &'static str, trigger: Trigger, emits: &[EventKind]) -> Arc<dyn Step<Tagged>> {
        Arc::new(Declared {
            name,
            trigger,
            emits: emits.to_vec(),
        })
    }

    fn diamond() -> StepRegistry<Tagged> {
        let mut registry = StepRegistry::new();
        registry
            .register(step("split", Trigger::on(SEED), &[LEFT, RIGHT]), StepConfig::default())
            .expect("split");
        registry
            .register(
                step("merge", Trigger::join([LEFT, RIGHT]), &[DONE]),
                StepConfig::default(),
            )
            .expect("merge");
        registry
    }

    #[test]
    fn test_matching_is_idempotent() {
        let registry = diamond();
        let first: Vec<StepName> = registry.matching(LEFT).into_iter().cloned().collect();
        let second: Vec<StepName> = registry.matching(LEFT).into_iter().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![StepName::new("merge")]);
        assert!(registry.matching(DONE).is_empty());
    }

    #[test]
    fn test_validate_diamond() {
        let registry = diamond();
        assert!(registry.validate(&[SEED], DONE).is_ok());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("split"));
        assert_eq!(registry.emits("split"), Some(&[LEFT, RIGHT][..]));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = diamond();
        let result = registry.register(step("split", Trigger::on(SEED), &[]), StepConfig::default());
        assert!(matches!(result, Err(WorkflowError::DuplicateStep(name)) if name.as_str() == "split"));
    }

    #[test]
    fn test_degenerate_joins_rejected() {
        let mut registry = StepRegistry::<Tagged>::new();
        let single = registry.register(step("one", Trigger::join([LEFT]), &[]), StepConfig::default());
        assert!(matches!(single, Err(WorkflowError::Configuration(_))));

        let repeated = registry.register(
            step("twice", Trigger::join([LEFT, LEFT]), &[]),
            StepConfig::default(),
        );
        assert!(matches!(repeated, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_unsatisfiable_join_rejected() {
        let mut registry = StepRegistry::new();
        registry
            .register(step("split", Trigger::on(SEED), &[LEFT]), StepConfig::default())
            .expect("split");
        registry
            .register(
                step("merge", Trigger::join([LEFT, RIGHT]), &[DONE]),
                StepConfig::default(),
            )
            .expect("merge");

        let error = registry.validate(&[SEED], DONE).expect_err("RIGHT is never emitted");
        assert!(error.to_string().contains("waits for 'Right'"));
    }

    #[test]
    fn test_orphan_emission_rejected() {
        let mut registry = StepRegistry::new();
        registry
            .register(step("split", Trigger::on(SEED), &[LEFT, DONE]), StepConfig::default())
            .expect("split");

        let error = registry.validate(&[SEED], DONE).expect_err("LEFT is never consumed");
        assert!(error.to_string().contains("emits 'Left'"));
    }

    #[test]
    fn test_terminal_trigger_and_missing_terminal_rejected() {
        let mut registry = diamond();
        registry
            .register(step("after", Trigger::on(DONE), &[]), StepConfig::default())
            .expect("after");
        assert!(registry.validate(&[SEED], DONE).is_err());

        let registry = diamond();
        let error = registry
            .validate(&[SEED], EventKind::new("Never"))
            .expect_err("terminal is never emitted");
        assert!(error.is_configuration());
        assert!(registry.validate(&[], DONE).is_err());
    }
}
