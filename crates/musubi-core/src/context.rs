//! Per-run shared state and the handle each step invocation receives.

use crate::progress::{NoopSink, Phase, ProgressNotice, ProgressSink};
use crate::step::StepName;
use dashmap::DashMap;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ContextKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key/value state shared by all steps of one run.
///
/// Values of any `Send + Sync` type are stored behind an `Arc` and retrieved
/// by downcasting. All operations take `&self`; concurrent writers to
/// different keys never interfere, writers to the same key race and the last
/// write wins.
///
/// # Examples
///
/// ```
/// use musubi_core::ContextStore;
///
/// let store = ContextStore::new();
/// store.insert("deductible", 0.05f64);
/// store.insert("rules", vec!["paint capped at 4500".to_string()]);
///
/// assert_eq!(store.get::<f64>("deductible").as_deref(), Some(&0.05));
/// assert_eq!(store.get_cloned::<Vec<String>>("rules").map(|r| r.len()), Some(1));
///
/// // Wrong type returns None
/// assert!(store.get::<String>("deductible").is_none());
/// ```
pub struct ContextStore {
    data: DashMap<ContextKey, Arc<dyn Any + Send + Sync>>,
    started_at: Instant,
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStore")
            .field("keys", &self.keys())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Inserts a value with the given key.
    ///
    /// If the key already exists, the previous value is replaced.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<ContextKey>, value: T) {
        self.data.insert(key.into(), Arc::new(value));
    }

    /// Returns the value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.data.get(key)?.value());
        value.downcast::<T>().ok()
    }

    /// Returns an owned copy of the value for the given key.
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.get::<T>(key).map(|value| T::clone(&value))
    }

    /// Removes a value by key and returns it.
    ///
    /// The entry is removed even when the type doesn't match.
    pub fn remove<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.data
            .remove(key)
            .and_then(|(_, value)| value.downcast::<T>().ok())
    }

    /// Returns `true` if the store contains a value for the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns a sorted snapshot of all keys.
    pub fn keys(&self) -> Vec<ContextKey> {
        let mut keys: Vec<ContextKey> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the store contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the time elapsed since the store was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Handle passed to a single step invocation.
///
/// Gives access to the run's [`ContextStore`], identifies the run and the
/// step, forwards progress notices to the run's sink and exposes the run's
/// cancellation signal.
pub struct Context {
    store: Arc<ContextStore>,
    run_id: RunId,
    step_name: StepName,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("step_name", &self.step_name)
            .field("store", &self.store)
            .finish()
    }
}

impl Context {
    /// Creates a handle bound to an existing run.
    pub fn new(
        store: Arc<ContextStore>,
        run_id: RunId,
        step_name: StepName,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            run_id,
            step_name,
            sink,
            cancel,
        }
    }

    /// Creates a handle with a fresh store, a discarding sink and a new run id.
    ///
    /// Useful for calling a step directly in tests.
    pub fn detached(step_name: impl Into<StepName>) -> Self {
        Self::new(
            Arc::new(ContextStore::new()),
            RunId::new(),
            step_name.into(),
            Arc::new(NoopSink),
            CancellationToken::new(),
        )
    }

    /// Returns the run's store.
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Returns a shared reference to the run's store.
    pub fn shared_store(&self) -> Arc<ContextStore> {
        Arc::clone(&self.store)
    }

    /// Inserts a value into the run's store.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<ContextKey>, value: T) {
        self.store.insert(key, value);
    }

    /// Reads a value from the run's store.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.store.get(key)
    }

    /// Reads an owned copy of a value from the run's store.
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.store.get_cloned(key)
    }

    /// Returns `true` if the run's store contains the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Returns the id of the current run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Returns the name of the step this handle was issued to.
    pub fn step_name(&self) -> &StepName {
        &self.step_name
    }

    /// Sends a free-form progress notice for this step.
    pub fn progress(&self, message: impl Into<String>) {
        self.sink.notify(ProgressNotice {
            run_id: self.run_id,
            step: self.step_name.clone(),
            phase: Phase::Progress,
            message: message.into(),
        });
    }

    /// Returns `true` once the run has been cancelled or has failed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the run is cancelled.
    ///
    /// Long external calls can race against this to stop early.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
