//! Reactive Variables
//!
//! Typed, observable instrument parameters with synchronous one-directional
//! propagation. Inspired by QCodes Parameter and ScopeFoundry LoggedQuantity, with
//! the addition of standing links between variables of different devices.
//!
//! # Features
//!
//! - Type-safe values with metadata (name, units, description, read-only)
//! - Optional validation (range or custom) and a writer hook for driver write-through
//! - Propagation links: `set` on a source pushes the (optionally transformed) value to
//!   every linked target, in link order, recursively, on the calling thread
//! - Cycle rejection at link time
//! - Passive observers through `tokio::sync::watch` for UI threads
//! - Type-erased JSON access via [`VariableBase`] and [`VariableSet`]
//!
//! # Example
//!
//! ```rust
//! use lsm_core::variable::Variable;
//!
//! let exposure = Variable::new("exposure", 0.010).with_units("s");
//! let effective = Variable::new("effective_exposure", 0.0).with_units("s");
//! exposure.subscribe(&effective).unwrap();
//!
//! exposure.set(0.020).unwrap();
//! assert_eq!(effective.get(), 0.020);
//! ```
//!
//! # Concurrency
//!
//! Each variable owns a write gate held across commit and propagation, so writes to one
//! variable are serialized and a reader never observes a half-propagated update of that
//! variable's own links. Because the link graph is acyclic, gates are always taken in
//! link order and concurrent writers cannot deadlock. A writer hook or validator must not
//! write back into its own variable.
//!
//! Link creation is serialized process-wide: two threads wiring `a -> b` and `b -> a` at
//! the same time cannot both pass the cycle check.

use crate::error::{AppResult, InstrumentError};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

// =============================================================================
// Type Aliases
// =============================================================================

/// Validator callback type.
///
/// Returns an error message when the value is not acceptable.
pub type Validator<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Writer hook type, called with an accepted value before it is committed.
pub type Writer<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

type Push<T> = Box<dyn Fn(&T) -> AppResult<()> + Send + Sync>;

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Serializes link creation so the cycle check and the insert are one step.
static WIRING: Mutex<()> = parking_lot::const_mutex(());

/// Process-unique identity of a variable (shared by all clones of its handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u64);

/// Descriptive metadata for a variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMetadata {
    /// Variable name (unique within its device)
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Physical units (e.g., "s", "px", "um", "%")
    pub units: Option<String>,
    /// Whether `set` is rejected
    pub read_only: bool,
}

// =============================================================================
// Link Graph
// =============================================================================

/// Type-erased view of a variable as a node in the propagation graph.
trait LinkNode: Send + Sync {
    fn node_id(&self) -> VariableId;
    fn node_name(&self) -> String;
    fn downstream(&self) -> Vec<Arc<dyn LinkNode>>;
}

/// Outgoing edge of a variable.
struct Link<T> {
    target: Arc<dyn LinkNode>,
    push: Push<T>,
}

struct Shared<T> {
    id: VariableId,
    sender: watch::Sender<T>,
    metadata: RwLock<VariableMetadata>,
    validator: RwLock<Option<Validator<T>>>,
    writer: RwLock<Option<Writer<T>>>,
    links: RwLock<Vec<Arc<Link<T>>>>,
    write_gate: Mutex<()>,
}

impl<T> LinkNode for Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> VariableId {
        self.id
    }

    fn node_name(&self) -> String {
        self.metadata.read().name.clone()
    }

    fn downstream(&self) -> Vec<Arc<dyn LinkNode>> {
        self.links
            .read()
            .iter()
            .map(|link| link.target.clone())
            .collect()
    }
}

/// Whether `goal` can be reached from `start` by following links.
fn reaches(start: Arc<dyn LinkNode>, goal: VariableId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if node.node_id() == goal {
            return true;
        }
        if visited.insert(node.node_id()) {
            stack.extend(node.downstream());
        }
    }
    false
}

// =============================================================================
// Variable<T>
// =============================================================================

/// A thread-safe reactive value.
///
/// Cloning a `Variable` yields another handle to the same value, metadata and links.
pub struct Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.shared.id)
            .field("metadata", &*self.shared.metadata.read())
            .field("links", &self.shared.links.read().len())
            .finish_non_exhaustive()
    }
}

impl<T> Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new variable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            shared: Arc::new(Shared {
                id: VariableId(NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed)),
                sender,
                metadata: RwLock::new(VariableMetadata {
                    name: name.into(),
                    description: None,
                    units: None,
                    read_only: false,
                }),
                validator: RwLock::new(None),
                writer: RwLock::new(None),
                links: RwLock::new(Vec::new()),
                write_gate: Mutex::new(()),
            }),
        }
    }

    /// Add a description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.metadata.write().description = Some(description.into());
        self
    }

    /// Add physical units.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.metadata.write().units = Some(units.into());
        self
    }

    /// Mark this variable as read-only.
    pub fn read_only(self) -> Self {
        self.shared.metadata.write().read_only = true;
        self
    }

    /// Add a custom validator.
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.shared.validator.write() = Some(Arc::new(validator));
        self
    }

    /// Attach a writer hook (driver write-through).
    ///
    /// The hook runs after validation and before the value is committed. If it fails
    /// the value is unchanged and no link fires.
    pub fn with_writer<F>(self, writer: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.shared.writer.write() = Some(Arc::new(writer));
        self
    }

    /// Identity shared by all handles of this variable.
    pub fn id(&self) -> VariableId {
        self.shared.id
    }

    /// Current value. No side effects.
    pub fn get(&self) -> T {
        self.shared.sender.borrow().clone()
    }

    /// Variable name.
    pub fn name(&self) -> String {
        self.shared.metadata.read().name.clone()
    }

    /// Metadata snapshot.
    pub fn metadata(&self) -> VariableMetadata {
        self.shared.metadata.read().clone()
    }

    /// Number of outgoing propagation links.
    pub fn link_count(&self) -> usize {
        self.shared.links.read().len()
    }

    /// Check a value against read-only flag and validator without setting it.
    pub fn validate(&self, value: &T) -> AppResult<()> {
        let name = {
            let metadata = self.shared.metadata.read();
            if metadata.read_only {
                return Err(InstrumentError::ReadOnly(metadata.name.clone()));
            }
            metadata.name.clone()
        };

        let validator = self.shared.validator.read().clone();
        if let Some(validator) = validator {
            validator(value).map_err(|e| InstrumentError::Validation {
                variable: name,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Set a new value and propagate it through every outgoing link.
    ///
    /// Links fire in insertion order, synchronously, on the calling thread. Each target
    /// applies its own validation, writer and links before the next link fires.
    ///
    /// # Errors
    ///
    /// - `ReadOnly` / `Validation` if the value is rejected; nothing changes.
    /// - `DriverWrite` if the writer hook fails; nothing changes.
    /// - `Propagation` if a downstream write fails. This variable keeps the new value;
    ///   links after the failing one are not fired.
    pub fn set(&self, value: T) -> AppResult<()> {
        let _gate = self.shared.write_gate.lock();

        self.validate(&value)?;

        let writer = self.shared.writer.read().clone();
        if let Some(writer) = writer {
            writer(&value).map_err(|source| InstrumentError::DriverWrite {
                variable: self.name(),
                source,
            })?;
        }

        self.shared.sender.send_replace(value.clone());
        self.propagate(&value)
    }

    fn propagate(&self, value: &T) -> AppResult<()> {
        let links: Vec<Arc<Link<T>>> = self.shared.links.read().clone();
        if links.is_empty() {
            return Ok(());
        }

        trace!(variable = %self.name(), links = links.len(), "propagating");
        for link in links {
            (link.push)(value).map_err(|e| InstrumentError::Propagation {
                variable: self.name(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    /// Link this variable to `target` unchanged.
    pub fn subscribe(&self, target: &Variable<T>) -> AppResult<()> {
        self.subscribe_with(target, T::clone)
    }

    /// Link this variable to `target` through `transform`.
    ///
    /// Multiple links per source are permitted; they fire in the order they were added.
    ///
    /// # Errors
    ///
    /// `PropagationCycle` if `target` is this variable or can already reach it.
    pub fn subscribe_with<U, F>(&self, target: &Variable<U>, transform: F) -> AppResult<()>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let _wiring = WIRING.lock();
        let target_node: Arc<dyn LinkNode> = target.shared.clone();
        if reaches(target_node.clone(), self.shared.id) {
            return Err(InstrumentError::PropagationCycle {
                source_name: self.name(),
                target_name: target.name(),
            });
        }

        let downstream = target.clone();
        let push: Push<T> = Box::new(move |value| downstream.set(transform(value)));
        self.shared.links.write().push(Arc::new(Link {
            target: target_node,
            push,
        }));
        trace!(source = %self.name(), target = %target.name(), "linked");
        Ok(())
    }

    /// Passive observer for UI or logging threads.
    ///
    /// Observers never take part in propagation.
    pub fn watch(&self) -> watch::Receiver<T> {
        self.shared.sender.subscribe()
    }

    /// Number of live passive observers.
    pub fn watcher_count(&self) -> usize {
        self.shared.sender.receiver_count()
    }
}

impl<T> Variable<T>
where
    T: Clone + Send + Sync + PartialOrd + Debug + 'static,
{
    /// Add inclusive min/max range validation.
    pub fn with_range(self, min: T, max: T) -> Self {
        self.with_validator(move |value: &T| {
            if value < &min || value > &max {
                Err(anyhow::anyhow!(
                    "value {:?} out of range [{:?}, {:?}]",
                    value,
                    min,
                    max
                ))
            } else {
                Ok(())
            }
        })
    }
}

impl<T> Variable<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Current value as JSON.
    pub fn get_json(&self) -> AppResult<serde_json::Value> {
        serde_json::to_value(self.get()).map_err(|e| InstrumentError::Validation {
            variable: self.name(),
            message: format!("serialization failed: {}", e),
        })
    }

    /// Set the value from JSON.
    pub fn set_json(&self, json_value: serde_json::Value) -> AppResult<()> {
        let value: T = serde_json::from_value(json_value).map_err(|e| {
            InstrumentError::Validation {
                variable: self.name(),
                message: format!(
                    "failed to deserialize: {}. Expected type: {}",
                    e,
                    std::any::type_name::<T>()
                ),
            }
        })?;
        self.set(value)
    }
}

// =============================================================================
// VariableBase - Type-Erased Access
// =============================================================================

/// Type-erased access to a variable, used for enumeration and generic UIs.
pub trait VariableBase: Send + Sync {
    /// Variable name
    fn name(&self) -> String;

    /// Variable identity
    fn id(&self) -> VariableId;

    /// Metadata snapshot
    fn metadata(&self) -> VariableMetadata;

    /// Current value as JSON
    fn get_json(&self) -> AppResult<serde_json::Value>;

    /// Set the value from JSON (propagates)
    fn set_json(&self, value: serde_json::Value) -> AppResult<()>;

    /// Number of outgoing propagation links
    fn link_count(&self) -> usize;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl<T> VariableBase for Variable<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> String {
        Variable::name(self)
    }

    fn id(&self) -> VariableId {
        Variable::id(self)
    }

    fn metadata(&self) -> VariableMetadata {
        Variable::metadata(self)
    }

    fn get_json(&self) -> AppResult<serde_json::Value> {
        Variable::get_json(self)
    }

    fn set_json(&self, value: serde_json::Value) -> AppResult<()> {
        Variable::set_json(self, value)
    }

    fn link_count(&self) -> usize {
        Variable::link_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// VariableSet - A Device's Variables
// =============================================================================

/// The named variables a device exposes, ordered by name.
#[derive(Default)]
pub struct VariableSet {
    variables: BTreeMap<String, Box<dyn VariableBase>>,
}

impl std::fmt::Debug for VariableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableSet")
            .field("names", &self.names())
            .finish()
    }
}

impl VariableSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable handle under its own name.
    pub fn register<V>(&mut self, variable: V)
    where
        V: VariableBase + 'static,
    {
        self.variables.insert(variable.name(), Box::new(variable));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<V>(mut self, variable: V) -> Self
    where
        V: VariableBase + 'static,
    {
        self.register(variable);
        self
    }

    /// Variable by name.
    pub fn get(&self, name: &str) -> Option<&dyn VariableBase> {
        self.variables.get(name).map(|v| v.as_ref())
    }

    /// Variable by name with its concrete type.
    pub fn get_typed<T>(&self, name: &str) -> Option<&Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.variables
            .get(name)
            .and_then(|v| v.as_any().downcast_ref::<Variable<T>>())
    }

    /// Variable names in order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn VariableBase)> {
        self.variables
            .iter()
            .map(|(name, v)| (name.as_str(), v.as_ref()))
    }

    /// Total outgoing links over all variables.
    pub fn link_count(&self) -> usize {
        self.variables.values().map(|v| v.link_count()).sum()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_variable_basic() {
        let var = Variable::new("width", 1024u32);
        assert_eq!(var.get(), 1024);
        assert_eq!(var.name(), "width");

        var.set(512).unwrap();
        assert_eq!(var.get(), 512);
        assert_eq!(var.clone().get(), 512);
    }

    #[test]
    fn test_propagation_identity_and_transform() {
        let exposure = Variable::new("exposure", 0.01);
        let effective = Variable::new("effective_exposure", 0.0);
        let millis = Variable::new("exposure_ms", 0.0f64);

        exposure.subscribe(&effective).unwrap();
        exposure.subscribe_with(&millis, |s| s * 1000.0).unwrap();
        assert_eq!(exposure.link_count(), 2);

        exposure.set(0.02).unwrap();
        assert_eq!(effective.get(), 0.02);
        assert!((millis.get() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_propagation_is_transitive() {
        let a = Variable::new("a", 0i64);
        let b = Variable::new("b", 0i64);
        let c = Variable::new("c", 0i64);
        a.subscribe_with(&b, |v| v + 1).unwrap();
        b.subscribe_with(&c, |v| v * 10).unwrap();

        a.set(4).unwrap();
        assert_eq!(b.get(), 5);
        assert_eq!(c.get(), 50);
    }

    #[test]
    fn test_cross_type_link() {
        let height = Variable::new("stack_height", 2048u32);
        let image_height = Variable::new("image_height", 0u64);
        height.subscribe_with(&image_height, |h| u64::from(*h)).unwrap();

        height.set(1024).unwrap();
        assert_eq!(image_height.get(), 1024);
    }

    #[test]
    fn test_links_fire_in_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let source = Variable::new("source", 0);
        for label in ["first", "second", "third"] {
            let order = order.clone();
            let target = Variable::new(label, 0).with_validator(move |_| {
                order.lock().push(label);
                Ok(())
            });
            source.subscribe(&target).unwrap();
        }

        source.set(1).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_self_link_rejected() {
        let a = Variable::new("a", 0);
        let err = a.subscribe(&a).unwrap_err();
        assert!(matches!(err, InstrumentError::PropagationCycle { .. }));
        assert_eq!(a.link_count(), 0);
    }

    #[test]
    fn test_indirect_cycle_rejected() {
        let a = Variable::new("a", 0);
        let b = Variable::new("b", 0);
        let c = Variable::new("c", 0);
        a.subscribe(&b).unwrap();
        b.subscribe(&c).unwrap();

        let err = c.subscribe(&a).unwrap_err();
        assert!(matches!(err, InstrumentError::PropagationCycle { .. }));

        // Diamonds are not cycles
        a.subscribe(&c).unwrap();
        a.set(3).unwrap();
        assert_eq!(c.get(), 3);
    }

    #[test]
    fn test_range_validation() {
        let power = Variable::new("power", 0.0).with_range(0.0, 100.0);
        assert!(power.set(50.0).is_ok());
        assert!(matches!(
            power.set(150.0),
            Err(InstrumentError::Validation { .. })
        ));
        assert_eq!(power.get(), 50.0);
    }

    #[test]
    fn test_read_only() {
        let lambda = Variable::new("lambda", 9.4).read_only();
        assert!(matches!(lambda.set(1.0), Err(InstrumentError::ReadOnly(_))));
        assert_eq!(lambda.get(), 9.4);
    }

    #[test]
    fn test_writer_failure_leaves_value_and_skips_links() {
        let target = Variable::new("target", 0);
        let source = Variable::new("source", 0)
            .with_writer(|v: &i32| {
                if *v < 0 {
                    anyhow::bail!("driver refused negative value");
                }
                Ok(())
            });
        source.subscribe(&target).unwrap();

        let err = source.set(-1).unwrap_err();
        assert!(matches!(err, InstrumentError::DriverWrite { .. }));
        assert!(std::error::Error::source(&err)
            .is_some_and(|cause| cause.to_string().contains("driver refused")));
        assert_eq!(source.get(), 0);
        assert_eq!(target.get(), 0);

        source.set(7).unwrap();
        assert_eq!(target.get(), 7);
    }

    #[test]
    fn test_downstream_failure_reported_source_keeps_value() {
        let source = Variable::new("source", 0);
        let strict = Variable::new("strict", 0).with_range(0, 10);
        let after = Variable::new("after", 0);
        source.subscribe(&strict).unwrap();
        source.subscribe(&after).unwrap();

        let err = source.set(50).unwrap_err();
        assert!(matches!(err, InstrumentError::Propagation { .. }));
        assert_eq!(source.get(), 50);
        assert_eq!(strict.get(), 0);
        assert_eq!(after.get(), 0);
    }

    #[test]
    fn test_writer_called_once_per_set() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let var = Variable::new("exposure", 0.0).with_writer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        var.set(1.0).unwrap();
        var.set(2.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_watch_observer() {
        let var = Variable::new("value", 0);
        let mut rx = var.watch();
        assert_eq!(*rx.borrow(), 0);

        var.set(42).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
        assert_eq!(var.watcher_count(), 1);
    }

    #[test]
    fn test_json_access_propagates() {
        let source = Variable::new("exposure", 0.01).with_units("s");
        let target = Variable::new("effective", 0.0);
        source.subscribe(&target).unwrap();

        let base: &dyn VariableBase = &source;
        assert_eq!(base.get_json().unwrap(), serde_json::json!(0.01));
        base.set_json(serde_json::json!(0.5)).unwrap();
        assert_eq!(target.get(), 0.5);

        let err = base.set_json(serde_json::json!("fast")).unwrap_err();
        assert!(err.to_string().contains("deserialize"));
    }

    #[test]
    fn test_variable_set() {
        let exposure = Variable::new("exposure", 0.01);
        let on = Variable::new("laser_on", false);
        let target = Variable::new("other", 0.0);
        exposure.subscribe(&target).unwrap();

        let set = VariableSet::new().with(exposure.clone()).with(on);
        assert_eq!(set.names(), vec!["exposure", "laser_on"]);
        assert_eq!(set.link_count(), 1);
        assert!(set.get_typed::<f64>("exposure").is_some());
        assert!(set.get_typed::<bool>("exposure").is_none());
        assert!(set.get("missing").is_none());

        set.get_typed::<f64>("exposure").unwrap().set(0.3).unwrap();
        assert_eq!(exposure.get(), 0.3);
    }
}
