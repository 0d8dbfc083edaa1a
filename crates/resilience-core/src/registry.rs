//! The generic `Registry<Entry, Config>` shared by every primitive's
//! `XRegistry` facade (`CircuitBreakerRegistry`, `RateLimiterRegistry`, …).
//!
//! None of the teacher crate's patterns have a registry concept, so this
//! module is grounded on `agentreplay-plugins/core/src/registry.rs`'s
//! `parking_lot::RwLock<HashMap<String, _>>` shape, adapted to the
//! `computeIfAbsent`/config-store/lifecycle-event contract spec.md §3–4.1
//! describe.

use crate::events::{EventListeners, ResilienceEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The reserved configuration name that can never be replaced.
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Raised when an instance names a `baseConfig` that was never registered.
#[derive(Debug, Clone)]
pub struct ConfigurationNotFound(pub String);

impl fmt::Display for ConfigurationNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration {:?} not found", self.0)
    }
}

impl std::error::Error for ConfigurationNotFound {}

/// Implemented by a primitive's config type to support `baseConfig`
/// inheritance: fields explicitly set on `self` overlay the base, fields
/// left unset fall through to it.
pub trait Overlay: Clone {
    /// Returns a copy of `self` with every unset field taken from `base`.
    fn overlay(self, base: &Self) -> Self;
}

/// Lifecycle events a [`Registry`] publishes on every mutation.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A new entry was created via `computeIfAbsent`.
    EntryAdded {
        registry_name: &'static str,
        timestamp: Instant,
        entry_name: String,
    },
    /// An entry was removed.
    EntryRemoved {
        registry_name: &'static str,
        timestamp: Instant,
        entry_name: String,
    },
    /// An entry was replaced by a new one of the same name.
    EntryReplaced {
        registry_name: &'static str,
        timestamp: Instant,
        entry_name: String,
    },
}

impl ResilienceEvent for RegistryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::EntryAdded { .. } => "entry_added",
            RegistryEvent::EntryRemoved { .. } => "entry_removed",
            RegistryEvent::EntryReplaced { .. } => "entry_replaced",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RegistryEvent::EntryAdded { timestamp, .. }
            | RegistryEvent::EntryRemoved { timestamp, .. }
            | RegistryEvent::EntryReplaced { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RegistryEvent::EntryAdded { entry_name, .. }
            | RegistryEvent::EntryRemoved { entry_name, .. }
            | RegistryEvent::EntryReplaced { entry_name, .. } => entry_name,
        }
    }
}

/// One slot in the entry map: either under construction by the thread that
/// won `computeIfAbsent`, or already populated. Kept behind a per-name
/// `Mutex` so the factory never runs while the registry's outer lock is
/// held, satisfying spec.md §4.1's "the factory path must hold no lock
/// across user-supplied code that could recurse into the registry."
enum Slot<E> {
    Building,
    Ready(E),
}

/// A concurrent name→entry table with a parallel name→config store.
///
/// `computeIfAbsent` is the only entry point that creates entries; it is
/// atomic in the sense that concurrent calls for the same name run the
/// factory exactly once and all callers observe the same entry
/// (testable property 1 in spec.md §8).
pub struct Registry<E, C> {
    name: &'static str,
    entries: RwLock<HashMap<String, Arc<Mutex<Slot<E>>>>>,
    configurations: RwLock<HashMap<String, Arc<C>>>,
    event_listeners: EventListeners<RegistryEvent>,
}

impl<E, C> Registry<E, C>
where
    E: Clone,
    C: Overlay,
{
    /// Creates a registry whose default configuration is `default_config`.
    pub fn new(name: &'static str, default_config: C) -> Self {
        let mut configurations = HashMap::new();
        configurations.insert(DEFAULT_CONFIG_NAME.to_string(), Arc::new(default_config));
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            configurations: RwLock::new(configurations),
            event_listeners: EventListeners::new(),
        }
    }

    /// Registers additional event listeners for lifecycle events.
    pub fn add_event_listener<L>(&mut self, listener: L)
    where
        L: crate::events::EventListener<RegistryEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    /// Returns the entry named `name`, creating it via `factory` if absent.
    ///
    /// `factory` is invoked with no registry lock held, so it may itself
    /// look up other entries in this (or another) registry without
    /// deadlocking.
    pub fn compute_if_absent<F>(&self, name: &str, factory: F) -> E
    where
        F: FnOnce() -> E,
    {
        // Fast path: already present.
        if let Some(slot) = self.entries.read().get(name) {
            return Self::await_ready(slot);
        }

        // Insert a `Building` placeholder under the write lock, then drop
        // the registry lock before running `factory`.
        let slot = {
            let mut entries = self.entries.write();
            Arc::clone(
                entries
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::Building))),
            )
        };

        let mut guard = slot.lock();
        if let Slot::Ready(entry) = &*guard {
            return entry.clone();
        }

        let entry = factory();
        *guard = Slot::Ready(entry.clone());
        drop(guard);

        self.event_listeners.emit(&RegistryEvent::EntryAdded {
            registry_name: self.name,
            timestamp: Instant::now(),
            entry_name: name.to_string(),
        });

        entry
    }

    fn await_ready(slot: &Arc<Mutex<Slot<E>>>) -> E {
        loop {
            let guard = slot.lock();
            if let Slot::Ready(entry) = &*guard {
                return entry.clone();
            }
            // Another thread is still running the factory; release and spin.
            // `computeIfAbsent` factories are expected to be quick,
            // non-blocking constructors, so this is a short-lived wait.
            drop(guard);
            std::thread::yield_now();
        }
    }

    /// Returns the entry named `name`, if it exists.
    pub fn find(&self, name: &str) -> Option<E> {
        let entries = self.entries.read();
        let slot = entries.get(name)?;
        match &*slot.lock() {
            Slot::Ready(entry) => Some(entry.clone()),
            Slot::Building => None,
        }
    }

    /// Returns every currently-registered entry, keyed by name.
    pub fn get_all(&self) -> HashMap<String, E> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter_map(|(name, slot)| match &*slot.lock() {
                Slot::Ready(entry) => Some((name.clone(), entry.clone())),
                Slot::Building => None,
            })
            .collect()
    }

    /// Removes and returns the entry named `name`, if it existed. Emits
    /// `EntryRemoved` only when an entry was actually present.
    pub fn remove(&self, name: &str) -> Option<E> {
        let removed = self.entries.write().remove(name);
        let entry = removed.and_then(|slot| match Arc::try_unwrap(slot) {
            Ok(mutex) => match mutex.into_inner() {
                Slot::Ready(entry) => Some(entry),
                Slot::Building => None,
            },
            Err(shared) => match &*shared.lock() {
                Slot::Ready(entry) => Some(entry.clone()),
                Slot::Building => None,
            },
        });

        if entry.is_some() {
            self.event_listeners.emit(&RegistryEvent::EntryRemoved {
                registry_name: self.name,
                timestamp: Instant::now(),
                entry_name: name.to_string(),
            });
        }
        entry
    }

    /// Replaces the entry named `name` with `new_entry`, returning the old
    /// one if present. Emits `EntryReplaced` on success; a name with no
    /// prior entry is inserted but does not count as a replacement.
    pub fn replace(&self, name: &str, new_entry: E) -> Option<E> {
        let mut entries = self.entries.write();
        let old = entries
            .insert(
                name.to_string(),
                Arc::new(Mutex::new(Slot::Ready(new_entry))),
            )
            .and_then(|slot| match &*slot.lock() {
                Slot::Ready(entry) => Some(entry.clone()),
                Slot::Building => None,
            });
        drop(entries);

        if old.is_some() {
            self.event_listeners.emit(&RegistryEvent::EntryReplaced {
                registry_name: self.name,
                timestamp: Instant::now(),
                entry_name: name.to_string(),
            });
        }
        old
    }

    /// Registers a named configuration. Fails if `name` is `"default"`.
    pub fn add_configuration(&self, name: &str, config: C) -> Result<(), ConfigurationNotFound> {
        if name == DEFAULT_CONFIG_NAME {
            return Err(ConfigurationNotFound(
                "cannot replace the reserved \"default\" configuration".to_string(),
            ));
        }
        self.configurations
            .write()
            .insert(name.to_string(), Arc::new(config));
        Ok(())
    }

    /// Returns the configuration named `name`, if registered.
    pub fn get_configuration(&self, name: &str) -> Option<Arc<C>> {
        self.configurations.read().get(name).cloned()
    }

    /// Returns the `"default"` configuration.
    pub fn get_default_config(&self) -> Arc<C> {
        self.configurations
            .read()
            .get(DEFAULT_CONFIG_NAME)
            .cloned()
            .expect("default configuration is always present")
    }

    /// Resolves `base_config_name` and overlays `instance_config` onto it,
    /// implementing spec.md §4.1's `baseConfig` composition rule.
    pub fn resolve_with_base(
        &self,
        base_config_name: &str,
        instance_config: C,
    ) -> Result<C, ConfigurationNotFound> {
        let base = self
            .get_configuration(base_config_name)
            .ok_or_else(|| ConfigurationNotFound(base_config_name.to_string()))?;
        Ok(instance_config.overlay(&base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[derive(Clone)]
    struct TestConfig {
        limit: Option<usize>,
    }

    impl Overlay for TestConfig {
        fn overlay(self, base: &Self) -> Self {
            TestConfig {
                limit: self.limit.or(base.limit),
            }
        }
    }

    #[derive(Clone, PartialEq, Debug)]
    struct Entry(usize);

    #[test]
    fn compute_if_absent_runs_factory_once_per_name() {
        let registry: Registry<Entry, TestConfig> =
            Registry::new("test", TestConfig { limit: Some(10) });
        let calls = AtomicUsize::new(0);

        let a = registry.compute_if_absent("svc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Entry(1)
        });
        let b = registry.compute_if_absent("svc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Entry(2)
        });

        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_compute_if_absent_returns_same_instance() {
        let registry: Arc<Registry<Entry, TestConfig>> =
            Arc::new(Registry::new("test", TestConfig { limit: None }));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.compute_if_absent("shared", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Entry(42)
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|e| *e == Entry(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_emits_only_when_present() {
        let registry: Registry<Entry, TestConfig> = Registry::new("test", TestConfig { limit: None });
        assert!(registry.remove("missing").is_none());

        registry.compute_if_absent("present", || Entry(7));
        assert_eq!(registry.remove("present"), Some(Entry(7)));
        assert!(registry.find("present").is_none());
    }

    #[test]
    fn replace_returns_old_entry() {
        let registry: Registry<Entry, TestConfig> = Registry::new("test", TestConfig { limit: None });
        registry.compute_if_absent("svc", || Entry(1));
        let old = registry.replace("svc", Entry(2));
        assert_eq!(old, Some(Entry(1)));
        assert_eq!(registry.find("svc"), Some(Entry(2)));
    }

    #[test]
    fn add_configuration_rejects_default_name() {
        let registry: Registry<Entry, TestConfig> = Registry::new("test", TestConfig { limit: None });
        let result = registry.add_configuration(DEFAULT_CONFIG_NAME, TestConfig { limit: Some(1) });
        assert!(result.is_err());
    }

    #[test]
    fn resolve_with_base_overlays_unset_fields_only() {
        let registry: Registry<Entry, TestConfig> =
            Registry::new("test", TestConfig { limit: Some(100) });
        registry
            .add_configuration("shared", TestConfig { limit: Some(5) })
            .unwrap();

        let resolved = registry
            .resolve_with_base("shared", TestConfig { limit: None })
            .unwrap();
        assert_eq!(resolved.limit, Some(5));

        let resolved = registry
            .resolve_with_base("shared", TestConfig { limit: Some(9) })
            .unwrap();
        assert_eq!(resolved.limit, Some(9));
    }

    #[test]
    fn resolve_with_base_missing_name_errors() {
        let registry: Registry<Entry, TestConfig> = Registry::new("test", TestConfig { limit: None });
        let result = registry.resolve_with_base("nonexistent", TestConfig { limit: None });
        assert!(result.is_err());
    }
}
