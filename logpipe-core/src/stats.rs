// SPDX-License-Identifier: Apache-2.0

//! Process-wide counter registry (spec §3 "Stats cluster", §4.7, §6 CSV format).
//!
//! Grounded on `original_source/lib/stats.c`: counters are keyed by `(component, id, instance)`
//! and carry a fixed set of counter-type slots; the CSV dump format
//! (`SourceName;SourceId;SourceInstance;State;Type;Number`) and the alive/dynamic/orphaned state
//! letters (`a`/`d`/`o`) are taken directly from that file.

use logpipe_common::MutexExt;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Counter type (spec §4.7, §6): one slot per type is kept per cluster key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterType {
    Dropped,
    Processed,
    Stored,
    Suppressed,
    Stamp,
}

impl CounterType {
    fn as_csv_str(self) -> &'static str {
        match self {
            CounterType::Dropped => "dropped",
            CounterType::Processed => "processed",
            CounterType::Stored => "stored",
            CounterType::Suppressed => "suppressed",
            CounterType::Stamp => "stamp",
        }
    }
}

/// A single counter slot. Either an owned atomic (the common case) or a read-only view over a
/// foreign atomic supplied via `register_external` (spec §4.7: "External counters are read-only
/// through the stats surface").
pub struct Counter {
    value: CounterStorage,
}

enum CounterStorage {
    Owned(AtomicI64),
    External(Arc<AtomicI64>),
}

impl Counter {
    pub fn new() -> Self {
        Counter {
            value: CounterStorage::Owned(AtomicI64::new(0)),
        }
    }

    fn external(atomic: Arc<AtomicI64>) -> Self {
        Counter {
            value: CounterStorage::External(atomic),
        }
    }

    pub fn get(&self) -> i64 {
        match &self.value {
            CounterStorage::Owned(v) => v.load(Ordering::SeqCst),
            CounterStorage::External(v) => v.load(Ordering::SeqCst),
        }
    }

    /// Increments the counter. A no-op on an external counter (spec §4.7: "writes via the
    /// generic counter API are no-ops on an external counter").
    pub fn increment(&self, delta: i64) {
        if let CounterStorage::Owned(v) = &self.value {
            v.fetch_add(delta, Ordering::SeqCst);
        }
    }

    fn is_external(&self) -> bool {
        matches!(self.value, CounterStorage::External(_))
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// `(component, id, instance)` identifying one stats cluster (spec §3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub component: String,
    pub id: String,
    pub instance: String,
}

/// Whether a cluster is actively held, lazily-instantiated, or left over after its last holder
/// unregistered (spec §4.7, §6 `State` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Alive,
    Dynamic,
    Orphaned,
}

impl ClusterState {
    fn as_csv_char(self) -> char {
        match self {
            ClusterState::Alive => 'a',
            ClusterState::Dynamic => 'd',
            ClusterState::Orphaned => 'o',
        }
    }
}

struct Cluster {
    ref_count: u32,
    dynamic: bool,
    counters: HashMap<CounterType, Arc<Counter>>,
}

impl Cluster {
    fn state(&self) -> ClusterState {
        if self.dynamic {
            ClusterState::Dynamic
        } else if self.ref_count > 0 {
            ClusterState::Alive
        } else {
            ClusterState::Orphaned
        }
    }
}

/// The process-wide counter registry (spec §4.7, §9 "mutable singleton"). Construct one per
/// process (or per test) and `drop` it at teardown; all mutation goes through `state`'s lock.
pub struct StatsRegistry {
    state: Mutex<HashMap<ClusterKey, Cluster>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        StatsRegistry {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// *register* — increments the cluster's reference count, creating it if absent, and
    /// returns the requested counter slot (creating that slot with a zero value if absent).
    pub fn register(&self, key: ClusterKey, counter_type: CounterType) -> Arc<Counter> {
        self.register_impl(key, counter_type, false)
    }

    /// *register-dynamic* — as `register`, but the cluster is marked dynamic: it survives
    /// `cleanup_orphans` un-removed even at zero ref-count (spec §4.7: "'Dynamic' counters carry
    /// their values into the cleanup scan un-removed").
    pub fn register_dynamic(&self, key: ClusterKey, counter_type: CounterType) -> Arc<Counter> {
        self.register_impl(key, counter_type, true)
    }

    fn register_impl(
        &self,
        key: ClusterKey,
        counter_type: CounterType,
        dynamic: bool,
    ) -> Arc<Counter> {
        let mut state = self.state.lock_or_panic();
        let cluster = state.entry(key).or_insert_with(|| Cluster {
            ref_count: 0,
            dynamic,
            counters: HashMap::new(),
        });
        cluster.ref_count += 1;
        cluster.dynamic = cluster.dynamic || dynamic;
        Arc::clone(
            cluster
                .counters
                .entry(counter_type)
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    /// *register-external(atomic_ref)* — presents a foreign atomic read-only through the stats
    /// surface (spec §4.7).
    pub fn register_external(
        &self,
        key: ClusterKey,
        counter_type: CounterType,
        atomic: Arc<AtomicI64>,
    ) -> Arc<Counter> {
        let mut state = self.state.lock_or_panic();
        let cluster = state.entry(key).or_insert_with(|| Cluster {
            ref_count: 0,
            dynamic: false,
            counters: HashMap::new(),
        });
        cluster.ref_count += 1;
        let counter = Arc::new(Counter::external(atomic));
        cluster.counters.insert(counter_type, Arc::clone(&counter));
        counter
    }

    /// *unregister* — decrements the cluster's reference count. At zero, the cluster's counter
    /// values remain (so a later restart of the same name sees prior values) but its `State`
    /// becomes `orphaned` until `cleanup_orphans` removes it (spec §4.7).
    ///
    /// This leaves the counter map entry (and therefore the live/external mask it carries) in
    /// place rather than clearing it, preserving the quirk documented in spec §9's open
    /// question and pinned in DESIGN.md: re-registering the same slot after the last holder
    /// unregistered returns the *existing* counter handle, not a fresh zeroed one.
    ///
    /// # Panics
    /// Panics if `key` is not currently registered (spec §7 kind 5: unregistering a counter not
    /// held is a fatal invariant violation).
    pub fn unregister(&self, key: &ClusterKey) {
        let mut state = self.state.lock_or_panic();
        let cluster = state
            .get_mut(key)
            .unwrap_or_else(|| panic!("unregister of unheld cluster {key:?} (fatal, §7 kind 5)"));
        assert!(
            cluster.ref_count > 0,
            "unregister of unheld cluster {key:?} (fatal, §7 kind 5)"
        );
        cluster.ref_count -= 1;
    }

    /// *cleanup-orphans* — removes clusters with `ref_count == 0` that are not marked dynamic
    /// (spec §4.7).
    pub fn cleanup_orphans(&self) {
        self.state
            .lock_or_panic()
            .retain(|_, cluster| cluster.ref_count > 0 || cluster.dynamic);
    }

    /// *foreach* — visits every `(key, type, value, state)` currently registered.
    pub fn foreach(&self, mut visit: impl FnMut(&ClusterKey, CounterType, i64, ClusterState)) {
        let state = self.state.lock_or_panic();
        for (key, cluster) in state.iter() {
            let cluster_state = cluster.state();
            let mut types: Vec<_> = cluster.counters.keys().copied().collect();
            types.sort();
            for counter_type in types {
                let counter = &cluster.counters[&counter_type];
                visit(key, counter_type, counter.get(), cluster_state);
            }
        }
    }

    /// *format-csv* — the stats dump format (spec §6): a header row followed by one row per
    /// `(key, type)` pair, fields escaped per the spec's quoting rule.
    pub fn format_csv(&self) -> String {
        let mut out = String::from("SourceName;SourceId;SourceInstance;State;Type;Number\n");
        self.foreach(|key, counter_type, value, state| {
            let _ = writeln!(
                out,
                "{};{};{};{};{};{}",
                csv_escape(&key.component),
                csv_escape(&key.id),
                csv_escape(&key.instance),
                state.as_csv_char(),
                counter_type.as_csv_str(),
                value
            );
        });
        out
    }

    /// *format-log-line* — a single human-readable summary line per cluster, for diagnostic
    /// logging rather than machine parsing.
    pub fn format_log_line(&self, key: &ClusterKey) -> Option<String> {
        let state = self.state.lock_or_panic();
        let cluster = state.get(key)?;
        let mut parts: Vec<_> = cluster
            .counters
            .iter()
            .map(|(t, c)| format!("{}={}", t.as_csv_str(), c.get()))
            .collect();
        parts.sort();
        Some(format!(
            "{}.{}.{}: {}",
            key.component,
            key.id,
            key.instance,
            parts.join(", ")
        ))
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Escapes one CSV field per spec §6: fields containing `;`, a newline, or a leading `"` are
/// quoted, with embedded `"` doubled as `\"`.
fn csv_escape(field: &str) -> String {
    let needs_quoting = field.contains(';') || field.contains('\n') || field.starts_with('"');
    if !needs_quoting {
        return field.to_string();
    }
    let mut escaped = String::with_capacity(field.len() + 2);
    escaped.push('"');
    for ch in field.chars() {
        if ch == '"' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

fn key(component: &str, id: &str, instance: &str) -> ClusterKey {
    ClusterKey {
        component: component.to_string(),
        id: id.to_string(),
        instance: instance.to_string(),
    }
}
