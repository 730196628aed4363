//! Process-wide tracking of in-flight requests.
//!
//! The [`ActiveRequestRegistry`] records every request that is currently
//! [`Active`](crate::RequestState::Active), grouped by variant, so callers can
//! ask whether a kind of request is in flight and cancel all of them at once.
//!
//! # Example
//!
//! ```no_run
//! use connection_request::{ActiveRequestRegistry, VariantKey};
//!
//! struct FeedRefresh;
//!
//! let registry = ActiveRequestRegistry::global();
//! if registry.is_in_use(VariantKey::of::<FeedRefresh>()) {
//!     registry.cancel_all(VariantKey::of::<FeedRefresh>());
//! }
//! ```
//!
//! # Locking
//!
//! All mutations go through one mutex. Bulk cancellation snapshots the
//! matching entries, releases the lock, and only then calls `cancel()` on
//! each request; cancelling deregisters, which needs the lock again.
//! Requests take their own state lock before the registry lock, never the
//! other way round.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, instrument, warn};

use crate::request::ConnectionId;

static GLOBAL: LazyLock<Arc<ActiveRequestRegistry>> =
    LazyLock::new(|| Arc::new(ActiveRequestRegistry::new()));

/// Identifies a request variant (one logical kind of API call).
///
/// Any `'static` type can serve as the marker; its type name is kept for logs.
#[derive(Clone, Copy)]
pub struct VariantKey {
    type_id: TypeId,
    name: &'static str,
}

impl VariantKey {
    /// Key for marker type `V`.
    #[must_use]
    pub fn of<V: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<V>(),
            name: std::any::type_name::<V>(),
        }
    }

    /// Fully qualified name of the marker type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for VariantKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for VariantKey {}

impl std::hash::Hash for VariantKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Something the registry can cancel.
pub trait ActiveRequest: Send + Sync {
    /// Cancels the request; a no-op if it already finished.
    fn cancel(&self);
}

type VariantTable = HashMap<ConnectionId, Weak<dyn ActiveRequest>>;

/// Table of in-flight requests keyed by variant and connection id.
///
/// Entries are weak: the registry never keeps a request alive. Requests
/// remove themselves when they reach a terminal state.
#[derive(Default)]
pub struct ActiveRequestRegistry {
    entries: Mutex<HashMap<VariantKey, VariantTable>>,
}

impl ActiveRequestRegistry {
    /// Creates an empty registry.
    ///
    /// Most code uses [`global`](Self::global); separate instances are useful
    /// for isolating groups of requests (and tests).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by requests that do not inject one.
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VariantKey, VariantTable>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `request` as active.
    ///
    /// Returns `false` (and logs) if `id` is already registered; the existing
    /// entry is kept.
    #[instrument(level = "debug", skip_all, fields(variant = %variant, %id))]
    pub fn register(
        &self,
        variant: VariantKey,
        id: ConnectionId,
        request: Weak<dyn ActiveRequest>,
    ) -> bool {
        let mut entries = self.lock();
        let table = entries.entry(variant).or_default();
        if table.contains_key(&id) {
            warn!("duplicate registration ignored");
            return false;
        }
        table.insert(id, request);
        debug!(active = table.len(), "registered request");
        true
    }

    /// Removes `id`. Removing an unknown id is a no-op.
    pub fn deregister(&self, variant: VariantKey, id: ConnectionId) {
        let mut entries = self.lock();
        if let Some(table) = entries.get_mut(&variant) {
            if table.remove(&id).is_some() {
                debug!(%id, variant = %variant, remaining = table.len(), "deregistered request");
            }
            if table.is_empty() {
                entries.remove(&variant);
            }
        }
    }

    /// Returns true if at least one request of `variant` is active.
    #[must_use]
    pub fn is_in_use(&self, variant: VariantKey) -> bool {
        self.lock()
            .get(&variant)
            .is_some_and(|table| table.values().any(is_live))
    }

    /// Number of active requests of `variant`.
    #[must_use]
    pub fn active_count(&self, variant: VariantKey) -> usize {
        self.lock().get(&variant).map_or(0, live_count)
    }

    /// Number of active requests across all variants.
    #[must_use]
    pub fn total_active(&self) -> usize {
        self.lock().values().map(live_count).sum()
    }

    /// Cancels every request of `variant` active at the time of the call.
    ///
    /// Returns the number of requests that were asked to cancel. Requests
    /// registered while the sweep runs are not affected.
    #[instrument(level = "debug", skip_all, fields(variant = %variant))]
    pub fn cancel_all(&self, variant: VariantKey) -> usize {
        let snapshot: Vec<Weak<dyn ActiveRequest>> = self
            .lock()
            .get(&variant)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();
        cancel_snapshot(snapshot)
    }

    /// Cancels every active request of every variant.
    #[instrument(level = "debug", skip(self))]
    pub fn cancel_everything(&self) -> usize {
        let snapshot: Vec<Weak<dyn ActiveRequest>> = self
            .lock()
            .values()
            .flat_map(|table| table.values().cloned())
            .collect();
        cancel_snapshot(snapshot)
    }
}

/// Entries whose request was freed without deregistering are not counted.
fn is_live(request: &Weak<dyn ActiveRequest>) -> bool {
    request.strong_count() > 0
}

fn live_count(table: &HashMap<ConnectionId, Weak<dyn ActiveRequest>>) -> usize {
    table.values().filter(|request| is_live(request)).count()
}

fn cancel_snapshot(snapshot: Vec<Weak<dyn ActiveRequest>>) -> usize {
    let mut cancelled = 0;
    for request in snapshot.iter().filter_map(Weak::upgrade) {
        request.cancel();
        cancelled += 1;
    }
    debug!(cancelled, "cancellation sweep finished");
    cancelled
}

impl fmt::Debug for ActiveRequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        let counts: Vec<(&'static str, usize)> = entries
            .iter()
            .map(|(variant, table)| (variant.name(), table.len()))
            .collect();
        f.debug_struct("ActiveRequestRegistry")
            .field("variants", &counts)
            .finish()
    }
}

/// Returns true if a request of variant `V` is active in the global registry.
#[must_use]
pub fn is_in_use<V: ?Sized + 'static>() -> bool {
    ActiveRequestRegistry::global().is_in_use(VariantKey::of::<V>())
}

/// Cancels all active requests of variant `V` in the global registry.
pub fn cancel_all<V: ?Sized + 'static>() -> usize {
    ActiveRequestRegistry::global().cancel_all(VariantKey::of::<V>())
}

/// Cancels every active request in the global registry.
pub fn cancel_everything() -> usize {
    ActiveRequestRegistry::global().cancel_everything()
}
