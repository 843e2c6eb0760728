//! Reference-counted load/subscribe coordination.
//!
//! Every `fetch`/`subscribe` call bumps a per-`(context, item)` reference
//! count — tracked separately for fetches and subscribes and summed when
//! deciding residency (`spec.md` §4.6) — and the matching `unfetch`/
//! `unsubscribe` releases it. An item moves `Absent -> Loading -> Resident`
//! the first time any reference appears, and `Resident -> Unloading ->
//! Absent` once the total reference count across all contexts drops to
//! zero — but not immediately: unloading is debounced by `unload_delay` so
//! a handle that unsubscribes and resubscribes within one render tick
//! doesn't pay for a real teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, instrument};

use crate::context::{ContextId, ItemKey};

/// Errors raised while loading or unloading an item.
#[derive(Debug, Error, Clone)]
pub enum LoadError {
    #[error("load of {item} was cancelled before it completed")]
    Cancelled { item: ItemKey },

    #[error("backend rejected load of {item}: {message}")]
    Backend { item: ItemKey, message: String },
}

/// The actual load/unload work the coordinator drives. A
/// [`crate::model::Model`] implements this over its `Tree` and `DocStore`;
/// keeping it behind a trait lets the reference-counting state machine be
/// exercised without a real backend.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, item: &ItemKey) -> Result<(), String>;
    async fn unload(&self, item: &ItemKey);
}

/// Tracks in-flight work shared between the [`LoadCoordinator`]'s own
/// load/unload activity and a [`crate::mutator::Mutator`]'s outstanding
/// docstore round trips, so a single `wait_until_idle` can block until
/// both kinds of pending work have settled (`spec.md` §4.6: `whenNothing
/// Pending` waits on "every unack'd mutation", not just loads).
pub struct PendingGate {
    count: AtomicUsize,
    idle: Notify,
}

impl Default for PendingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingGate {
    pub fn new() -> Self {
        Self { count: AtomicUsize::new(0), idle: Notify::new() }
    }

    pub fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub async fn wait_until_idle(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }
}

/// Whether a reference was acquired through `fetch` (transient) or
/// `subscribe` (held open and kept live-updated). Counted separately per
/// item and summed for residency (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Fetch,
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Absent,
    Loading,
    Resident,
    Unloading,
}

struct ItemState {
    status: Status,
    fetch_refs: HashMap<ContextId, u64>,
    subscribe_refs: HashMap<ContextId, u64>,
    generation: u64,
}

impl ItemState {
    fn new() -> Self {
        Self { status: Status::Absent, fetch_refs: HashMap::new(), subscribe_refs: HashMap::new(), generation: 0 }
    }

    fn total_refs(&self) -> u64 {
        self.fetch_refs.values().sum::<u64>() + self.subscribe_refs.values().sum::<u64>()
    }

    fn refs_mut(&mut self, kind: LoadKind) -> &mut HashMap<ContextId, u64> {
        match kind {
            LoadKind::Fetch => &mut self.fetch_refs,
            LoadKind::Subscribe => &mut self.subscribe_refs,
        }
    }
}

/// One context's reference counts on one item, as captured for a
/// [`crate::snapshot::Bundle`] (`spec.md` §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRefcount {
    pub item: ItemKey,
    pub fetches: u64,
    pub subscribes: u64,
}

/// One context's full set of item refcounts, as captured for a
/// [`crate::snapshot::Bundle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub context: String,
    pub items: Vec<ItemRefcount>,
}

/// Per-`(context, item)` reference-counted load coordinator.
pub struct LoadCoordinator {
    loader: Arc<dyn Loader>,
    unload_delay: Duration,
    items: Mutex<HashMap<ItemKey, ItemState>>,
    pending: Arc<PendingGate>,
    /// When set, `acquire(.., LoadKind::Subscribe)` is downgraded to
    /// `LoadKind::Fetch` — `spec.md` §4.6's `fetchOnly` mode.
    fetch_only: bool,
}

impl LoadCoordinator {
    pub fn new(loader: Arc<dyn Loader>, unload_delay: Duration, pending: Arc<PendingGate>) -> Self {
        Self { loader, unload_delay, items: Mutex::new(HashMap::new()), pending, fetch_only: false }
    }

    pub fn with_fetch_only(mut self, fetch_only: bool) -> Self {
        self.fetch_only = fetch_only;
        self
    }

    fn effective_kind(&self, kind: LoadKind) -> LoadKind {
        if self.fetch_only {
            LoadKind::Fetch
        } else {
            kind
        }
    }

    /// Resolves once no load or debounced-unload activity, and no
    /// outstanding mutation, is in flight. A `Model` awaits this after a
    /// batch of `fetch`/`subscribe`/write calls to know when it is safe
    /// to, say, take a snapshot.
    pub async fn when_nothing_pending(&self) {
        self.pending.wait_until_idle().await;
    }

    /// References `item` under `context` as `kind`, loading it if this is
    /// the first reference to appear. `fetch` and `subscribe` share the
    /// same state machine; they differ in which refcount bucket they bump,
    /// summed together to decide residency.
    #[instrument(skip(self), fields(item = %item))]
    pub async fn acquire(&self, context: &ContextId, item: &ItemKey, kind: LoadKind) -> Result<(), LoadError> {
        let kind = self.effective_kind(kind);
        let should_load = {
            let mut items = self.items.lock().await;
            let state = items.entry(item.clone()).or_insert_with(ItemState::new);
            *state.refs_mut(kind).entry(context.clone()).or_insert(0) += 1;
            match state.status {
                Status::Absent => {
                    state.status = Status::Loading;
                    true
                }
                Status::Unloading => {
                    // A resubscribe raced a debounced unload; bump the
                    // generation so the scheduled teardown becomes a no-op.
                    state.generation += 1;
                    state.status = Status::Resident;
                    false
                }
                Status::Loading | Status::Resident => false,
            }
        };

        if !should_load {
            return Ok(());
        }

        self.pending.begin();
        let result = self.loader.load(item).await;
        self.pending.end();

        let mut items = self.items.lock().await;
        let state = items.get_mut(item).expect("item state present for in-flight load");
        match result {
            Ok(()) => {
                state.status = Status::Resident;
                Ok(())
            }
            Err(message) => {
                state.status = Status::Absent;
                state.refs_mut(kind).remove(context);
                Err(LoadError::Backend { item: item.clone(), message })
            }
        }
    }

    /// Releases one `kind` reference to `item` held under `context`. When
    /// the total reference count reaches zero, schedules a debounced
    /// unload.
    #[instrument(skip(self), fields(item = %item))]
    pub fn release(self: &Arc<Self>, context: &ContextId, item: &ItemKey, kind: LoadKind) {
        let kind = self.effective_kind(kind);
        let this = self.clone();
        let context = context.clone();
        let item = item.clone();
        tokio::spawn(async move {
            this.release_inner(&context, &item, kind).await;
        });
    }

    async fn release_inner(self: &Arc<Self>, context: &ContextId, item: &ItemKey, kind: LoadKind) {
        let (should_schedule, generation) = {
            let mut items = self.items.lock().await;
            let Some(state) = items.get_mut(item) else { return };
            let refs = state.refs_mut(kind);
            if let Some(count) = refs.get_mut(context) {
                *count -= 1;
                if *count == 0 {
                    refs.remove(context);
                }
            }
            self.schedule_if_drained(state)
        };

        if should_schedule {
            self.debounce_and_unload(item, generation).await;
        }
    }

    fn schedule_if_drained(&self, state: &mut ItemState) -> (bool, u64) {
        if state.total_refs() == 0 && state.status == Status::Resident {
            state.status = Status::Unloading;
            (true, state.generation)
        } else {
            (false, state.generation)
        }
    }

    async fn debounce_and_unload(self: &Arc<Self>, item: &ItemKey, generation: u64) {
        self.pending.begin();
        if !self.unload_delay.is_zero() {
            tokio::time::sleep(self.unload_delay).await;
        }

        let items = self.items.lock().await;
        let stale = match items.get(item) {
            Some(state) => state.generation != generation || state.total_refs() > 0,
            None => true,
        };
        drop(items);
        if stale {
            self.pending.end();
            return;
        }

        self.loader.unload(item).await;
        debug!(item = %item, "unloaded");

        let mut items = self.items.lock().await;
        if let Some(state) = items.get_mut(item) {
            if state.generation == generation {
                state.status = Status::Absent;
                items.remove(item);
            }
        }
        drop(items);
        self.pending.end();
    }

    /// Releases every reference `context` holds across all items at once.
    pub fn unload_context(self: &Arc<Self>, context: &ContextId) {
        let this = self.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let to_schedule: Vec<(ItemKey, u64)> = {
                let mut items = this.items.lock().await;
                let mut scheduled = Vec::new();
                for (key, state) in items.iter_mut() {
                    if !state.fetch_refs.contains_key(&context) && !state.subscribe_refs.contains_key(&context) {
                        continue;
                    }
                    state.fetch_refs.remove(&context);
                    state.subscribe_refs.remove(&context);
                    let (should_schedule, generation) = this.schedule_if_drained(state);
                    if should_schedule {
                        scheduled.push((key.clone(), generation));
                    }
                }
                scheduled
            };
            for (item, generation) in to_schedule {
                this.debounce_and_unload(&item, generation).await;
            }
        });
    }

    /// True if `item` currently has at least one reference resident.
    pub async fn is_resident(&self, item: &ItemKey) -> bool {
        matches!(self.items.lock().await.get(item).map(|s| s.status), Some(Status::Resident))
    }

    /// Captures every context's current fetch/subscribe refcounts, for a
    /// [`crate::snapshot::Bundle`] (`spec.md` §4.8).
    pub async fn snapshot(&self) -> Vec<ContextSnapshot> {
        let items = self.items.lock().await;
        let mut by_context: HashMap<ContextId, Vec<ItemRefcount>> = HashMap::new();
        for (item, state) in items.iter() {
            let mut contexts: Vec<&ContextId> = state.fetch_refs.keys().chain(state.subscribe_refs.keys()).collect();
            contexts.sort();
            contexts.dedup();
            for context in contexts {
                let fetches = *state.fetch_refs.get(context).unwrap_or(&0);
                let subscribes = *state.subscribe_refs.get(context).unwrap_or(&0);
                by_context.entry(context.clone()).or_default().push(ItemRefcount { item: item.clone(), fetches, subscribes });
            }
        }
        by_context.into_iter().map(|(context, items)| ContextSnapshot { context: context.as_str().to_string(), items }).collect()
    }

    /// Restores refcounts from a bundle and re-initiates loads so that
    /// every item with a positive refcount becomes resident again
    /// (`spec.md` §4.8: "re-initiate loads to match subscribe refcounts").
    pub async fn restore(&self, snapshot: &[ContextSnapshot]) {
        {
            let mut items = self.items.lock().await;
            items.clear();
            for ctx_snapshot in snapshot {
                let context = ContextId::new(ctx_snapshot.context.clone());
                for entry in &ctx_snapshot.items {
                    let state = items.entry(entry.item.clone()).or_insert_with(ItemState::new);
                    if entry.fetches > 0 {
                        state.fetch_refs.insert(context.clone(), entry.fetches);
                    }
                    if entry.subscribes > 0 {
                        state.subscribe_refs.insert(context.clone(), entry.subscribes);
                    }
                }
            }
        }

        let to_load: Vec<ItemKey> = {
            let items = self.items.lock().await;
            items.iter().filter(|(_, state)| state.total_refs() > 0).map(|(key, _)| key.clone()).collect()
        };

        for item in to_load {
            self.pending.begin();
            let result = self.loader.load(&item).await;
            self.pending.end();
            let mut items = self.items.lock().await;
            if let Some(state) = items.get_mut(&item) {
                state.status = if result.is_ok() { Status::Resident } else { Status::Absent };
            }
        }
    }
}
