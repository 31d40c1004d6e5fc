//! Canonical map view state with origin-arbitrated mutation
//!
//! Every write goes through [`ViewStateStore::mutate`] with an [`Origin`].
//! Within one tick (one batch of actions drained by the runtime) the first
//! applied mutation claims the tick; a later mutation from a strictly
//! lower-ranked origin is dropped. This keeps the widget's own move echo from
//! overwriting a search result applied moments earlier.

use std::fmt;

use tracing::debug;

use crate::view::{Origin, ViewPatch, ViewState};

/// Notification delivered to subscribers after an applied mutation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewChange {
    pub state: ViewState,
    pub origin: Origin,
    pub revision: u64,
}

/// Token returned by [`ViewStateStore::subscribe`]
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "keep the token to unsubscribe later"]
pub struct Unsubscribe(u64);

/// What happened to a mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutateOutcome {
    /// Applied; subscribers were notified with this revision.
    Applied(u64),
    /// Nothing differed from the current state.
    Unchanged,
    /// Lost to a higher-precedence mutation in the same tick.
    Dropped { winner: Origin },
    /// Held until the URL seed has been applied.
    Deferred,
}

impl MutateOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, MutateOutcome::Applied(_))
    }
}

type Listener = Box<dyn FnMut(&ViewChange) + Send>;

pub struct ViewStateStore {
    state: ViewState,
    revision: u64,
    tick: u64,
    tick_leader: Option<Origin>,
    seeded: bool,
    deferred: Vec<(ViewPatch, Origin)>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
}

impl fmt::Debug for ViewStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewStateStore")
            .field("state", &self.state)
            .field("revision", &self.revision)
            .field("tick", &self.tick)
            .field("tick_leader", &self.tick_leader)
            .field("seeded", &self.seeded)
            .field("deferred", &self.deferred.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ViewStateStore {
    pub fn new(initial: ViewState) -> Self {
        Self {
            state: initial,
            revision: 0,
            tick: 0,
            tick_leader: None,
            seeded: false,
            deferred: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Start a new tick. Precedence only arbitrates within a tick.
    pub fn begin_tick(&mut self) {
        self.tick += 1;
        self.tick_leader = None;
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Unsubscribe
    where
        F: FnMut(&ViewChange) + Send + 'static,
    {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        Unsubscribe(id)
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, token: Unsubscribe) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != token.0);
        self.listeners.len() != before
    }

    /// Apply `patch` on behalf of `origin`.
    ///
    /// Before the seed, only `Url`/`Default` writes go through; everything
    /// else is deferred and replayed by [`seed`](Self::seed).
    pub fn mutate(&mut self, patch: ViewPatch, origin: Origin) -> MutateOutcome {
        if !self.seeded && !matches!(origin, Origin::Url | Origin::Default) {
            debug!(%origin, "Deferring view mutation until seeded");
            self.deferred.push((patch, origin));
            return MutateOutcome::Deferred;
        }
        self.apply(patch, origin)
    }

    /// Apply the one-time seed, then replay deferred mutations in order.
    ///
    /// Returns the seed's own outcome.
    pub fn seed(&mut self, patch: ViewPatch, origin: Origin) -> MutateOutcome {
        let outcome = self.apply(patch, origin);
        self.seeded = true;
        for (patch, origin) in std::mem::take(&mut self.deferred) {
            self.apply(patch, origin);
        }
        outcome
    }

    fn apply(&mut self, patch: ViewPatch, origin: Origin) -> MutateOutcome {
        if let Some(leader) = self.tick_leader {
            if leader.outranks(origin) {
                debug!(
                    %origin,
                    winner = %leader,
                    tick = self.tick,
                    "Dropping view mutation outranked in this tick"
                );
                return MutateOutcome::Dropped { winner: leader };
            }
        }

        if !self.state.apply(&patch, origin) {
            return MutateOutcome::Unchanged;
        }

        self.tick_leader = Some(origin);
        self.revision += 1;
        let change = ViewChange {
            state: self.state,
            origin,
            revision: self.revision,
        };
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
        MutateOutcome::Applied(self.revision)
    }
}
