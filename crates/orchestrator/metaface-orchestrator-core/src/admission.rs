//! Process-wide admission gate for new builds.
//!
//! Submitting a build (counting it, handing out its queue entry) happens on the
//! owner thread and never blocks. The worker then waits for one of `capacity`
//! slots before running any inference, so at most `capacity` builds across all
//! actors hold models at once. A queued build whose request is cancelled leaves
//! without taking a slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Builds allowed to run inference at the same time.
pub const DEFAULT_CAPACITY: usize = 2;

/// How often a queued worker re-checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct Slots {
    admitted: u64,
    queued: usize,
    active: usize,
}

#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    slots: Mutex<Slots>,
    freed: Condvar,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// A submitted build waiting for a slot. Dropping it withdraws the build.
#[derive(Debug)]
pub struct QueuedBuild {
    gate: Option<Arc<AdmissionGate>>,
}

/// Held by a running build; releases its slot on drop.
#[derive(Debug)]
pub struct BuildTicket {
    gate: Arc<AdmissionGate>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate letting `capacity` builds run at once. Zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
            freed: Condvar::new(),
        }
    }

    /// Register a build. Never blocks; the returned entry waits for a slot on
    /// the worker thread.
    pub fn submit(self: &Arc<Self>) -> QueuedBuild {
        let mut slots = self.slots.lock();
        slots.admitted += 1;
        slots.queued += 1;
        QueuedBuild {
            gate: Some(Arc::clone(self)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Builds holding a slot. Never exceeds `capacity`.
    pub fn active(&self) -> usize {
        self.slots.lock().active
    }

    /// Builds submitted and still waiting for a slot.
    pub fn queued(&self) -> usize {
        self.slots.lock().queued
    }

    /// Builds submitted and not yet finished or withdrawn.
    pub fn outstanding(&self) -> usize {
        let slots = self.slots.lock();
        slots.queued + slots.active
    }

    /// Builds ever submitted.
    pub fn admitted(&self) -> u64 {
        self.slots.lock().admitted
    }
}

impl QueuedBuild {
    /// Wait for a free slot. Returns `None` once `cancel` is raised, without
    /// taking a slot.
    pub fn wait_for_slot(mut self, cancel: &AtomicBool) -> Option<BuildTicket> {
        let gate = self.gate.take()?;
        let mut slots = gate.slots.lock();
        loop {
            if cancel.load(Ordering::Acquire) {
                slots.queued -= 1;
                return None;
            }
            if slots.active < gate.capacity {
                break;
            }
            gate.freed.wait_for(&mut slots, CANCEL_POLL);
        }
        slots.queued -= 1;
        slots.active += 1;
        drop(slots);
        Some(BuildTicket { gate })
    }
}

impl Drop for QueuedBuild {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.slots.lock().queued -= 1;
        }
    }
}

impl Drop for BuildTicket {
    fn drop(&mut self) {
        self.gate.slots.lock().active -= 1;
        self.gate.freed.notify_all();
    }
}
