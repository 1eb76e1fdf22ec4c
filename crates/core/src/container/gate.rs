//! Exactly-once creation gates for strict singletons.
//!
//! The table records which thread holds each gate and which gate each blocked
//! thread is waiting for. A wait that would close a loop across threads fails
//! with `CircularDependency` instead of blocking.

use crate::container::descriptor::{DescriptorId, ServiceId};
use crate::errors::ContainerError;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct GateTable {
    holders: HashMap<DescriptorId, (ThreadId, ServiceId)>,
    waiting: HashMap<ThreadId, DescriptorId>,
}

impl GateTable {
    /// Follow holders and their waits from `requested`; returns the rendered
    /// cycle when the path leads back to a gate held by `me`
    fn wait_cycle(&self, requested: DescriptorId, me: ThreadId) -> Option<String> {
        let mut path = vec![requested];
        let mut gate = requested;

        loop {
            let &(holder, _) = self.holders.get(&gate)?;
            if holder == me {
                break;
            }
            gate = *self.waiting.get(&holder)?;
            if path.contains(&gate) {
                return None;
            }
            path.push(gate);
        }

        path.push(requested);
        Some(
            path.iter()
                .filter_map(|id| self.holders.get(id))
                .map(|(_, service)| service.type_name())
                .collect::<Vec<_>>()
                .join(" -> "),
        )
    }
}

/// Per-registration creation locks shared by every thread resolving from one container
#[derive(Default)]
pub(crate) struct CreationGates {
    table: Mutex<GateTable>,
    released: Condvar,
}

impl CreationGates {
    /// Block until the gate for `id` is free, or fail if waiting would deadlock
    pub(crate) fn acquire(&self, id: DescriptorId, service: ServiceId) -> Result<GateGuard<'_>, ContainerError> {
        let me = thread::current().id();
        let mut table = self
            .table
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("singleton creation gates"))?;

        loop {
            if !table.holders.contains_key(&id) {
                table.holders.insert(id, (me, service));
                return Ok(GateGuard { gates: self, id });
            }

            if let Some(chain) = table.wait_cycle(id, me) {
                tracing::warn!(service = %service, chain = %chain, "Singleton creation would deadlock across threads");
                return Err(ContainerError::CircularDependency { chain });
            }

            table.waiting.insert(me, id);
            table = self
                .released
                .wait(table)
                .map_err(|_| ContainerError::lock_poisoned("singleton creation gates"))?;
            table.waiting.remove(&me);
        }
    }
}

/// Held while one thread creates a strict singleton
#[must_use = "the gate is released as soon as the guard is dropped"]
pub(crate) struct GateGuard<'a> {
    gates: &'a CreationGates,
    id: DescriptorId,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.gates.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.holders.remove(&self.id);
        drop(table);
        self.gates.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    struct First;
    struct Second;

    #[test]
    fn test_gate_is_released_on_drop() {
        let gates = CreationGates::default();
        let id = DescriptorId(0);
        {
            let _guard = gates.acquire(id, ServiceId::of::<First>()).unwrap();
        }
        assert!(gates.acquire(id, ServiceId::of::<First>()).is_ok());
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let gates = Arc::new(CreationGates::default());
        let guard_gates = gates.clone();
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = thread::spawn(move || {
            let _guard = guard_gates.acquire(DescriptorId(0), ServiceId::of::<First>()).unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });

        held_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        assert!(gates.acquire(DescriptorId(0), ServiceId::of::<First>()).is_ok());
        holder.join().unwrap();
    }

    #[test]
    fn test_crossed_waits_report_a_cycle() {
        let gates = Arc::new(CreationGates::default());
        let first = DescriptorId(0);
        let second = DescriptorId(1);

        let held = gates.acquire(first, ServiceId::of::<First>()).unwrap();

        let other_gates = gates.clone();
        let (done_tx, done_rx) = mpsc::channel();
        let other = thread::spawn(move || {
            let _second = other_gates.acquire(second, ServiceId::of::<Second>()).unwrap();
            // blocks until the main thread fails and releases `first`
            let result = other_gates.acquire(first, ServiceId::of::<First>()).map(|_| ());
            done_tx.send(result).unwrap();
        });

        // wait until the other thread is blocked on `first`
        loop {
            let table = gates.table.lock().unwrap();
            if table.waiting.values().any(|id| *id == first) {
                break;
            }
            drop(table);
            thread::sleep(Duration::from_millis(5));
        }

        match gates.acquire(second, ServiceId::of::<Second>()) {
            Err(ContainerError::CircularDependency { chain }) => {
                let a = std::any::type_name::<First>();
                let b = std::any::type_name::<Second>();
                assert_eq!(chain, format!("{b} -> {a} -> {b}"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected a cycle"),
        }

        drop(held);
        let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.is_ok());
        other.join().unwrap();
    }
}
