// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::BTreeMap;

/// A stably numbered position in the pool and the process currently in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub id: u32,
    pub pid: u32,
}

/// Slot id → pid for the workers of the current dispatch session.
#[derive(Debug)]
pub struct WorkerPool {
    max_workers: usize,
    slots: BTreeMap<u32, u32>,
}

impl WorkerPool {
    pub fn new(max_workers: u32) -> Self {
        Self {
            max_workers: max_workers.max(1) as usize,
            slots: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn is_saturated(&self) -> bool {
        self.slots.len() >= self.max_workers
    }

    /// Slots are numbered 1..=max_workers without gaps.
    pub fn next_slot_id(&self) -> u32 {
        self.slots.len() as u32 + 1
    }

    /// Tracks a new worker. Returns false (and tracks nothing) when the pool is full.
    pub fn insert(&mut self, slot: WorkerSlot) -> bool {
        if self.is_saturated() && !self.slots.contains_key(&slot.id) {
            return false;
        }
        self.slots.insert(slot.id, slot.pid);
        true
    }

    /// Puts a new process into an existing slot and returns the previous pid.
    pub fn replace(&mut self, id: u32, pid: u32) -> Option<u32> {
        let current = self.slots.get_mut(&id)?;
        Some(std::mem::replace(current, pid))
    }

    pub fn get(&self, id: u32) -> Option<WorkerSlot> {
        self.slots.get(&id).map(|pid| WorkerSlot { id, pid: *pid })
    }

    pub fn slots(&self) -> impl Iterator<Item = WorkerSlot> + '_ {
        self.slots.iter().map(|(id, pid)| WorkerSlot { id: *id, pid: *pid })
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
