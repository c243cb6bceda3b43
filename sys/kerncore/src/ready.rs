// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ready table: one circular run queue per priority level.
//!
//! Each priority slot either is empty or names the *head* of a ring of
//! thread indices. Rings are represented as successor indices into a fixed
//! pool owned by the caller, rather than as linked pointers, so that the
//! structure can be mutated through ordinary `&mut` access without aliasing
//! tricks.
//!
//! Scheduling is two nested rules:
//!
//! - across priorities, the numerically smallest non-empty slot always
//!   wins; a ready higher-priority thread starves everything below it, and
//!   that's accepted;
//! - within a priority, the head advances one step per scheduling decision,
//!   which round-robins the ring's members.
//!
//! The caller must guarantee one ring is always populated (the idle
//! thread's), or [`ReadyTable::rotate`] has nothing to return.

/// Access to the successor link of a pooled ring member.
///
/// Implemented by the kernel's TCB type; tests implement it on a bare
/// index-holding struct.
pub trait RingNode {
    /// Index of this node's successor within its ring. A singleton ring
    /// links to itself.
    fn next(&self) -> usize;
    /// Replaces the successor link.
    fn set_next(&mut self, next: usize);
}

/// Fixed-size table of ring heads, indexed by priority. `N` is the number
/// of priority levels.
#[derive(Debug)]
pub struct ReadyTable<const N: usize> {
    heads: [Option<usize>; N],
}

impl<const N: usize> ReadyTable<N> {
    pub const fn new() -> Self {
        Self { heads: [None; N] }
    }

    /// Links `node` into the ring at `priority`.
    ///
    /// An empty slot gets `node` as a self-linked singleton. Otherwise
    /// `node` is spliced in just after the current head and then promoted
    /// to head, which makes the most recently inserted member the first to
    /// run once this ring is next rotated past.
    ///
    /// # Panics
    ///
    /// If `priority >= N` or `node` is out of range for `pool`.
    pub fn insert<T: RingNode>(
        &mut self,
        pool: &mut [T],
        priority: usize,
        node: usize,
    ) {
        match self.heads[priority] {
            None => {
                pool[node].set_next(node);
                self.heads[priority] = Some(node);
            }
            Some(head) => {
                let after = pool[head].next();
                pool[node].set_next(after);
                pool[head].set_next(node);
                self.heads[priority] = Some(node);
            }
        }
    }

    /// Returns the head of the most important non-empty ring *without*
    /// advancing it. This is how the first thread is chosen at startup, so
    /// that the first tick afterward visits the next ring member rather
    /// than skipping one.
    pub fn peek(&self) -> Option<usize> {
        self.heads.iter().find_map(|slot| *slot)
    }

    /// Makes one scheduling decision: finds the most important non-empty
    /// ring, advances its head to the successor, and returns the new head.
    ///
    /// Returns `None` only if every slot is empty, which a correctly
    /// initialized kernel (idle thread present) never observes.
    pub fn rotate<T: RingNode>(&mut self, pool: &[T]) -> Option<usize> {
        for slot in self.heads.iter_mut() {
            if let Some(head) = *slot {
                let next = pool[head].next();
                *slot = Some(next);
                return Some(next);
            }
        }
        None
    }

    /// Current head of the ring at `priority`, if any.
    pub fn head_of(&self, priority: usize) -> Option<usize> {
        self.heads[priority]
    }
}

impl<const N: usize> Default for ReadyTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
