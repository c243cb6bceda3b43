// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thread control blocks and thread creation.

use core::ffi::c_void;

use abi::{Code, Priority, ThreadEntry, ThreadState, MAX_THREAD_NAME_LEN};
use kerncore::frame;
use kerncore::ready::RingNode;

use crate::startup::with_kernel;
use crate::trace;

/// Capacity of the thread arena, idle thread included.
pub const MAX_THREADS: usize = 12;

/// Per-thread bookkeeping record.
///
/// TCBs live in a fixed arena inside the kernel singleton; the per-priority
/// ready rings link them together by arena index rather than by pointer.
#[repr(C)] // so the location of saved_sp is predictable
pub struct Tcb {
    /// Saved stack pointer, updated on every preemption and consumed by
    /// every restore. The context-switch assembly addresses this through
    /// the current-thread pointer at offset 0.
    // NOTE: it is critical that this field appear first!
    saved_sp: u32,
    priority: Priority,
    id: u32,
    state: ThreadState,
    name: heapless::String<MAX_THREAD_NAME_LEN>,
    /// Length of the thread's stack buffer, in words.
    stack_words: u32,
    /// Successor in this thread's priority ring.
    next: usize,
}

impl Tcb {
    fn new(
        id: u32,
        priority: Priority,
        name: &str,
        saved_sp: u32,
        stack_words: usize,
    ) -> Self {
        let mut bounded = heapless::String::new();
        // Truncation, not failure, when the caller's name is too long.
        for c in name.chars() {
            if bounded.push(c).is_err() {
                break;
            }
        }
        Self {
            saved_sp,
            priority,
            id,
            state: ThreadState::Ready,
            name: bounded,
            stack_words: stack_words as u32,
            next: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Stack buffer length in words, as supplied at creation.
    pub fn stack_words(&self) -> u32 {
        self.stack_words
    }

    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }
}

impl RingNode for Tcb {
    fn next(&self) -> usize {
        self.next
    }
    fn set_next(&mut self, next: usize) {
        self.next = next;
    }
}

/// Creates a thread and links it into the scheduler.
///
/// The caller supplies the stack buffer and keeps it alive for the life of
/// the thread, which the `'static` bound enforces; the initial saved
/// context is built at its high end. `name` is truncated to
/// [`MAX_THREAD_NAME_LEN`] bytes. The new thread becomes the head of its
/// priority's ring, so among equals the most recently created thread runs
/// first once that ring is next scheduled.
///
/// Errors: `INVALID_ARGUMENT` for an out-of-range priority or a stack
/// shorter than [`frame::MIN_STACK_WORDS`]; `OS_ERR` before
/// [`crate::startup::init`] or when the thread arena is full. No thread id
/// is consumed on any failure path.
pub fn create_thread(
    priority: Priority,
    name: &str,
    stack: &'static mut [u32],
    entry: ThreadEntry,
    arg: *mut c_void,
) -> Result<(), Code> {
    if priority.0 > Priority::IDLE.0 {
        return Err(Code::INVALID_ARGUMENT);
    }
    if stack.len() < frame::MIN_STACK_WORDS {
        return Err(Code::INVALID_ARGUMENT);
    }

    critical_section::with(|_cs| {
        with_kernel(|kernel| {
            if !kernel.initialized {
                return Err(Code::OS_ERR);
            }
            if kernel.thread_count() == MAX_THREADS {
                return Err(Code::OS_ERR);
            }

            let stack_words = stack.len();
            let new_top = frame::init_thread_stack(
                stack,
                entry as usize as u32,
                arg as usize as u32,
            )?;
            let saved_sp = stack[new_top..].as_ptr() as usize as u32;

            let id = kernel.next_id;
            kernel.next_id = kernel.next_id.wrapping_add(1);

            let tcb = Tcb::new(id, priority, name, saved_sp, stack_words);
            let index = kernel.push_thread(tcb);
            kernel.make_ready(index, priority);

            trace::event(trace::Event::ThreadCreated {
                id,
                priority: priority.0,
            });
            Ok(())
        })
    })
}
