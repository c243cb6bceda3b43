// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The tick engine.
//!
//! Preemption in this kernel happens in exactly one place: the periodic
//! timer interrupt. The arch layer's ISR saves the outgoing thread's
//! context, calls `tick_and_reschedule`, and restores whatever thread is
//! current afterward. Between two ticks the active thread runs
//! uninterrupted, except by the ISR itself.

use core::sync::atomic::{AtomicU32, Ordering};

use abi::ThreadState;

use crate::startup::with_kernel;
use crate::trace;

/// Tick rate the arch layer programs into the timer.
pub const TICKS_PER_SEC: u32 = 100;

/// Ticks since `start`. Written only by the tick ISR; wraps after 2^32
/// ticks (just under 500 days at 100 Hz).
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Reads the tick counter. Safe from any context without locking, because
/// the ISR is the sole writer and the word is a single aligned load.
pub fn now() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// The tick pipeline: count the tick, acknowledge the timer and the
/// interrupt controller, and make one scheduling decision. Called from the
/// tick ISR, after the outgoing thread's context has been saved and before
/// the incoming thread's context is restored.
pub(crate) fn tick_and_reschedule() {
    // Sole writer; a plain load/store pair is enough on one core.
    TICKS.store(TICKS.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);

    crate::arch::acknowledge_tick_timer();
    crate::arch::end_of_interrupt();

    with_kernel(|kernel| {
        let previous = kernel.current;
        let Some(next) = kernel.rotate() else {
            // The idle ring makes the scan total; an empty table means a
            // tick arrived before start, which is a wiring bug.
            panic!();
        };
        kernel.current = Some(next);

        let threads = kernel.threads_mut();
        if previous != Some(next) {
            if let Some(prev) = previous {
                threads[prev].set_state(ThreadState::Ready);
            }
            threads[next].set_state(ThreadState::Active);
            trace::event(trace::Event::ContextSwitch {
                id: threads[next].id(),
            });
        }

        // Safety: pointer into the singleton's thread table; the ISR that
        // called us consumes it after we return.
        unsafe {
            crate::arch::set_current_thread(&mut threads[next]);
        }
    });
}
