// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted stand-in for the architecture layer.
//!
//! This exists so the kernel can be type-checked, linted, and driven by a
//! simulator on a development machine. There is no user/supervisor
//! distinction to enforce here, so the driver trampoline collapses to a
//! direct call, which preserves the dispatch semantics exactly. Nothing in
//! this module can actually context-switch; a simulator embedding the
//! kernel must supply its own notion of time and a `critical-section`
//! implementation.

use core::sync::atomic::{AtomicPtr, Ordering};

use abi::DriverCall;

use crate::thread::Tcb;

static CURRENT_THREAD_PTR: AtomicPtr<Tcb> =
    AtomicPtr::new(core::ptr::null_mut());

/// Records `tcb` as current; hosted builds only ever read this back for
/// inspection.
pub unsafe fn set_current_thread(tcb: *mut Tcb) {
    CURRENT_THREAD_PTR.store(tcb, Ordering::Relaxed);
}

/// The hosted build has no tick source; a simulator calls the scheduler
/// directly instead.
pub fn start_tick_timer() {}

pub fn acknowledge_tick_timer() {}

pub fn end_of_interrupt() {}

/// There is no context to restore on the host.
pub unsafe fn restore_first_context() -> ! {
    panic!("entering threads");
}

/// Privilege is not modeled on the host, so the caller is already allowed
/// to run driver code; dispatch directly.
pub fn supervisor_call(call: &mut DriverCall) {
    kerncore::drivers::dispatch(call);
}
