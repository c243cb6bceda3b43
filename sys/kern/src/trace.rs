// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel event tracing.
//!
//! A small ring of recent scheduler and dispatch events, kept in a named
//! static so a debugger can read it out of a stopped (or crashed) system.
//! This is the kernel's only logging that survives without a console.

use ringbuf::{ringbuf, ringbuf_entry};

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum Event {
    ThreadCreated { id: u32, priority: u8 },
    ContextSwitch { id: u32 },
    DriverRegistered { index: u32 },
}

ringbuf!(EVENTS, Event, 16);

pub(crate) fn event(event: Event) {
    ringbuf_entry!(EVENTS, event);
}
