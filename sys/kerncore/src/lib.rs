// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware-independent parts of the kernel, written so they can be
//! compiled and tested on the host.
//!
//! The kernel proper (the `kern` crate) owns the statics, the interrupt
//! plumbing, and the assembly contracts; everything in here is a plain data
//! structure plus pure functions over it. Keeping this split means the
//! scheduling and dispatch logic gets exercised by ordinary `cargo test`
//! even though the kernel itself only ever runs on the target.

// Allow std-y things to be used in test. Note that this attribute is a bit
// of a trap for the programmer, because rust-analyzer by default seems to
// build things with test set. This means it's easy to introduce code
// incompatible with no_std without your editor hassling you about it.
// Beware.
#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod frame;
pub mod ready;
