// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! In practice, this works by
//!
//! - Conditionally defining a nested module (below).
//! - `pub use`-ing its contents
//!
//! Thus, all architecture-specific types and functions show up right here
//! in the `arch` module, tailored for the current target. Each support
//! module must define the same set of names:
//!
//! - `set_current_thread` / the current-thread global the context-switch
//!   code addresses,
//! - `start_tick_timer`, `acknowledge_tick_timer`, `end_of_interrupt`,
//! - `restore_first_context`,
//! - `supervisor_call`.

/// Kernel debug logging. Off by default; the `klog-uart` feature routes it
/// to UART0 on the target. Arguments are not even evaluated when logging
/// is compiled out.
#[cfg(all(target_arch = "arm", feature = "klog-uart"))]
macro_rules! klog {
    ($s:expr) => { $crate::arch::klog_fmt(core::format_args!($s)) };
    ($s:expr, $($tt:tt)*) => {
        $crate::arch::klog_fmt(core::format_args!($s, $($tt)*))
    };
}

#[cfg(not(all(target_arch = "arm", feature = "klog-uart")))]
macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}

macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        pub mod lpc23xx;
        pub use lpc23xx::*;
    } else {
        // Hosted stand-in, for type-checking the kernel and running
        // simulations on a development machine.
        pub mod hosted;
        pub use hosted::*;
    }
}
