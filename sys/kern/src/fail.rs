// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Support for recording kernel failures such that they can be found by
//! tooling.
//!
//! Two symbols make up the binary interface to debuggers:
//!
//! - `kern::fail::KERNEL_HAS_FAILED` is a `bool`, cleared before the
//!   kernel starts and set the moment [`die`] runs (explicitly or via
//!   `panic!`). Any other value means the kernel never booted or memory
//!   was corrupted on the way down.
//!
//! - `kern::fail::KERNEL_EPITAPH` holds as much of the failure reason (as
//!   UTF-8) as fits, padded with NULs; trim trailing NULs when printing.

use core::fmt::{Display, Write};
use core::sync::atomic::Ordering;

/// One-stop flag for kernel triage from a debugger.
#[used]
static mut KERNEL_HAS_FAILED: bool = false;

const EPITAPH_LEN: usize = 96;

#[used]
static mut KERNEL_EPITAPH: [u8; EPITAPH_LEN] = [0; EPITAPH_LEN];

/// Records `msg` for the debugger and parks the CPU.
#[inline(never)]
pub fn die(msg: impl Display) -> ! {
    // Safety: this flag is only touched here, and a second arrival means a
    // recursive panic; parking immediately avoids making that worse.
    let previous = unsafe {
        core::ptr::replace(core::ptr::addr_of_mut!(KERNEL_HAS_FAILED), true)
    };
    if previous {
        park();
    }

    // Safety: the flag above admits exactly one writer.
    let buf = unsafe { &mut *core::ptr::addr_of_mut!(KERNEL_EPITAPH) };
    let mut eulogist = Eulogist { dest: &mut buf[..] };
    write!(eulogist, "{msg}").ok();

    park()
}

fn park() -> ! {
    loop {
        // Platform-independent NOP.
        core::sync::atomic::fence(Ordering::SeqCst);
    }
}

struct Eulogist<'a> {
    dest: &'a mut [u8],
}

impl Write for Eulogist<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let s = s.as_bytes();
        let n = s.len().min(self.dest.len());
        let (dest, leftovers) = core::mem::take(&mut self.dest).split_at_mut(n);
        dest.copy_from_slice(&s[..n]);
        self.dest = leftovers;
        Ok(())
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    die(info)
}
