// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A scratch-pad device, mostly for exercising the driver dispatch layer.
//!
//! The device is a single 64-byte pad. `write` replaces the pad's
//! contents, `read` copies them back out, and `ioctl` can clear the pad or
//! report its fill level. Every entry point follows the dispatch layer's
//! conventions: status words with the high-bit error sentinel, and in/out
//! byte counts (capacity on entry, bytes transferred on return).
//!
//! The pad lives behind a critical section because driver code can be
//! reached from any thread, and a tick may preempt one call mid-flight.

#![cfg_attr(not(test), no_std)]

use core::cell::RefCell;
use core::ffi::c_void;

use abi::{Code, DriverInfo};
use critical_section::Mutex;

/// Name the driver registers under.
pub const DEVICE_NAME: &str = "scratch0";

/// Pad capacity in bytes.
pub const CAPACITY: usize = 64;

/// ioctl: clear the pad.
pub const IOCTL_RESET: u32 = 1;
/// ioctl: write the current fill level (a little-endian u32) into the
/// caller's buffer.
pub const IOCTL_FILL_LEVEL: u32 = 2;

struct Pad {
    bytes: [u8; CAPACITY],
    fill: usize,
}

static PAD: Mutex<RefCell<Pad>> = Mutex::new(RefCell::new(Pad {
    bytes: [0; CAPACITY],
    fill: 0,
}));

/// The registration record for this device.
pub static DRIVER: DriverInfo = DriverInfo {
    name: DEVICE_NAME,
    open,
    close,
    read,
    write,
    ioctl,
};

fn open(_context: *mut c_void, flags: u32) -> Code {
    // No open modes are defined.
    if flags != 0 {
        return Code::INVALID_ARGUMENT;
    }
    Code::SUCCESS
}

fn close(_context: *mut c_void) -> Code {
    Code::SUCCESS
}

fn write(
    _context: *mut c_void,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    if buffer.is_null() || byte_count.is_null() {
        return Code::INVALID_ARGUMENT;
    }
    // Safety: per the dispatch contract, buffer holds at least *byte_count
    // readable bytes, both owned by the suspended caller.
    let requested = unsafe { *byte_count } as usize;
    let n = requested.min(CAPACITY);
    let source =
        unsafe { core::slice::from_raw_parts(buffer as *const u8, n) };

    critical_section::with(|cs| {
        let mut pad = PAD.borrow_ref_mut(cs);
        pad.bytes[..n].copy_from_slice(source);
        pad.fill = n;
    });

    // Report how much actually landed; a too-large write is truncated,
    // not failed.
    unsafe { *byte_count = n as u32 };
    Code::SUCCESS
}

fn read(
    _context: *mut c_void,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    if buffer.is_null() || byte_count.is_null() {
        return Code::INVALID_ARGUMENT;
    }
    // Safety: as in `write`, but the buffer is written up to the
    // caller-stated capacity.
    let capacity = unsafe { *byte_count } as usize;

    let n = critical_section::with(|cs| {
        let pad = PAD.borrow_ref(cs);
        let n = pad.fill.min(capacity);
        let dest =
            unsafe { core::slice::from_raw_parts_mut(buffer as *mut u8, n) };
        dest.copy_from_slice(&pad.bytes[..n]);
        n
    });

    unsafe { *byte_count = n as u32 };
    Code::SUCCESS
}

fn ioctl(
    _context: *mut c_void,
    control: u32,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    match control {
        IOCTL_RESET => {
            critical_section::with(|cs| {
                let mut pad = PAD.borrow_ref_mut(cs);
                pad.fill = 0;
                pad.bytes = [0; CAPACITY];
            });
            Code::SUCCESS
        }
        IOCTL_FILL_LEVEL => {
            if buffer.is_null() || byte_count.is_null() {
                return Code::INVALID_ARGUMENT;
            }
            // Safety: dispatch contract; the level is reported as 4
            // little-endian bytes and needs that much room.
            let capacity = unsafe { *byte_count } as usize;
            if capacity < 4 {
                return Code::INVALID_ARGUMENT;
            }
            let level =
                critical_section::with(|cs| PAD.borrow_ref(cs).fill as u32);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    level.to_le_bytes().as_ptr(),
                    buffer as *mut u8,
                    4,
                );
                *byte_count = 4;
            }
            Code::SUCCESS
        }
        _ => Code::INVALID_ARGUMENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr;

    use abi::{DriverCall, DriverOp};
    use kerncore::drivers::{dispatch, DriverTable};

    // The pad is process-global state, so tests that touch it must not
    // interleave.
    static PAD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn reset_pad() {
        let mut count = 0u32;
        assert_eq!(
            ioctl(ptr::null_mut(), IOCTL_RESET, ptr::null_mut(), &mut count),
            Code::SUCCESS
        );
    }

    fn fill_level() -> u32 {
        let mut level = [0u8; 4];
        let mut count = 4u32;
        assert_eq!(
            ioctl(
                ptr::null_mut(),
                IOCTL_FILL_LEVEL,
                level.as_mut_ptr() as *mut c_void,
                &mut count,
            ),
            Code::SUCCESS
        );
        assert_eq!(count, 4);
        u32::from_le_bytes(level)
    }

    #[test]
    fn open_rejects_unknown_flags() {
        assert_eq!(open(ptr::null_mut(), 1), Code::INVALID_ARGUMENT);
        assert_eq!(open(ptr::null_mut(), 0), Code::SUCCESS);
    }

    #[test]
    fn write_then_read_round_trips() {
        let _guard = PAD_LOCK.lock().unwrap();
        reset_pad();

        let mut payload = *b"hello pad";
        let mut count = payload.len() as u32;
        assert_eq!(
            write(
                ptr::null_mut(),
                payload.as_mut_ptr() as *mut c_void,
                &mut count,
            ),
            Code::SUCCESS
        );
        assert_eq!(count as usize, payload.len());
        assert_eq!(fill_level() as usize, payload.len());

        let mut out = [0u8; 32];
        let mut count = out.len() as u32;
        assert_eq!(
            read(ptr::null_mut(), out.as_mut_ptr() as *mut c_void, &mut count),
            Code::SUCCESS
        );
        assert_eq!(&out[..count as usize], b"hello pad");
    }

    #[test]
    fn oversized_write_is_truncated() {
        let _guard = PAD_LOCK.lock().unwrap();
        reset_pad();

        let mut payload = [7u8; CAPACITY + 13];
        let mut count = payload.len() as u32;
        assert_eq!(
            write(
                ptr::null_mut(),
                payload.as_mut_ptr() as *mut c_void,
                &mut count,
            ),
            Code::SUCCESS
        );
        assert_eq!(count as usize, CAPACITY, "write reports the truncation");
        assert_eq!(fill_level() as usize, CAPACITY);
    }

    #[test]
    fn read_stops_at_fill_level() {
        let _guard = PAD_LOCK.lock().unwrap();
        reset_pad();

        let mut payload = *b"abc";
        let mut count = 3u32;
        assert_eq!(
            write(
                ptr::null_mut(),
                payload.as_mut_ptr() as *mut c_void,
                &mut count,
            ),
            Code::SUCCESS
        );

        let mut out = [0xAAu8; 16];
        let mut count = out.len() as u32;
        assert_eq!(
            read(ptr::null_mut(), out.as_mut_ptr() as *mut c_void, &mut count),
            Code::SUCCESS
        );
        assert_eq!(count, 3, "read transfers only what the pad holds");
        assert_eq!(&out[..3], b"abc");
        assert_eq!(out[3], 0xAA, "bytes past the transfer are untouched");
    }

    #[test]
    fn reset_clears_the_pad() {
        let _guard = PAD_LOCK.lock().unwrap();
        let mut payload = *b"xyz";
        let mut count = 3u32;
        assert_eq!(
            write(
                ptr::null_mut(),
                payload.as_mut_ptr() as *mut c_void,
                &mut count,
            ),
            Code::SUCCESS
        );
        reset_pad();
        assert_eq!(fill_level(), 0);
    }

    #[test]
    fn null_pointers_are_rejected() {
        let mut count = 4u32;
        assert_eq!(
            write(ptr::null_mut(), ptr::null_mut(), &mut count),
            Code::INVALID_ARGUMENT
        );
        assert_eq!(
            read(ptr::null_mut(), ptr::null_mut(), &mut count),
            Code::INVALID_ARGUMENT
        );
        let mut buf = [0u8; 4];
        assert_eq!(
            ioctl(
                ptr::null_mut(),
                IOCTL_FILL_LEVEL,
                buf.as_mut_ptr() as *mut c_void,
                ptr::null_mut(),
            ),
            Code::INVALID_ARGUMENT
        );
    }

    #[test]
    fn unknown_ioctl_is_rejected() {
        let mut count = 0u32;
        assert_eq!(
            ioctl(ptr::null_mut(), 99, ptr::null_mut(), &mut count),
            Code::INVALID_ARGUMENT
        );
    }

    // The same flow the kernel's dispatch layer performs, driven through
    // the registry and descriptor machinery end to end.
    #[test]
    fn dispatch_end_to_end() {
        let _guard = PAD_LOCK.lock().unwrap();
        reset_pad();

        let mut table = DriverTable::new();
        table.register(&DRIVER).unwrap();
        let (handle, info) = table.lookup(DEVICE_NAME).unwrap();
        assert_eq!(handle, 0);

        let mut payload = [5u8, 6, 7];
        let mut count = 3u32;
        let mut call = DriverCall::new(DriverOp::Write {
            f: info.write,
            context: ptr::null_mut(),
            buffer: payload.as_mut_ptr() as *mut c_void,
            byte_count: &mut count,
        });
        dispatch(&mut call);
        assert_eq!(call.result, Code::SUCCESS);
        assert_eq!(count, 3);

        let mut out = [0u8; 8];
        let mut count = out.len() as u32;
        let mut call = DriverCall::new(DriverOp::Read {
            f: info.read,
            context: ptr::null_mut(),
            buffer: out.as_mut_ptr() as *mut c_void,
            byte_count: &mut count,
        });
        dispatch(&mut call);
        assert_eq!(call.result, Code::SUCCESS);
        assert_eq!(&out[..count as usize], &[5, 6, 7]);
    }
}
