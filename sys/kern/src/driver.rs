// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The driver dispatch layer.
//!
//! Drivers register a [`DriverInfo`] record; its table index becomes the
//! handle `open` returns. Every call marshals a typed descriptor through
//! the supervisor-call trampoline, so driver entry points always execute
//! in a privileged mode regardless of the caller's mode.
//!
//! Two return conventions coexist here. [`register`] and
//! [`open`] fail only in ways the kernel itself detects, so they return
//! `Result`. The four handle-based operations forward whatever status word
//! the driver produced, uninterpreted, so they return a bare [`Code`];
//! kernel-side validation failures (a bad handle) use the same encoding,
//! exactly as a driver would report its own argument errors.

use core::cell::RefCell;
use core::ffi::c_void;

use abi::{Code, DriverCall, DriverHandle, DriverInfo, DriverOp};
use critical_section::Mutex;
use kerncore::drivers::DriverTable;

use crate::trace;

static DRIVERS: Mutex<RefCell<DriverTable>> =
    Mutex::new(RefCell::new(DriverTable::new()));

/// Registers a driver. Registration is append-only and totally ordered;
/// the record's position in that order is the handle `open` will hand out
/// for it. Legal before `init`, and safe after `start` because the append
/// happens inside a critical section.
///
/// Errors: `INVALID_ARGUMENT` for an overlong name, `DRIVER_FULL` at
/// capacity.
pub fn register(info: &'static DriverInfo) -> Result<(), Code> {
    critical_section::with(|cs| {
        let mut table = DRIVERS.borrow_ref_mut(cs);
        table.register(info)?;
        trace::event(trace::Event::DriverRegistered {
            index: table.count() as u32 - 1,
        });
        Ok(())
    })
}

/// Opens the driver registered under `name`, forwarding `name`'s address
/// and `flags` to the driver's own open routine. Returns the driver's
/// handle if the driver reports success; a driver-reported error passes
/// through as the `Err` value.
///
/// Errors: `DRIVER_NOT_FOUND` when no registered name matches.
pub fn open(name: &str, flags: u32) -> Result<DriverHandle, Code> {
    let (handle, info) =
        critical_section::with(|cs| DRIVERS.borrow_ref(cs).lookup(name))
            .ok_or(Code::DRIVER_NOT_FOUND)?;

    let mut call = DriverCall::new(DriverOp::Open {
        f: info.open,
        context: name.as_ptr() as *mut c_void,
        flags,
    });
    crate::arch::supervisor_call(&mut call);

    if call.result.is_error() {
        Err(call.result)
    } else {
        Ok(handle)
    }
}

/// Dispatches `close` on the driver behind `handle`.
pub fn close(handle: DriverHandle, context: *mut c_void) -> Code {
    dispatch_through(handle, |d| DriverOp::Close {
        f: d.close,
        context,
    })
}

/// Dispatches `read` on the driver behind `handle`. `byte_count` is
/// in/out: capacity on entry, bytes transferred on return.
pub fn read(
    handle: DriverHandle,
    context: *mut c_void,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    dispatch_through(handle, |d| DriverOp::Read {
        f: d.read,
        context,
        buffer,
        byte_count,
    })
}

/// Dispatches `write` on the driver behind `handle`, with the same in/out
/// count convention as [`read`].
pub fn write(
    handle: DriverHandle,
    context: *mut c_void,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    dispatch_through(handle, |d| DriverOp::Write {
        f: d.write,
        context,
        buffer,
        byte_count,
    })
}

/// Dispatches `ioctl` on the driver behind `handle`.
pub fn ioctl(
    handle: DriverHandle,
    context: *mut c_void,
    control: u32,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code {
    dispatch_through(handle, |d| DriverOp::Ioctl {
        f: d.ioctl,
        context,
        control,
        buffer,
        byte_count,
    })
}

/// Common tail of the handle-based operations: validate the handle, build
/// the descriptor against *that* record, cross the trampoline, hand back
/// whatever status word came out.
fn dispatch_through(
    handle: DriverHandle,
    op_for: impl FnOnce(&'static DriverInfo) -> DriverOp,
) -> Code {
    let info = match critical_section::with(|cs| {
        DRIVERS.borrow_ref(cs).by_handle(handle)
    }) {
        Ok(info) => info,
        Err(code) => return code,
    };

    let mut call = DriverCall::new(op_for(info));
    crate::arch::supervisor_call(&mut call);
    call.result
}
