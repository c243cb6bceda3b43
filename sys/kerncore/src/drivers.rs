// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver registry and the privileged half of driver dispatch.
//!
//! The registry is a fixed, append-only table of references to registration
//! records. A record's position in the table doubles as its handle: entries
//! are never removed, so handles stay valid for the life of the system.
//!
//! [`dispatch`] is the function the supervisor-call trampoline lands in. On
//! hardware it runs in supervisor mode; in host tests it is simply called
//! directly, which exercises identical logic because the descriptor carries
//! everything the dispatcher needs.

use abi::{Code, DriverCall, DriverInfo, DriverOp, MAX_DRIVER_NAME_LEN};

/// Capacity of the driver table.
pub const MAX_DRIVERS: usize = 32;

/// Fixed-size, append-only table of registered drivers.
#[derive(Debug)]
pub struct DriverTable {
    records: [Option<&'static DriverInfo>; MAX_DRIVERS],
    count: usize,
}

impl DriverTable {
    pub const fn new() -> Self {
        Self {
            records: [None; MAX_DRIVERS],
            count: 0,
        }
    }

    /// Number of live entries; indices `[0, count)` are valid handles.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Appends a registration record. Its index in the table becomes the
    /// handle `open` will hand out for it. Registration order is stable.
    pub fn register(&mut self, info: &'static DriverInfo) -> Result<(), Code> {
        if info.name.len() > MAX_DRIVER_NAME_LEN {
            return Err(Code::INVALID_ARGUMENT);
        }
        if self.count >= MAX_DRIVERS {
            return Err(Code::DRIVER_FULL);
        }
        self.records[self.count] = Some(info);
        self.count += 1;
        Ok(())
    }

    /// Scans the live entries, in registration order, for a name match.
    pub fn lookup(&self, name: &str) -> Option<(u32, &'static DriverInfo)> {
        self.records[..self.count]
            .iter()
            .enumerate()
            .find_map(|(index, record)| {
                record
                    .filter(|info| info.name == name)
                    .map(|info| (index as u32, info))
            })
    }

    /// Resolves a caller-supplied handle, rejecting anything outside the
    /// live range.
    pub fn by_handle(&self, handle: u32) -> Result<&'static DriverInfo, Code> {
        self.records[..self.count]
            .get(handle as usize)
            .copied()
            .flatten()
            .ok_or(Code::INVALID_ARGUMENT)
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a marshalled driver call and deposits the driver's status word
/// in the descriptor's result slot.
///
/// The descriptor pairs each entry-point pointer with its own argument
/// shape, so this function is total: there is no tag/arguments mismatch to
/// detect, and driver-produced status words pass through uninterpreted.
pub fn dispatch(call: &mut DriverCall) {
    call.result = match call.op {
        DriverOp::Open { f, context, flags } => f(context, flags),
        DriverOp::Close { f, context } => f(context),
        DriverOp::Read {
            f,
            context,
            buffer,
            byte_count,
        } => f(context, buffer, byte_count),
        DriverOp::Write {
            f,
            context,
            buffer,
            byte_count,
        } => f(context, buffer, byte_count),
        DriverOp::Ioctl {
            f,
            context,
            control,
            buffer,
            byte_count,
        } => f(context, control, buffer, byte_count),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ffi::c_void;
    use core::ptr;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Each entry point bumps its own counter so tests can tell exactly
    // which slot a dispatch reached.
    static OPEN_CALLS: AtomicU32 = AtomicU32::new(0);
    static CLOSE_CALLS: AtomicU32 = AtomicU32::new(0);
    static READ_CALLS: AtomicU32 = AtomicU32::new(0);
    static WRITE_CALLS: AtomicU32 = AtomicU32::new(0);
    static IOCTL_CALLS: AtomicU32 = AtomicU32::new(0);

    static LAST_WRITE: std::sync::Mutex<Vec<u8>> =
        std::sync::Mutex::new(Vec::new());

    // The counters and LAST_WRITE are process-global, so the tests that
    // dispatch through them must not interleave.
    static DISPATCH_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn t_open(_context: *mut c_void, _flags: u32) -> Code {
        OPEN_CALLS.fetch_add(1, Ordering::Relaxed);
        Code::SUCCESS
    }

    fn t_close(_context: *mut c_void) -> Code {
        CLOSE_CALLS.fetch_add(1, Ordering::Relaxed);
        Code::SUCCESS
    }

    fn t_read(
        _context: *mut c_void,
        _buffer: *mut c_void,
        _byte_count: *mut u32,
    ) -> Code {
        READ_CALLS.fetch_add(1, Ordering::Relaxed);
        Code::SUCCESS
    }

    fn t_write(
        _context: *mut c_void,
        buffer: *mut c_void,
        byte_count: *mut u32,
    ) -> Code {
        WRITE_CALLS.fetch_add(1, Ordering::Relaxed);
        let n = unsafe { *byte_count } as usize;
        let bytes =
            unsafe { core::slice::from_raw_parts(buffer as *const u8, n) };
        *LAST_WRITE.lock().unwrap() = bytes.to_vec();
        Code::SUCCESS
    }

    fn t_ioctl(
        _context: *mut c_void,
        _control: u32,
        _buffer: *mut c_void,
        _byte_count: *mut u32,
    ) -> Code {
        IOCTL_CALLS.fetch_add(1, Ordering::Relaxed);
        Code::SUCCESS
    }

    fn failing_open(_context: *mut c_void, _flags: u32) -> Code {
        Code::from_raw(0x8000_0777)
    }

    static TEST_DRIVER: DriverInfo = DriverInfo {
        name: "tstdrv1",
        open: t_open,
        close: t_close,
        read: t_read,
        write: t_write,
        ioctl: t_ioctl,
    };

    static GRUMPY_DRIVER: DriverInfo = DriverInfo {
        name: "grumpy",
        open: failing_open,
        close: t_close,
        read: t_read,
        write: t_write,
        ioctl: t_ioctl,
    };

    #[test]
    fn error_bit_law() {
        assert!(!Code::SUCCESS.is_error());
        for code in [
            Code::OS_ERR,
            Code::INVALID_ARGUMENT,
            Code::DRIVER_FULL,
            Code::DRIVER_NOT_FOUND,
        ] {
            assert!(code.is_error());
            assert_eq!(code.as_raw() & Code::ERROR_BIT, Code::ERROR_BIT);
        }
        // Any word without the sentinel is a success.
        assert!(!Code::from_raw(0x7FFF_FFFF).is_error());
    }

    #[test]
    fn registration_order_assigns_handles() {
        let mut table = DriverTable::new();
        table.register(&TEST_DRIVER).unwrap();
        table.register(&GRUMPY_DRIVER).unwrap();

        let (h, info) = table.lookup("tstdrv1").unwrap();
        assert_eq!(h, 0);
        assert_eq!(info.name, "tstdrv1");
        let (h, _) = table.lookup("grumpy").unwrap();
        assert_eq!(h, 1);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let mut table = DriverTable::new();
        table.register(&TEST_DRIVER).unwrap();
        assert!(table.lookup("missing").is_none());
    }

    #[test]
    fn overlong_name_is_rejected() {
        static LONG: DriverInfo = DriverInfo {
            name: "much-too-long-name",
            open: t_open,
            close: t_close,
            read: t_read,
            write: t_write,
            ioctl: t_ioctl,
        };
        let mut table = DriverTable::new();
        assert_eq!(table.register(&LONG), Err(Code::INVALID_ARGUMENT));
        assert_eq!(table.count(), 0);
    }

    const FILLER_TEMPLATE: DriverInfo = DriverInfo {
        name: "filler",
        open: t_open,
        close: t_close,
        read: t_read,
        write: t_write,
        ioctl: t_ioctl,
    };

    #[test]
    fn table_capacity_is_enforced() {
        static FILLER: [DriverInfo; MAX_DRIVERS] =
            [FILLER_TEMPLATE; MAX_DRIVERS];
        let mut table = DriverTable::new();
        for info in &FILLER {
            table.register(info).unwrap();
        }
        assert_eq!(table.register(&GRUMPY_DRIVER), Err(Code::DRIVER_FULL));
        assert_eq!(table.count(), MAX_DRIVERS);
    }

    #[test]
    fn handles_are_range_checked() {
        let mut table = DriverTable::new();
        table.register(&TEST_DRIVER).unwrap();

        assert!(table.by_handle(0).is_ok());
        assert_eq!(table.by_handle(1).unwrap_err(), Code::INVALID_ARGUMENT);
        assert_eq!(
            table.by_handle(u32::MAX).unwrap_err(),
            Code::INVALID_ARGUMENT
        );
    }

    #[test]
    fn dispatch_reaches_every_slot() {
        let _guard = DISPATCH_LOCK.lock().unwrap();
        let table = {
            let mut t = DriverTable::new();
            t.register(&TEST_DRIVER).unwrap();
            t
        };
        let info = table.by_handle(0).unwrap();
        let before = [
            OPEN_CALLS.load(Ordering::Relaxed),
            CLOSE_CALLS.load(Ordering::Relaxed),
            READ_CALLS.load(Ordering::Relaxed),
            WRITE_CALLS.load(Ordering::Relaxed),
            IOCTL_CALLS.load(Ordering::Relaxed),
        ];

        let mut count: u32 = 0;
        let mut scratch = [0u8; 1];
        let mut calls = [
            DriverCall::new(DriverOp::Open {
                f: info.open,
                context: ptr::null_mut(),
                flags: 0,
            }),
            DriverCall::new(DriverOp::Close {
                f: info.close,
                context: ptr::null_mut(),
            }),
            DriverCall::new(DriverOp::Read {
                f: info.read,
                context: ptr::null_mut(),
                buffer: ptr::null_mut(),
                byte_count: &mut count,
            }),
            DriverCall::new(DriverOp::Write {
                f: info.write,
                context: ptr::null_mut(),
                buffer: scratch.as_mut_ptr() as *mut c_void,
                byte_count: &mut count,
            }),
            DriverCall::new(DriverOp::Ioctl {
                f: info.ioctl,
                context: ptr::null_mut(),
                control: 0,
                buffer: ptr::null_mut(),
                byte_count: &mut count,
            }),
        ];
        for call in &mut calls {
            dispatch(call);
            assert_eq!(call.result, Code::SUCCESS);
        }

        let after = [
            OPEN_CALLS.load(Ordering::Relaxed),
            CLOSE_CALLS.load(Ordering::Relaxed),
            READ_CALLS.load(Ordering::Relaxed),
            WRITE_CALLS.load(Ordering::Relaxed),
            IOCTL_CALLS.load(Ordering::Relaxed),
        ];
        for (slot, (b, a)) in before.iter().zip(&after).enumerate() {
            assert_eq!(
                a - b,
                1,
                "entry point {slot} should be reached exactly once",
            );
        }
    }

    #[test]
    fn write_dispatch_carries_the_payload() {
        let _guard = DISPATCH_LOCK.lock().unwrap();
        let mut table = DriverTable::new();
        table.register(&TEST_DRIVER).unwrap();
        let info = table.by_handle(0).unwrap();

        let mut payload = [5u8, 6, 7];
        let mut count: u32 = payload.len() as u32;
        let mut call = DriverCall::new(DriverOp::Write {
            f: info.write,
            context: ptr::null_mut(),
            buffer: payload.as_mut_ptr() as *mut c_void,
            byte_count: &mut count,
        });
        dispatch(&mut call);

        assert_eq!(call.result, Code::SUCCESS);
        assert_eq!(count, 3);
        assert_eq!(&*LAST_WRITE.lock().unwrap(), &[5, 6, 7]);
    }

    #[test]
    fn driver_status_words_pass_through_untouched() {
        let mut call = DriverCall::new(DriverOp::Open {
            f: GRUMPY_DRIVER.open,
            context: ptr::null_mut(),
            flags: 0,
        });
        dispatch(&mut call);
        assert_eq!(call.result.as_raw(), 0x8000_0777);
        assert!(call.result.is_error());
    }
}
