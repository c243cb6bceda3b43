// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demo image: three threads exercising the scheduler and the scratch
//! driver.
//!
//! Two workers share priority 25 and alternate tick by tick; one pushes
//! data at the scratch device and bumps a shared counter, the other reads
//! the device back and decrements the counter. A checker sits at priority
//! 100 as a demonstration of starvation: while either worker is ready it
//! never runs, which on this kernel is always.
//!
//! The board's startup code (vectors, mode stacks, PLL, and the SWI vector
//! routed at `supervisor_call_isr`) runs first and then calls [`kmain`] in
//! supervisor mode.

#![no_std]
#![no_main]

use core::cell::Cell;
use core::ffi::c_void;
use core::ptr;

use abi::{DriverHandle, Priority};
use critical_section::Mutex;
use kern::{driver, startup, thread};

const STACK_WORDS: usize = 256;

static mut WRITER_STACK: [u32; STACK_WORDS] = [0; STACK_WORDS];
static mut READER_STACK: [u32; STACK_WORDS] = [0; STACK_WORDS];
static mut CHECKER_STACK: [u32; STACK_WORDS] = [0; STACK_WORDS];

/// Counters the threads poke at to make scheduling visible from a
/// debugger.
#[derive(Copy, Clone, Default)]
struct Shared {
    writes: u32,
    reads: u32,
    balance: i32,
}

static SHARED: Mutex<Cell<Shared>> = Mutex::new(Cell::new(Shared {
    writes: 0,
    reads: 0,
    balance: 0,
}));

static SCRATCH: Mutex<Cell<Option<DriverHandle>>> = Mutex::new(Cell::new(None));

fn scratch_handle() -> Option<DriverHandle> {
    if let Some(handle) = critical_section::with(|cs| SCRATCH.borrow(cs).get())
    {
        return Some(handle);
    }
    match driver::open(drv_scratch::DEVICE_NAME, 0) {
        Ok(handle) => {
            critical_section::with(|cs| SCRATCH.borrow(cs).set(Some(handle)));
            Some(handle)
        }
        Err(_) => None,
    }
}

fn burn(mut cycles: u32) {
    while cycles > 0 {
        cycles -= 1;
        core::hint::spin_loop();
    }
}

extern "C" fn writer_main(arg: *mut c_void) {
    // Safety: `arg` is the address of SHARED, passed at creation.
    let shared = unsafe { &*(arg as *const Mutex<Cell<Shared>>) };
    let mut payload = [5u8, 6, 7, 8, 9, 12, 0, 0, 0, 250];

    loop {
        if let Some(handle) = scratch_handle() {
            // Stamp the current tick into the payload so a debugger can
            // date what it finds in the pad.
            payload[6..10].copy_from_slice(&kern::sched::now().to_le_bytes());
            let mut count = payload.len() as u32;
            let code = driver::write(
                handle,
                ptr::null_mut(),
                payload.as_mut_ptr() as *mut c_void,
                &mut count,
            );
            if !code.is_error() {
                critical_section::with(|cs| {
                    let cell = shared.borrow(cs);
                    let mut s = cell.get();
                    s.writes += 1;
                    s.balance += 1;
                    cell.set(s);
                });
            }
        }
        burn(0x8FFF);
    }
}

extern "C" fn reader_main(arg: *mut c_void) {
    let shared = unsafe { &*(arg as *const Mutex<Cell<Shared>>) };
    let mut sink = [0u8; 16];

    loop {
        if let Some(handle) = scratch_handle() {
            let mut count = sink.len() as u32;
            let code = driver::read(
                handle,
                ptr::null_mut(),
                sink.as_mut_ptr() as *mut c_void,
                &mut count,
            );
            if !code.is_error() {
                critical_section::with(|cs| {
                    let cell = shared.borrow(cs);
                    let mut s = cell.get();
                    s.reads += 1;
                    s.balance -= 1;
                    cell.set(s);
                });
            }
        }
        burn(0xFFF);
    }
}

extern "C" fn checker_main(arg: *mut c_void) {
    let shared = unsafe { &*(arg as *const Mutex<Cell<Shared>>) };

    loop {
        critical_section::with(|cs| {
            let cell = shared.borrow(cs);
            let mut s = cell.get();
            if s.balance.unsigned_abs() > 0x7F {
                s.balance = 0;
            }
            cell.set(s);
        });
        burn(0xFFF);
    }
}

/// Image entry point, called by board startup in supervisor mode with
/// interrupts masked.
#[no_mangle]
pub extern "C" fn kmain() -> ! {
    let shared = &SHARED as *const _ as *mut c_void;

    if driver::register(&drv_scratch::DRIVER).is_err() {
        fault();
    }
    if startup::init().is_err() {
        fault();
    }

    // Safety: each stack is handed to exactly one thread, here, once.
    let (writer, reader, checker) = unsafe {
        (
            &mut (*ptr::addr_of_mut!(WRITER_STACK))[..],
            &mut (*ptr::addr_of_mut!(READER_STACK))[..],
            &mut (*ptr::addr_of_mut!(CHECKER_STACK))[..],
        )
    };
    let threads: [(&str, &'static mut [u32], abi::ThreadEntry, u8); 3] = [
        ("writer", writer, writer_main, 25),
        ("reader", reader, reader_main, 25),
        ("checker", checker, checker_main, 100),
    ];
    for (name, stack, entry, pri) in threads {
        if thread::create_thread(Priority(pri), name, stack, entry, shared)
            .is_err()
        {
            fault();
        }
    }

    match startup::start() {
        // start only returns on error, and its success type is empty.
        Ok(never) => match never {},
        Err(_) => fault(),
    }
}

fn fault() -> ! {
    kern::fail::die("demo: bringup failed")
}
