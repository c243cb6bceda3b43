// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and applications.
//!
//! Everything in this crate is a plain value type with a defined
//! representation, because these types cross the boundary between
//! application code, the kernel, and (in the case of [`DriverCall`]) the
//! supervisor-call trampoline.

#![no_std]

use core::ffi::c_void;
use core::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Number of priority levels the scheduler distinguishes. Priority 0 is the
/// most important; `NUM_PRIORITIES - 1` is reserved for the idle thread.
pub const NUM_PRIORITIES: usize = 255;

/// Thread names longer than this are silently truncated when a thread is
/// created.
pub const MAX_THREAD_NAME_LEN: usize = 12;

/// Upper bound on driver names accepted by registration.
pub const MAX_DRIVER_NAME_LEN: usize = 12;

/// Status word returned by kernel operations and driver entry points.
///
/// The encoding is shared with drivers, so it's a 32-bit word rather than an
/// enum: bit 31 is the error sentinel, and the low bits carry a class base
/// plus an index within the class. Any word without bit 31 set is a success,
/// with zero as the canonical success value. The kernel never interprets the
/// non-sentinel bits of a driver-produced word.
#[derive(
    Copy, Clone, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(transparent)]
#[must_use]
pub struct Code(u32);

impl Code {
    /// Mask of the error sentinel bit.
    pub const ERROR_BIT: u32 = 0x8000_0000;

    const OS_BASE: u32 = 0x0;
    const GENERAL_BASE: u32 = 0x100;
    const DRIVER_BASE: u32 = 0x200;

    /// Canonical success.
    pub const SUCCESS: Self = Self(0);

    /// Catch-all kernel failure: operation before `init`, thread table
    /// exhausted, stack construction failed.
    pub const OS_ERR: Self = Self(Self::ERROR_BIT | (Self::OS_BASE + 1));

    /// An argument didn't survive validation: priority or handle out of
    /// range, stack too small, null where a value is required.
    pub const INVALID_ARGUMENT: Self =
        Self(Self::ERROR_BIT | (Self::GENERAL_BASE + 1));

    /// The driver table is at capacity.
    pub const DRIVER_FULL: Self =
        Self(Self::ERROR_BIT | (Self::DRIVER_BASE + 1));

    /// No registered driver matched the requested name.
    pub const DRIVER_NOT_FOUND: Self =
        Self(Self::ERROR_BIT | (Self::DRIVER_BASE + 2));

    /// Wraps a raw status word, e.g. one produced by a driver.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit word.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Tests the error sentinel. This is the *only* classification the
    /// kernel ever performs on a status word.
    pub const fn is_error(self) -> bool {
        self.0 & Self::ERROR_BIT != 0
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SUCCESS => f.write_str("Code::SUCCESS"),
            Self::OS_ERR => f.write_str("Code::OS_ERR"),
            Self::INVALID_ARGUMENT => f.write_str("Code::INVALID_ARGUMENT"),
            Self::DRIVER_FULL => f.write_str("Code::DRIVER_FULL"),
            Self::DRIVER_NOT_FOUND => f.write_str("Code::DRIVER_NOT_FOUND"),
            Self(raw) => write!(f, "Code({raw:#010x})"),
        }
    }
}

/// Indicates priority of a thread.
///
/// Priorities are small numbers starting from zero. Numerically lower
/// priorities are more important, so priority 0 is the most likely to be
/// scheduled, followed by 1, and so forth.
///
/// Note that this type *deliberately* does not implement `PartialOrd`/`Ord`,
/// to keep us from confusing ourselves on whether `>` means numerically
/// greater / less important, or more important / numerically smaller.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Default,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// The least important level, reserved for the idle thread. User threads
    /// may share it, but something must always be ready to run there.
    pub const IDLE: Self = Self(NUM_PRIORITIES as u8 - 1);

    /// Checks if `self` is strictly more important than `other`.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// This priority as a ready-table index.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Lifecycle state of a thread.
///
/// Only `Ready` and `Active` are exercised by the scheduler today; `Waiting`
/// is reserved for future blocking primitives and is never entered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ThreadState {
    /// Selected by the most recent scheduling decision; currently running.
    Active,
    /// Linked into its priority ring and eligible to run.
    #[default]
    Ready,
    /// Reserved; no operation produces this state.
    Waiting,
}

/// Signature shared by all thread entry points. The argument is the opaque
/// word supplied at creation. Entry points must not return; the initial
/// frame's link register holds a trapping sentinel in case one does.
pub type ThreadEntry = extern "C" fn(arg: *mut c_void);

/// ARM program status word pieces used when manufacturing the initial saved
/// context of a thread.
pub mod psr {
    /// User mode: the mode threads run in.
    pub const MODE_USER: u32 = 0x10;
    /// Supervisor mode: the mode driver entry points run in.
    pub const MODE_SVC: u32 = 0x13;
    /// System mode: privileged, but sharing the user register bank.
    pub const MODE_SYS: u32 = 0x1F;
    /// IRQ mode, entered by the tick interrupt.
    pub const MODE_IRQ: u32 = 0x12;
    /// Mask covering the mode field.
    pub const MODE_MASK: u32 = 0x1F;

    bitflags::bitflags! {
        /// Control bits of the PSR above the mode field.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub struct PsrFlags: u32 {
            /// Thumb instruction set selected.
            const THUMB = 1 << 5;
            /// FIQs masked.
            const FIQ_DISABLE = 1 << 6;
            /// IRQs masked.
            const IRQ_DISABLE = 1 << 7;
        }
    }
}

/// Opaque identifier for a successfully opened driver, produced by the
/// dispatch layer's `open`. It is the driver's registration index and stays
/// valid for the life of the system; there is no close-invalidates-handle
/// rule.
pub type DriverHandle = u32;

/// Driver `open` entry point. `context` carries the caller's name pointer
/// and `flags` the open flags, both forwarded verbatim.
pub type DriverOpenFn = fn(context: *mut c_void, flags: u32) -> Code;

/// Driver `close` entry point.
pub type DriverCloseFn = fn(context: *mut c_void) -> Code;

/// Driver `read` entry point. `byte_count` is an in/out word: capacity on
/// entry, bytes transferred on exit.
pub type DriverReadFn =
    fn(context: *mut c_void, buffer: *mut c_void, byte_count: *mut u32) -> Code;

/// Driver `write` entry point, with the same in/out count convention as
/// `read`.
pub type DriverWriteFn =
    fn(context: *mut c_void, buffer: *mut c_void, byte_count: *mut u32) -> Code;

/// Driver `ioctl` entry point.
pub type DriverIoctlFn = fn(
    context: *mut c_void,
    control: u32,
    buffer: *mut c_void,
    byte_count: *mut u32,
) -> Code;

/// Registration record for one driver: a short name plus the five entry
/// points. Records are registered by reference and never mutated afterward,
/// so they normally live in a `static`.
#[derive(Copy, Clone, Debug)]
pub struct DriverInfo {
    /// Lookup name, at most [`MAX_DRIVER_NAME_LEN`] bytes.
    pub name: &'static str,
    pub open: DriverOpenFn,
    pub close: DriverCloseFn,
    pub read: DriverReadFn,
    pub write: DriverWriteFn,
    pub ioctl: DriverIoctlFn,
}

/// One dispatched driver operation: the target entry point paired with its
/// argument shape. The discriminant values are part of the trampoline
/// protocol.
///
/// Keeping the function pointer inside the variant (rather than a separate
/// type-erased word) means the privileged dispatcher can't call a function
/// with the wrong shape no matter what the descriptor contains.
#[derive(Copy, Clone, Debug)]
#[repr(C, u32)]
pub enum DriverOp {
    Open {
        f: DriverOpenFn,
        context: *mut c_void,
        flags: u32,
    } = 1,
    Close {
        f: DriverCloseFn,
        context: *mut c_void,
    } = 2,
    Read {
        f: DriverReadFn,
        context: *mut c_void,
        buffer: *mut c_void,
        byte_count: *mut u32,
    } = 3,
    Write {
        f: DriverWriteFn,
        context: *mut c_void,
        buffer: *mut c_void,
        byte_count: *mut u32,
    } = 4,
    Ioctl {
        f: DriverIoctlFn,
        context: *mut c_void,
        control: u32,
        buffer: *mut c_void,
        byte_count: *mut u32,
    } = 5,
}

/// Call descriptor marshalled across the supervisor-call boundary.
///
/// The descriptor lives on the calling thread's stack for the duration of
/// the dispatched call; the trampoline overwrites `result` with the status
/// word the driver returned.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct DriverCall {
    pub op: DriverOp,
    pub result: Code,
}

impl DriverCall {
    /// Builds a descriptor for `op` with the result slot cleared.
    pub fn new(op: DriverOp) -> Self {
        Self {
            op,
            result: Code::SUCCESS,
        }
    }
}
