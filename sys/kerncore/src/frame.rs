// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction of a fresh thread's initial saved context.
//!
//! A thread that has never run is made to look exactly like a thread that
//! was preempted one instruction before its entry point: a full register
//! snapshot sits at the high end of its stack, and the context-restore
//! primitive consumes it without knowing the difference. The snapshot has a
//! concrete memory layout dictated by that primitive, so it is written
//! through a typed record rather than freehand pointer arithmetic.

use abi::psr;
use abi::Code;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Number of 32-bit words in a saved context image.
pub const FRAME_WORDS: usize = 17;

/// Smallest usable stack the builder accepts: the frame itself plus a
/// little immediate scratch for the thread's first instructions.
pub const MIN_STACK_WORDS: usize = 20;

/// Debug fill for a general-purpose register slot: the register number,
/// written in decimal, repeated through all four bytes (r9 = 0x09090909,
/// r10 = 0x10101010, ...). Makes a never-written register obvious in a
/// memory dump.
const fn debug_fill(register: u32) -> u32 {
    ((register / 10) * 0x10 + register % 10) * 0x0101_0101
}

/// The 17-word saved context image, in ascending memory order.
///
/// The restore primitive pops from the low end upward: status word first
/// (into SPSR), then `r0`..`r12`, the banked user `sp` and `lr`, and
/// finally `pc`, which transfers control. Field order here *is* the
/// protocol; the `zerocopy` derives let the image be placed over raw stack
/// words with layout and size checked rather than assumed.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C)]
pub struct InitialFrame {
    /// Program status word the thread starts with: user mode, IRQ and FIQ
    /// enabled, Thumb bit tracking the entry address.
    pub psr: u32,
    /// First-argument register; carries the opaque creation argument.
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub r12: u32,
    /// Stack pointer the thread begins with: the original top of its
    /// buffer, since the restore consumes this entire image.
    pub sp: u32,
    /// Link register sentinel. Threads must not return; returning to
    /// address zero faults immediately and visibly.
    pub lr: u32,
    /// Entry point, loaded last.
    pub pc: u32,
}

impl InitialFrame {
    fn new(entry: u32, arg: u32, stack_top: u32) -> Self {
        let mut psr = psr::MODE_USER;
        // Bit 0 of the entry address selects the instruction set, exactly
        // as a BX to that address would.
        if entry & 1 != 0 {
            psr |= psr::PsrFlags::THUMB.bits();
        }
        Self {
            psr,
            r0: arg,
            r1: debug_fill(1),
            r2: debug_fill(2),
            r3: debug_fill(3),
            r4: debug_fill(4),
            r5: debug_fill(5),
            r6: debug_fill(6),
            r7: debug_fill(7),
            r8: debug_fill(8),
            r9: debug_fill(9),
            r10: debug_fill(10),
            r11: debug_fill(11),
            r12: debug_fill(12),
            sp: stack_top,
            lr: 0,
            pc: entry,
        }
    }
}

/// Writes a fresh thread's initial context into the top of `stack` and
/// returns the index of the new top of stack, exactly [`FRAME_WORDS`] below
/// `stack.len()`. The word at that index is the first one the restore
/// primitive reads, so it's what the thread's saved stack pointer must
/// record.
///
/// Fails with `INVALID_ARGUMENT` when `entry` is zero or the stack is
/// shorter than [`MIN_STACK_WORDS`]. No alignment fixup is performed; a
/// `[u32]` slice is word-aligned by construction, and the caller is
/// responsible for having provided one.
pub fn init_thread_stack(
    stack: &mut [u32],
    entry: u32,
    arg: u32,
) -> Result<usize, Code> {
    if entry == 0 {
        return Err(Code::INVALID_ARGUMENT);
    }
    if stack.len() < MIN_STACK_WORDS {
        return Err(Code::INVALID_ARGUMENT);
    }

    let stack_top = stack.as_ptr_range().end as usize as u32;
    let new_top = stack.len() - FRAME_WORDS;

    let frame = InitialFrame::new(entry, arg, stack_top);
    frame
        .write_to(stack[new_top..].as_mut_bytes())
        .map_err(|_| Code::OS_ERR)?;

    Ok(new_top)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANARY: u32 = 0xC0FF_EE00;

    fn stack_of(len: usize) -> Vec<u32> {
        vec![CANARY; len]
    }

    #[test]
    fn frame_is_exactly_17_words() {
        assert_eq!(core::mem::size_of::<InitialFrame>(), FRAME_WORDS * 4);
    }

    #[test]
    fn new_top_is_17_below_old_top() {
        let mut stack = stack_of(64);
        let top = init_thread_stack(&mut stack, 0xA000, 0).unwrap();
        assert_eq!(top, 64 - FRAME_WORDS);
    }

    #[test]
    fn words_below_the_frame_are_untouched() {
        let mut stack = stack_of(64);
        let top = init_thread_stack(&mut stack, 0xA000, 0).unwrap();
        for (i, &word) in stack[..top].iter().enumerate() {
            assert_eq!(word, CANARY, "word {i} below the frame was clobbered");
        }
    }

    #[test]
    fn frame_contents() {
        let mut stack = stack_of(32);
        let end = stack.as_ptr_range().end as usize as u32;
        let top = init_thread_stack(&mut stack, 0xA000, 0xDEAD_BEEF).unwrap();

        let frame = &stack[top..];
        assert_eq!(frame[0], psr::MODE_USER, "psr: user mode, ARM state");
        assert_eq!(frame[1], 0xDEAD_BEEF, "r0 carries the argument");
        assert_eq!(frame[2], 0x0101_0101, "r1 debug fill");
        assert_eq!(frame[10], 0x0909_0909, "r9 debug fill");
        assert_eq!(frame[11], 0x1010_1010, "r10 debug fill");
        assert_eq!(frame[13], 0x1212_1212, "r12 debug fill");
        assert_eq!(frame[14], end, "sp points at the original stack top");
        assert_eq!(frame[15], 0, "lr sentinel");
        assert_eq!(frame[16], 0xA000, "pc is the entry address");
    }

    #[test]
    fn thumb_entry_sets_thumb_bit() {
        let mut stack = stack_of(32);
        let top = init_thread_stack(&mut stack, 0xA001, 0).unwrap();
        assert_eq!(
            stack[top],
            psr::MODE_USER | psr::PsrFlags::THUMB.bits(),
            "odd entry address selects Thumb state",
        );
    }

    #[test]
    fn arm_entry_leaves_thumb_clear() {
        let mut stack = stack_of(32);
        let top = init_thread_stack(&mut stack, 0xA000, 0).unwrap();
        assert_eq!(stack[top] & psr::PsrFlags::THUMB.bits(), 0);
    }

    #[test]
    fn interrupts_start_enabled() {
        let mut stack = stack_of(32);
        let top = init_thread_stack(&mut stack, 0xA000, 0).unwrap();
        let masks =
            psr::PsrFlags::IRQ_DISABLE.bits() | psr::PsrFlags::FIQ_DISABLE.bits();
        assert_eq!(stack[top] & masks, 0, "threads start with interrupts on");
    }

    #[test]
    fn null_entry_is_rejected() {
        let mut stack = stack_of(32);
        assert_eq!(
            init_thread_stack(&mut stack, 0, 0),
            Err(Code::INVALID_ARGUMENT)
        );
    }

    #[test]
    fn undersized_stack_is_rejected() {
        let mut stack = stack_of(MIN_STACK_WORDS - 1);
        assert_eq!(
            init_thread_stack(&mut stack, 0xA000, 0),
            Err(Code::INVALID_ARGUMENT)
        );
    }

    #[test]
    fn minimum_stack_is_accepted() {
        let mut stack = stack_of(MIN_STACK_WORDS);
        let top = init_thread_stack(&mut stack, 0xA000, 0).unwrap();
        assert_eq!(top, MIN_STACK_WORDS - FRAME_WORDS);
    }
}
