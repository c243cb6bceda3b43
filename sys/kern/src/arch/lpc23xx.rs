// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture support for the ARM7TDMI-S core in the NXP LPC23xx family.
//!
//! # The tick source
//!
//! We use TIMER0 as the kernel tick: match register 0 resets the count and
//! raises a vectored IRQ through the VIC at 100 Hz. The ISR acknowledges
//! both the timer and the VIC on every tick, then runs the scheduler.
//!
//! # Modes and stacks
//!
//! Threads run in user mode on their own stacks. The kernel is entered two
//! ways: the tick IRQ (IRQ mode) and the `swi` driver trampoline
//! (supervisor mode). Each handler re-anchors its banked stack pointer at
//! entry from a linker-provided symbol, because the context-restore path
//! deliberately leaves the banked pointer aimed at the outgoing thread's
//! frame. The board's startup code owns the vector table and must route
//! the SWI vector at `supervisor_call_isr`; the timer vector is installed
//! here at runtime.
//!
//! # The saved-context contract
//!
//! A preempted (or freshly created) thread is represented by a 17-word
//! frame on its own stack: `psr, r0..r12, sp, lr, pc` in ascending memory
//! order, with the TCB's first field holding the address of the `psr`
//! word. `timer_tick_isr` lays that frame down before calling into the
//! scheduler, and `restore_context` consumes it; the frame builder in
//! `kerncore::frame` manufactures the same shape for threads that have
//! never run.

use core::arch::global_asm;
use core::sync::atomic::{AtomicPtr, Ordering};

use abi::DriverCall;

use crate::thread::Tcb;

/// On ARM7 we have to use a global to record the current thread pointer,
/// since there is no scratch register the asm below could rely on. The
/// symbol is addressed by name from the assembly; the pointed-to TCB keeps
/// its saved stack pointer at offset 0.
#[no_mangle]
static CURRENT_THREAD_PTR: AtomicPtr<Tcb> =
    AtomicPtr::new(core::ptr::null_mut());

/// Records `tcb` as the thread the next context restore will resume.
///
/// # Safety
///
/// `tcb` must point into the kernel's thread table, which is never moved,
/// and the pointer must not be dereferenced by the caller while an ISR
/// could be using it.
pub unsafe fn set_current_thread(tcb: *mut Tcb) {
    CURRENT_THREAD_PTR.store(tcb, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Clocking and peripheral registers.
//
// There's no community peripheral-access crate for this family, so the few
// registers the kernel itself touches are written directly. Addresses are
// from the LPC23xx user manual.

/// Core clock the board startup code configures before handing control to
/// the kernel (Fcco 288 MHz / 6).
pub const CCLK_HZ: u32 = 48_000_000;

const TIMER0: u32 = 0xE000_4000;
const T0IR: *mut u32 = TIMER0 as *mut u32;
const T0TCR: *mut u32 = (TIMER0 + 0x04) as *mut u32;
const T0PR: *mut u32 = (TIMER0 + 0x0C) as *mut u32;
const T0MCR: *mut u32 = (TIMER0 + 0x14) as *mut u32;
const T0MR0: *mut u32 = (TIMER0 + 0x18) as *mut u32;
const T0CCR: *mut u32 = (TIMER0 + 0x28) as *mut u32;
const T0EMR: *mut u32 = (TIMER0 + 0x3C) as *mut u32;

const PCLKSEL0: *mut u32 = 0xE01F_C1A8 as *mut u32;
/// PCLK_TIMER0 field position within PCLKSEL0.
const PCLK_TIMER0_SHIFT: u32 = 2;

const VIC: u32 = 0xFFFF_F000;
const VIC_INT_SELECT: *mut u32 = (VIC + 0x0C) as *mut u32;
const VIC_INT_ENABLE: *mut u32 = (VIC + 0x10) as *mut u32;
const VIC_VECT_ADDR4: *mut u32 = (VIC + 0x110) as *mut u32;
const VIC_VECT_PRIORITY4: *mut u32 = (VIC + 0x210) as *mut u32;
const VIC_ADDRESS: *mut u32 = (VIC + 0xF00) as *mut u32;

/// VIC channel of TIMER0.
const VIC_CH_TIMER0: u32 = 4;

/// Programs TIMER0 to raise the tick interrupt at
/// [`crate::sched::TICKS_PER_SEC`] and unmasks it at the VIC.
pub fn start_tick_timer() {
    extern "C" {
        fn timer_tick_isr();
    }

    // Safety: MMIO to peripherals nothing else in the kernel touches.
    unsafe {
        // Route timer 0 as a vectored IRQ (not FIQ) and install the ISR.
        VIC_INT_SELECT
            .write_volatile(VIC_INT_SELECT.read_volatile() & !(1 << VIC_CH_TIMER0));
        VIC_VECT_ADDR4.write_volatile(timer_tick_isr as usize as u32);
        VIC_VECT_PRIORITY4.write_volatile(2);

        // The timer runs from PCLK; recover the divider the board chose.
        let pclk_sel = (PCLKSEL0.read_volatile() >> PCLK_TIMER0_SHIFT) & 0b11;
        let pclk_div = match pclk_sel {
            0 => 4,
            1 => 1,
            2 => 2,
            _ => 8,
        };
        let reload = (CCLK_HZ / pclk_div) / crate::sched::TICKS_PER_SEC;

        T0TCR.write_volatile(1 << 1); // hold the counter in reset
        T0TCR.write_volatile(0);
        T0PR.write_volatile(0); // count every PCLK edge
        T0MR0.write_volatile(reload);
        T0MCR.write_volatile(0b011); // interrupt and reset TC on MR0
        T0CCR.write_volatile(0); // capture disabled
        T0EMR.write_volatile(0); // no external match output
        T0TCR.write_volatile(1); // run

        VIC_INT_ENABLE.write_volatile(1 << VIC_CH_TIMER0);
    }
}

/// Clears the TIMER0 match-0 interrupt flag.
pub fn acknowledge_tick_timer() {
    // Safety: write-one-to-clear interrupt flag register.
    unsafe {
        T0IR.write_volatile(1);
    }
}

/// Signals end-of-interrupt to the VIC so it can re-arm priority hardware.
/// The written value is ignored; the write itself is the acknowledgment.
pub fn end_of_interrupt() {
    // Safety: MMIO, any value acknowledges.
    unsafe {
        VIC_ADDRESS.write_volatile(0);
    }
}

/// Performs the first context restore, resuming whatever
/// `set_current_thread` last recorded.
///
/// # Safety
///
/// Must be entered in a privileged mode (the restore drops to user mode
/// through the loaded status word), with the current thread holding a
/// well-formed saved frame. Does not return.
pub unsafe fn restore_first_context() -> ! {
    extern "C" {
        fn restore_context() -> !;
    }
    // Safety: forwarded contract.
    unsafe { restore_context() }
}

/// Crosses the privilege boundary with a driver-call descriptor. The `swi`
/// instruction lands in `supervisor_call_isr`, which forwards the
/// descriptor pointer to `supervisor_call_entry`; by the time this
/// returns, the descriptor's result slot holds the driver's status word.
pub fn supervisor_call(call: &mut DriverCall) {
    // Safety: the handler treats r0 as a borrow of the descriptor for the
    // duration of the call and follows the C call convention otherwise.
    unsafe {
        core::arch::asm!(
            "swi 0",
            inout("r0") call as *mut DriverCall => _,
            out("r1") _,
            out("r2") _,
            out("r3") _,
            out("r12") _,
            out("lr") _,
        );
    }
}

/// Rust side of the SWI trampoline: runs in supervisor mode and executes
/// the marshalled driver call.
#[no_mangle]
unsafe extern "C" fn supervisor_call_entry(call: *mut DriverCall) {
    // Safety: the descriptor lives on the calling thread's stack for the
    // duration of the trap, and the caller is suspended until we return.
    kerncore::drivers::dispatch(unsafe { &mut *call });
}

/// Rust side of the tick ISR: counts the tick, acknowledges the hardware,
/// and picks the next thread. Runs in IRQ mode with the outgoing thread's
/// context already parked on its stack.
#[no_mangle]
unsafe extern "C" fn timer_tick_entry() {
    crate::sched::tick_and_reschedule();
}

// ---------------------------------------------------------------------------
// Interrupt masking: this chip's implementation of `critical-section`.
// Saving and restoring the CPSR mask bits gives the save-disable-restore
// token the rest of the kernel (and the trace buffers) nests freely.

struct Lpc23xxCriticalSection;
critical_section::set_impl!(Lpc23xxCriticalSection);

unsafe impl critical_section::Impl for Lpc23xxCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let prev: u32;
        // Safety: raising the I and F bits cannot fault in any privileged
        // mode, and user mode never executes kernel code.
        unsafe {
            core::arch::asm!(
                "mrs {prev}, cpsr",
                "orr {scratch}, {prev}, #0xC0",
                "msr cpsr_c, {scratch}",
                prev = out(reg) prev,
                scratch = out(reg) _,
            );
        }
        prev
    }

    unsafe fn release(prev: critical_section::RawRestoreState) {
        // Only the mask bits are restored; the mode cannot have changed
        // inside a critical section.
        unsafe {
            core::arch::asm!(
                "mrs {cur}, cpsr",
                "bic {cur}, {cur}, #0xC0",
                "and {mask}, {prev}, #0xC0",
                "orr {cur}, {cur}, {mask}",
                "msr cpsr_c, {cur}",
                cur = out(reg) _,
                mask = out(reg) _,
                prev = in(reg) prev,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// klog output path.

/// Formats one klog line to UART0 by polling the transmit-holding flag.
/// The UART itself (baud, pins) is board-init's problem; this is a debug
/// aid, not the console.
#[cfg(feature = "klog-uart")]
pub fn klog_fmt(args: core::fmt::Arguments<'_>) {
    use core::fmt::Write;

    const U0THR: *mut u32 = 0xE000_C000 as *mut u32;
    const U0LSR: *const u32 = 0xE000_C014 as *const u32;
    const THRE: u32 = 1 << 5;

    struct Uart0;
    impl Write for Uart0 {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for &byte in s.as_bytes() {
                // Safety: polled MMIO writes to the transmit register.
                unsafe {
                    while U0LSR.read_volatile() & THRE == 0 {}
                    U0THR.write_volatile(u32::from(byte));
                }
            }
            Ok(())
        }
    }

    let mut uart = Uart0;
    uart.write_fmt(args).ok();
    uart.write_str("\r\n").ok();
}

// ---------------------------------------------------------------------------
// Exception entries and the context-switch protocol.
//
// Register lists below follow the frame layout in `kerncore::frame`:
// ascending memory order psr, r0..r12, sp, lr, pc. `__irq_stack_top` and
// `__svc_stack_top` come from the board's linker script; both banked
// stacks are considered empty between kernel entries, so each handler
// re-anchors its own.

global_asm! {"
    .section .text.supervisor_call_isr
    .globl supervisor_call_isr
    .type supervisor_call_isr,function
supervisor_call_isr:
    @ Supervisor-mode entry from the swi instruction. r0 already carries
    @ the descriptor pointer, per the calling convention in
    @ supervisor_call. Driver calls do not nest, so the banked stack can
    @ be re-anchored at every entry.
    ldr     sp, =__svc_stack_top
    stmfd   sp!, {{r1-r12, lr}}
    bl      supervisor_call_entry
    ldmfd   sp!, {{r1-r12, lr}}
    movs    pc, lr
"}

global_asm! {"
    .section .text.timer_tick_isr
    .globl timer_tick_isr
    .type timer_tick_isr,function
timer_tick_isr:
    @ IRQ-mode entry from the VIC. Adjust the return address, then park
    @ scratch registers on the (freshly re-anchored) IRQ stack.
    sub     lr, lr, #4
    ldr     sp, =__irq_stack_top
    stmfd   sp!, {{r0-r3}}
    mov     r0, lr                  @ preempted pc
    mrs     r1, spsr                @ preempted psr
    mov     r2, sp                  @ where r0-r3 are parked

    @ Switch to system mode to reach the thread's banked sp and lr, and
    @ lay the frame down on the thread's own stack, top first.
    msr     cpsr_c, #0xDF
    mov     r3, sp                  @ thread sp at the preemption point
    stmfd   sp!, {{r0}}             @ pc
    stmfd   sp!, {{lr}}             @ lr
    stmfd   sp!, {{r3}}             @ sp
    stmfd   sp!, {{r4-r12}}         @ r4..r12
    ldmia   r2, {{r4-r7}}           @ recover the parked r0-r3
    stmfd   sp!, {{r4-r7}}          @ r0..r3
    stmfd   sp!, {{r1}}             @ psr

    @ Record the frame address in the outgoing TCB; its saved stack
    @ pointer is the TCB's first field.
    ldr     r4, =CURRENT_THREAD_PTR
    ldr     r4, [r4]
    str     sp, [r4]

    @ Back to IRQ mode (interrupts still off) to run the scheduler on the
    @ IRQ stack, then resume whatever is now current.
    msr     cpsr_c, #0xD2
    ldr     sp, =__irq_stack_top
    bl      timer_tick_entry
    b       restore_context
"}

global_asm! {"
    .section .text.restore_context
    .globl restore_context
    .type restore_context,function
restore_context:
    @ Resume the thread named by CURRENT_THREAD_PTR. Works from any
    @ privileged mode: the exception return at the end loads the saved
    @ psr, which selects user mode and the correct instruction set.
    ldr     r0, =CURRENT_THREAD_PTR
    ldr     r0, [r0]
    ldr     sp, [r0]                @ saved stack pointer, TCB offset 0
    ldmfd   sp!, {{r0}}
    msr     spsr_cxsf, r0           @ psr to restore at exception return
    ldmfd   sp, {{r0-r14}}^         @ user r0-r12, sp, lr
    nop                             @ required after a user-bank transfer
    add     sp, sp, #60             @ skip the 15 words just consumed
    ldmfd   sp!, {{pc}}^            @ pc; ^ copies spsr into cpsr
"}
