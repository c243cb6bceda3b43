// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel initialization and the kernel-state singleton.
//!
//! All mutable scheduler state lives in one place, `Kernel`, reached only
//! through `with_kernel`. The lifecycle has two phases: before [`init`]
//! only `init` itself (and driver registration) is legal; afterward threads
//! can be created and [`start`] hands the CPU over to them, never to
//! return.

use core::convert::Infallible;
use core::ffi::c_void;
use core::mem::MaybeUninit;

use abi::{Code, Priority, ThreadState, NUM_PRIORITIES};
use kerncore::ready::ReadyTable;

use crate::thread::{Tcb, MAX_THREADS};

/// Mutable kernel state. One of these exists, as a static below.
pub(crate) struct Kernel {
    pub(crate) initialized: bool,
    /// Next thread id to hand out; ids are never reused.
    pub(crate) next_id: u32,
    /// Number of initialized slots at the front of `threads`.
    thread_count: usize,
    threads: MaybeUninit<[Tcb; MAX_THREADS]>,
    pub(crate) ready: ReadyTable<NUM_PRIORITIES>,
    /// Index of the thread the scheduler last selected.
    pub(crate) current: Option<usize>,
}

impl Kernel {
    const fn new() -> Self {
        Self {
            initialized: false,
            next_id: 0,
            thread_count: 0,
            threads: MaybeUninit::uninit(),
            ready: ReadyTable::new(),
            current: None,
        }
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// The live prefix of the thread table.
    pub(crate) fn threads_mut(&mut self) -> &mut [Tcb] {
        // Safety: slots `..thread_count` were initialized by
        // `push_thread` and are never torn down.
        unsafe {
            core::slice::from_raw_parts_mut(
                self.threads.as_mut_ptr().cast::<Tcb>(),
                self.thread_count,
            )
        }
    }

    /// Moves `tcb` into the next free arena slot and returns its index.
    /// Callers check capacity first; this panics if they didn't.
    pub(crate) fn push_thread(&mut self, tcb: Tcb) -> usize {
        let index = self.thread_count;
        uassert!(index < MAX_THREADS);
        // Safety: in-bounds write to an uninitialized slot.
        unsafe {
            self.threads.as_mut_ptr().cast::<Tcb>().add(index).write(tcb);
        }
        self.thread_count = index + 1;
        index
    }

    /// Links an arena slot into its priority's ready ring.
    pub(crate) fn make_ready(&mut self, index: usize, priority: Priority) {
        // Safety: same live prefix as `threads_mut`; taken raw so the ready
        // table (a disjoint field) can be borrowed alongside it.
        let threads = unsafe {
            core::slice::from_raw_parts_mut(
                self.threads.as_mut_ptr().cast::<Tcb>(),
                self.thread_count,
            )
        };
        self.ready.insert(threads, priority.index(), index);
    }

    /// One scheduling decision: advance the most important non-empty ring
    /// and return its new head.
    pub(crate) fn rotate(&mut self) -> Option<usize> {
        let threads = unsafe {
            core::slice::from_raw_parts_mut(
                self.threads.as_mut_ptr().cast::<Tcb>(),
                self.thread_count,
            )
        };
        self.ready.rotate(threads)
    }
}

static mut KERNEL: Kernel = Kernel::new();

/// Grants access to the kernel singleton.
///
/// Sound because this is a single-core system and every path here is
/// non-reentrant: thread-context callers hold the interrupts-masked token
/// for the duration of the call, the tick ISR runs with interrupts
/// disabled and cannot nest, and no kernel entry point calls back into
/// another.
pub(crate) fn with_kernel<R>(body: impl FnOnce(&mut Kernel) -> R) -> R {
    body(unsafe { &mut *core::ptr::addr_of_mut!(KERNEL) })
}

/// Words in the idle thread's dedicated stack.
const IDLE_STACK_WORDS: usize = 128;

static mut IDLE_STACK: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS];

/// The mandatory least-priority thread. Its existence is what makes the
/// scheduler's priority scan total, so it must never block or exit.
extern "C" fn idle_main(_arg: *mut c_void) {
    loop {
        core::hint::spin_loop();
    }
}

/// Initializes the kernel and creates the idle thread.
///
/// Must be called (successfully) before any thread creation and before
/// [`start`]. A second call after success returns `Ok` without side
/// effects. If idle creation fails, the initialized flag is rolled back
/// and the failure propagated.
pub fn init() -> Result<(), Code> {
    let already = critical_section::with(|_cs| {
        with_kernel(|kernel| {
            if kernel.initialized {
                true
            } else {
                kernel.initialized = true;
                false
            }
        })
    });
    if already {
        return Ok(());
    }

    klog!("kernel: init");

    // Safety: handed out on the first pass through init only; on the
    // failure path below nothing retains the buffer, so a retry may take
    // it again.
    let stack = unsafe {
        let arr: &mut [u32; 128] = &mut *core::ptr::addr_of_mut!(IDLE_STACK);
        &mut arr[..]
    };
    match crate::thread::create_thread(
        Priority::IDLE,
        "idle",
        stack,
        idle_main,
        core::ptr::null_mut(),
    ) {
        Ok(()) => Ok(()),
        Err(code) => {
            critical_section::with(|_cs| {
                with_kernel(|kernel| kernel.initialized = false);
            });
            Err(code)
        }
    }
}

/// Starts the scheduler: selects the first thread, programs the 100 Hz
/// tick source, and performs the first context restore. On success this
/// never returns; the error arm fires only when [`init`] hasn't run.
///
/// Must be invoked from a privileged processor mode, because the restore
/// drops to user mode through the loaded status word.
pub fn start() -> Result<Infallible, Code> {
    let first = critical_section::with(|_cs| {
        with_kernel(|kernel| {
            if !kernel.initialized {
                return Err(Code::OS_ERR);
            }
            // Select the current ring head without rotating, so the first
            // tick visits the next ring member rather than skipping one.
            let index = kernel.ready.peek().ok_or(Code::OS_ERR)?;
            kernel.current = Some(index);
            let threads = kernel.threads_mut();
            threads[index].set_state(ThreadState::Active);
            Ok(core::ptr::addr_of_mut!(threads[index]))
        })
    })?;

    klog!("kernel: starting");

    // Safety: `first` points into the kernel singleton's thread table,
    // which is 'static and never moved.
    unsafe {
        crate::arch::set_current_thread(first);
    }
    crate::arch::start_tick_timer();
    // Safety: privileged mode is a documented requirement on our caller,
    // and the selected thread carries a well-formed initial frame.
    unsafe { crate::arch::restore_first_context() }
}
