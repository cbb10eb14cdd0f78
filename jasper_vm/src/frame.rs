//! The frame machine: call frames laid out over the tagged stack.
//!
//! A frame is a contiguous stack region: parameters and locals first,
//! then four bookkeeping slots, then the operand area. The bookkeeping
//! slots at `frame + {0,1,2,3}` hold the locals base index, the caller's
//! frame index, the executing method, and the saved instruction pointer.
//! The live `ip`/`code` registers are spilled into the frame at every
//! suspension point (call, throw, stack walk).

use crate::stack::STACK_SLOT_LIMIT;
use crate::thread::VmThread;
use jasper_runtime::{Method, MethodRef, MethodVmFlags};

pub(crate) const FRAME_BASE_OFFSET: usize = 0;
pub(crate) const FRAME_NEXT_OFFSET: usize = 1;
pub(crate) const FRAME_METHOD_OFFSET: usize = 2;
pub(crate) const FRAME_IP_OFFSET: usize = 3;
pub(crate) const FRAME_FOOTPRINT: usize = 4;

impl VmThread {
    // =========================================================================
    // Frame slot accessors
    // =========================================================================

    #[inline]
    pub(crate) fn frame_base(&self, frame: isize) -> usize {
        self.stack.peek_word(frame as usize + FRAME_BASE_OFFSET)
    }

    #[inline]
    pub(crate) fn frame_next(&self, frame: isize) -> isize {
        self.stack.peek_word(frame as usize + FRAME_NEXT_OFFSET) as isize
    }

    #[inline]
    pub(crate) fn frame_method(&self, frame: isize) -> MethodRef {
        let word = self.stack.peek_word(frame as usize + FRAME_METHOD_OFFSET);
        // Written exclusively by push_frame from a live method reference.
        unsafe { &*(word as *const Method) }
    }

    #[inline]
    pub(crate) fn frame_ip(&self, frame: isize) -> usize {
        self.stack.peek_word(frame as usize + FRAME_IP_OFFSET)
    }

    /// Save the live instruction pointer into the current frame.
    #[inline]
    pub(crate) fn spill_ip(&mut self) {
        if self.frame >= 0 {
            let ip = self.ip;
            self.stack
                .poke_word(self.frame as usize + FRAME_IP_OFFSET, ip);
        }
    }

    // =========================================================================
    // Locals
    // =========================================================================

    #[inline]
    pub(crate) fn local_object(&self, index: usize) -> jasper_runtime::ObjRef {
        self.stack.peek_object(self.frame_base(self.frame) + index)
    }

    #[inline]
    pub(crate) fn local_int(&self, index: usize) -> u32 {
        self.stack.peek_int(self.frame_base(self.frame) + index)
    }

    #[inline]
    pub(crate) fn local_long(&self, index: usize) -> u64 {
        self.stack.peek_long(self.frame_base(self.frame) + index)
    }

    #[inline]
    pub(crate) fn set_local_object(&mut self, index: usize, value: jasper_runtime::ObjRef) {
        let base = self.frame_base(self.frame);
        self.stack.poke_object(base + index, value);
    }

    #[inline]
    pub(crate) fn set_local_int(&mut self, index: usize, value: u32) {
        let base = self.frame_base(self.frame);
        self.stack.poke_int(base + index, value);
    }

    #[inline]
    pub(crate) fn set_local_long(&mut self, index: usize, value: u64) {
        let base = self.frame_base(self.frame);
        self.stack.poke_long(base + index, value);
    }

    /// Copy the top slot, tag included, into a local. Shared by the
    /// reference stores, where the incoming tag must be preserved.
    #[inline]
    pub(crate) fn store_local(&mut self, index: usize) {
        let base = self.frame_base(self.frame);
        let top = self.stack.sp() - 1;
        self.stack.copy_slot(top, base + index);
        self.stack.drop_slots(1);
    }

    // =========================================================================
    // Frame entry and exit
    // =========================================================================

    /// Lay out a frame for `method`. Parameters already sit on the stack;
    /// extra locals are zero-filled, the bookkeeping slots are written,
    /// and a synchronized method acquires its monitor.
    pub(crate) fn push_frame(&mut self, method: MethodRef) {
        self.spill_ip();
        self.ip = 0;

        let parameter_footprint = method.parameter_footprint();
        let base = self.stack.sp() - parameter_footprint;
        let mut locals = parameter_footprint;

        if !method.is_native() {
            let code = method.code().expect("bytecode method without body");
            self.code = Some(code);
            locals = code.max_locals();
            self.stack.zero_fill(base + parameter_footprint, base + locals);
        }

        let frame = base + locals;
        self.stack
            .poke_word(frame + FRAME_NEXT_OFFSET, self.frame as usize);
        self.frame = frame as isize;
        self.stack.set_sp(frame + FRAME_FOOTPRINT);

        self.stack.poke_word(frame + FRAME_BASE_OFFSET, base);
        self.stack
            .poke_word(frame + FRAME_METHOD_OFFSET, method as *const Method as usize);
        self.stack.poke_word(frame + FRAME_IP_OFFSET, 0);

        if method.is_synchronized() {
            if method.is_static() {
                method.class().monitor().acquire();
            } else {
                let receiver = self.stack.peek_object(base);
                receiver
                    .get()
                    .expect("synchronized method with null receiver")
                    .monitor()
                    .acquire();
            }
        }
    }

    /// Tear down the current frame: release a held monitor, complete a
    /// class initializer, trim the stack to the frame base, and restore
    /// the caller's registers.
    pub(crate) fn pop_frame(&mut self) {
        let method = self.frame_method(self.frame);

        if method.is_synchronized() {
            if method.is_static() {
                method.class().monitor().release();
            } else {
                let receiver = self.stack.peek_object(self.frame_base(self.frame));
                receiver
                    .get()
                    .expect("synchronized method with null receiver")
                    .monitor()
                    .release();
            }
        }

        if method.vm_flags().contains(MethodVmFlags::CLASS_INIT)
            && self
                .class_init_list
                .last()
                .is_some_and(|&c| std::ptr::eq(c, method.class()))
        {
            self.class_init_list.pop();
            self.complete_class_init(method);
        }

        self.stack.set_sp(self.frame_base(self.frame));
        self.frame = self.frame_next(self.frame);
        if self.frame >= 0 {
            let caller = self.frame_method(self.frame);
            self.code = caller.code();
            self.ip = self.frame_ip(self.frame);
        } else {
            self.code = None;
            self.ip = 0;
        }
    }

    /// Publish the result of a `<clinit>` activation that just returned
    /// or unwound. A non-Error exception is wrapped so the trigger site
    /// sees the initializer failure kind.
    fn complete_class_init(&mut self, method: MethodRef) {
        let class = method.class();
        let succeeded = self.exception.is_none();
        class.post_init(succeeded);

        if let Some(exception) = self.exception {
            let runtime = self.runtime().clone();
            let error = runtime.well_known().error;
            let is_error = exception
                .get()
                .is_some_and(|o| error.is_assignable_from(o.class()));
            if !is_error {
                let wrapped = runtime.make_exception_in_initializer_error(exception);
                if let Some(object) = wrapped.get() {
                    object.set_throwable_trace(self.capture_trace());
                }
                self.exception = Some(wrapped);
            }
        }
    }

    /// Worst-case depth check before entering a bytecode method.
    pub(crate) fn check_stack(&self, method: &Method) -> bool {
        let code = method.code().expect("bytecode method without body");
        self.stack.sp()
            + method.parameter_footprint()
            + code.max_locals()
            + FRAME_FOOTPRINT
            + code.max_stack()
            <= STACK_SLOT_LIMIT
    }
}
