//! Per-thread interpreter state.
//!
//! Each OS thread owns one `VmThread`: the tagged stack, the live
//! instruction pointer and code registers, the frame chain threaded
//! through the stack, the pending exception, and the class-initialization
//! bookkeeping. Nothing here is shared; all cross-thread state lives in
//! the runtime.

use crate::dispatch::Control;
use crate::stack::TaggedStack;
use jasper_runtime::pool::LinkageError;
use jasper_runtime::{ClassRef, Code, MethodRef, ObjRef, Runtime, ThreadInterrupt, TraceElement};
use std::sync::Arc;

pub struct VmThread {
    runtime: Arc<Runtime>,
    pub(crate) stack: TaggedStack,
    /// Slot index of the current frame's bookkeeping area, -1 when no
    /// frame is live.
    pub(crate) frame: isize,
    /// Live instruction pointer; spilled to the frame at suspension
    /// points.
    pub(crate) ip: usize,
    /// Live bytecode blob of the executing method.
    pub(crate) code: Option<&'static Code>,
    /// Pending exception; set by raising opcodes, consumed by handlers.
    pub(crate) exception: Option<ObjRef>,
    /// Classes whose `<clinit>` is running as an interpreter frame on
    /// this thread, innermost last.
    pub(crate) class_init_list: Vec<ClassRef>,
    /// Classes being initialized through reflective facade entries.
    pub(crate) class_init_stack: Vec<ClassRef>,
    interrupt: Arc<ThreadInterrupt>,
}

impl VmThread {
    pub fn new(runtime: Arc<Runtime>) -> VmThread {
        VmThread {
            runtime,
            stack: TaggedStack::new(),
            frame: -1,
            ip: 0,
            code: None,
            exception: None,
            class_init_list: Vec::new(),
            class_init_stack: Vec::new(),
            interrupt: ThreadInterrupt::new(),
        }
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    #[inline]
    pub fn interrupt(&self) -> &Arc<ThreadInterrupt> {
        &self.interrupt
    }

    pub fn pending_exception(&self) -> Option<ObjRef> {
        self.exception
    }

    /// Set a pending exception from native code or the embedder.
    pub fn set_pending_exception(&mut self, exception: ObjRef) {
        self.exception = Some(exception);
    }

    pub fn take_pending_exception(&mut self) -> Option<ObjRef> {
        self.exception.take()
    }

    // =========================================================================
    // Bytecode reading
    // =========================================================================

    #[inline]
    pub(crate) fn active_code(&self) -> &'static Code {
        self.code.expect("no active bytecode")
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> u8 {
        let byte = self.active_code().body()[self.ip];
        self.ip += 1;
        byte
    }

    #[inline]
    pub(crate) fn read_u16(&mut self) -> u16 {
        let high = self.read_u8() as u16;
        let low = self.read_u8() as u16;
        (high << 8) | low
    }

    #[inline]
    pub(crate) fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    #[inline]
    pub(crate) fn read_u32(&mut self) -> u32 {
        let high = self.read_u16() as u32;
        let low = self.read_u16() as u32;
        (high << 16) | low
    }

    #[inline]
    pub(crate) fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    /// Big-endian read at an absolute position, without touching `ip`.
    #[inline]
    pub(crate) fn code_i32_at(&self, at: usize) -> i32 {
        let body = self.active_code().body();
        i32::from_be_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
    }

    // =========================================================================
    // Stack delegation
    // =========================================================================

    #[inline]
    pub(crate) fn push_object(&mut self, o: ObjRef) {
        self.stack.push_object(o);
    }

    #[inline]
    pub(crate) fn push_int(&mut self, v: u32) {
        self.stack.push_int(v);
    }

    #[inline]
    pub(crate) fn push_float(&mut self, v: f32) {
        self.stack.push_float(v);
    }

    #[inline]
    pub(crate) fn push_long(&mut self, v: u64) {
        self.stack.push_long(v);
    }

    #[inline]
    pub(crate) fn push_double(&mut self, v: f64) {
        self.stack.push_double(v);
    }

    #[inline]
    pub(crate) fn pop_object(&mut self) -> ObjRef {
        self.stack.pop_object()
    }

    #[inline]
    pub(crate) fn pop_int(&mut self) -> u32 {
        self.stack.pop_int()
    }

    #[inline]
    pub(crate) fn pop_float(&mut self) -> f32 {
        self.stack.pop_float()
    }

    #[inline]
    pub(crate) fn pop_long(&mut self) -> u64 {
        self.stack.pop_long()
    }

    #[inline]
    pub(crate) fn pop_double(&mut self) -> f64 {
        self.stack.pop_double()
    }

    #[inline]
    pub(crate) fn sp(&self) -> usize {
        self.stack.sp()
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    /// Record `exception` as pending, attaching the current stack trace,
    /// and hand control to the unwinder.
    pub(crate) fn raise(&mut self, exception: ObjRef) -> Control {
        if let Some(object) = exception.get() {
            if object.throwable_trace().is_none() {
                let trace = self.capture_trace();
                object.set_throwable_trace(trace);
            }
        }
        self.exception = Some(exception);
        Control::Throw
    }

    pub(crate) fn raise_null_pointer(&mut self) -> Control {
        let exception = self.runtime.make_null_pointer_exception();
        self.raise(exception)
    }

    pub(crate) fn raise_arithmetic(&mut self, message: &str) -> Control {
        let exception = self.runtime.make_arithmetic_exception(message);
        self.raise(exception)
    }

    pub(crate) fn raise_array_index(&mut self, index: i32, length: usize) -> Control {
        let message = format!("{index} not in [0,{length})");
        let exception = self
            .runtime
            .make_array_index_out_of_bounds_exception(&message);
        self.raise(exception)
    }

    pub(crate) fn raise_negative_array_size(&mut self, count: i32) -> Control {
        let message = format!("{count}");
        let exception = self.runtime.make_negative_array_size_exception(&message);
        self.raise(exception)
    }

    pub(crate) fn raise_class_cast(&mut self, from: ClassRef, to: ClassRef) -> Control {
        let message = format!("{} as {}", from.name(), to.name());
        let exception = self.runtime.make_class_cast_exception(&message);
        self.raise(exception)
    }

    pub(crate) fn raise_stack_overflow(&mut self) -> Control {
        let exception = self.runtime.make_stack_overflow_error();
        self.raise(exception)
    }

    pub(crate) fn raise_linkage(&mut self, error: &LinkageError) -> Control {
        let exception = self.runtime.make_linkage_throwable(error);
        self.raise(exception)
    }

    /// Snapshot (method, ip) for every live frame, innermost first.
    pub(crate) fn capture_trace(&mut self) -> Box<[TraceElement]> {
        self.spill_ip();
        let mut elements = Vec::new();
        let mut frame = self.frame;
        while frame >= 0 {
            elements.push(TraceElement {
                method: self.frame_method(frame),
                ip: self.frame_ip(frame),
            });
            frame = self.frame_next(frame);
        }
        elements.into_boxed_slice()
    }

    /// Number of live frames.
    pub(crate) fn frame_count(&self) -> usize {
        let mut count = 0;
        let mut frame = self.frame;
        while frame >= 0 {
            count += 1;
            frame = self.frame_next(frame);
        }
        count
    }

    pub(crate) fn current_method(&self) -> MethodRef {
        self.frame_method(self.frame)
    }
}
