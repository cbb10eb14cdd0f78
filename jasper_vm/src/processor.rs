//! The processor facade: the uniform entry points the surrounding
//! runtime uses to create threads, invoke methods, walk stacks, and
//! enumerate roots.

use crate::class_init::is_initializing;
use crate::dispatch::{interpret, Control, ReturnValue};
use crate::native::invoke_native;
use crate::thread::VmThread;
use jasper_core::{descriptor, DescriptorCursor, TypeCode};
use jasper_runtime::pool::{find_interface_method, find_virtual_method};
use jasper_runtime::{ClassRef, ClassVmFlags, JValue, LoaderId, MethodRef, ObjRef, Runtime};
use std::ptr::NonNull;
use std::sync::Arc;

/// Facade over one runtime; cheap to clone per embedding site.
#[derive(Clone)]
pub struct Processor {
    runtime: Arc<Runtime>,
}

impl Processor {
    pub fn new(runtime: Arc<Runtime>) -> Processor {
        Processor { runtime }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Allocate interpreter state for the calling OS thread.
    pub fn make_thread(&self) -> VmThread {
        VmThread::new(self.runtime.clone())
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Invoke `method` with a receiver (for instance methods) and typed
    /// arguments. Virtual methods dispatch on the receiver's class.
    ///
    /// Returns the typed result, `None` for void, or the thrown
    /// exception.
    pub fn invoke(
        &self,
        t: &mut VmThread,
        method: MethodRef,
        this: Option<ObjRef>,
        args: &[JValue],
    ) -> Result<Option<JValue>, ObjRef> {
        debug_assert_eq!(method.is_static(), this.is_none());

        if !t.stack.has_headroom(method.parameter_footprint() + 1) {
            return Err(self.runtime.make_stack_overflow_error());
        }
        push_arguments(t, this, method.spec(), args);
        self.invoke_pushed(t, method)
    }

    /// Invoke by symbolic triple: arguments are pushed first, then the
    /// method is resolved by name and descriptor.
    pub fn invoke_by_name(
        &self,
        t: &mut VmThread,
        loader: LoaderId,
        class_name: &str,
        method_name: &str,
        spec: &str,
        this: Option<ObjRef>,
        args: &[JValue],
    ) -> Result<Option<JValue>, ObjRef> {
        let footprint = descriptor::parameter_footprint(spec, this.is_some())
            .expect("malformed descriptor in symbolic invoke");
        if !t.stack.has_headroom(footprint + 1) {
            return Err(self.runtime.make_stack_overflow_error());
        }

        let saved_sp = t.stack.sp();
        push_arguments(t, this, spec, args);

        let class = match self.runtime.resolve_class(loader, class_name) {
            Ok(class) => class,
            Err(error) => {
                t.stack.set_sp(saved_sp);
                return Err(self.runtime.make_linkage_throwable(&error));
            }
        };
        let method = match class.lookup_method(method_name, spec) {
            Some(method) => method,
            None => {
                t.stack.set_sp(saved_sp);
                let error = jasper_runtime::pool::LinkageError::MethodNotFound {
                    class: class.name().clone(),
                    name: Arc::from(method_name),
                    spec: Arc::from(spec),
                };
                return Err(self.runtime.make_linkage_throwable(&error));
            }
        };
        debug_assert_eq!(method.is_static(), this.is_none());
        self.invoke_pushed(t, method)
    }

    /// Invoke a method whose arguments already sit on the thread's
    /// stack: virtual selection, class initialization, then the native
    /// or bytecode path.
    fn invoke_pushed(
        &self,
        t: &mut VmThread,
        method: MethodRef,
    ) -> Result<Option<JValue>, ObjRef> {
        let saved_sp = t.stack.sp() - method.parameter_footprint();

        let (method, class) = if method.is_virtual() {
            let receiver = t.stack.peek_object(t.sp() - method.parameter_footprint());
            let object = match receiver.get() {
                Some(object) => object,
                None => {
                    t.stack.set_sp(saved_sp);
                    return Err(self.runtime.make_null_pointer_exception());
                }
            };
            let class = object.class();
            if class.vm_flags().contains(ClassVmFlags::BOOTSTRAP) {
                if let Err(error) = self.runtime.resolve_class(class.loader(), class.name()) {
                    t.stack.set_sp(saved_sp);
                    return Err(self.runtime.make_linkage_throwable(&error));
                }
            }
            let selected = if method.class().is_interface() {
                match find_interface_method(method, class) {
                    Ok(selected) => selected,
                    Err(error) => {
                        t.stack.set_sp(saved_sp);
                        return Err(self.runtime.make_linkage_throwable(&error));
                    }
                }
            } else {
                find_virtual_method(method, class)
            };
            (selected, class)
        } else {
            (method, method.class())
        };

        if let Err(exception) = self.init_class(t, class) {
            t.stack.set_sp(saved_sp);
            return Err(exception);
        }

        if method.is_native() {
            match invoke_native(t, method) {
                Control::Next => Ok(pop_typed_result(t, method.return_code())),
                Control::Throw => Err(t
                    .take_pending_exception()
                    .expect("native throw without a pending exception")),
                _ => unreachable!("native invocation yields next or throw"),
            }
        } else {
            if !t.check_stack(method) {
                t.stack.set_sp(saved_sp);
                return Err(self.runtime.make_stack_overflow_error());
            }
            t.push_frame(method);
            match interpret(t) {
                Ok(value) => {
                    t.pop_frame();
                    Ok(typed_result(value, method.return_code()))
                }
                // The unwinder already popped every frame.
                Err(exception) => Err(exception),
            }
        }
    }

    // =========================================================================
    // Class initialization
    // =========================================================================

    /// Run `<clinit>` for `class` (supers first) if it is still pending,
    /// on this thread, before returning.
    pub fn init_class(&self, t: &mut VmThread, class: ClassRef) -> Result<(), ObjRef> {
        if let Some(super_class) = class.super_class() {
            self.init_class(t, super_class)?;
        }
        if !class.needs_init() {
            return Ok(());
        }
        match class.pre_init() {
            Ok(true) => {
                let initializer = class
                    .initializer()
                    .expect("claimed initialization of class without <clinit>");
                t.class_init_stack.push(class);
                let outcome = self.run_initializer(t, initializer);
                t.class_init_stack.pop();
                match outcome {
                    Ok(()) => {
                        class.post_init(true);
                        Ok(())
                    }
                    Err(exception) => {
                        class.post_init(false);
                        let error = self.runtime.well_known().error;
                        let is_error = exception
                            .get()
                            .is_some_and(|o| error.is_assignable_from(o.class()));
                        if is_error {
                            Err(exception)
                        } else {
                            Err(self.runtime.make_exception_in_initializer_error(exception))
                        }
                    }
                }
            }
            Ok(false) => Ok(()),
            Err(error) => Err(self.runtime.make_linkage_throwable(&error)),
        }
    }

    fn run_initializer(&self, t: &mut VmThread, initializer: MethodRef) -> Result<(), ObjRef> {
        if !t.check_stack(initializer) {
            return Err(self.runtime.make_stack_overflow_error());
        }
        t.push_frame(initializer);
        match interpret(t) {
            Ok(_) => {
                t.pop_frame();
                Ok(())
            }
            Err(exception) => Err(exception),
        }
    }

    /// Is `class` being initialized by this thread right now?
    pub fn is_initializing(&self, t: &VmThread, class: ClassRef) -> bool {
        is_initializing(t, class)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Visit every live frame, innermost first. The visitor returns
    /// false to stop early.
    pub fn walk_stack(
        &self,
        t: &mut VmThread,
        mut visitor: impl FnMut(MethodRef, usize) -> bool,
    ) {
        t.spill_ip();
        let mut frame = t.frame;
        while frame >= 0 {
            if !visitor(t.frame_method(frame), t.frame_ip(frame)) {
                break;
            }
            frame = t.frame_next(frame);
        }
    }

    /// Number of live frames on the thread.
    pub fn frame_count(&self, t: &VmThread) -> usize {
        t.frame_count()
    }

    /// Enumerate the thread's heap roots: every object-tagged stack slot
    /// plus the pending exception.
    pub fn visit_objects(&self, t: &VmThread, mut visitor: impl FnMut(ObjRef)) {
        for index in 0..t.stack.sp() {
            if t.stack.tag_at(index) == jasper_core::OBJECT_TAG {
                visitor(t.stack.peek_object(index));
            }
        }
        if let Some(exception) = t.pending_exception() {
            visitor(exception);
        }
    }

    /// Materialize a local reference handle for `o`, or `None` when
    /// null.
    pub fn make_local_reference(&self, t: &mut VmThread, o: ObjRef) -> Option<NonNull<usize>> {
        t.stack.push_reference(o)
    }

    /// Clear a handle produced by [`Processor::make_local_reference`].
    pub fn dispose_local_reference(&self, reference: Option<NonNull<usize>>) {
        if let Some(slot) = reference {
            unsafe { *slot.as_ptr() = 0 };
        }
    }
}

/// Push a receiver and typed arguments per the descriptor.
fn push_arguments(t: &mut VmThread, this: Option<ObjRef>, spec: &str, args: &[JValue]) {
    if let Some(receiver) = this {
        t.push_object(receiver);
    }
    let mut cursor = DescriptorCursor::new(spec).expect("validated descriptor");
    let mut supplied = args.iter();
    while cursor.has_next() {
        let kind = cursor.next().expect("validated descriptor");
        let value = supplied
            .next()
            .unwrap_or_else(|| panic!("missing argument for descriptor {spec}"));
        match (kind, value) {
            (TypeCode::Object, JValue::Object(o)) => t.push_object(*o),
            (TypeCode::Long, JValue::Long(v)) => t.push_long(*v as u64),
            (TypeCode::Double, JValue::Double(v)) => t.push_double(*v),
            (TypeCode::Float, JValue::Float(v)) => t.push_float(*v),
            (
                TypeCode::Int
                | TypeCode::Boolean
                | TypeCode::Byte
                | TypeCode::Char
                | TypeCode::Short,
                JValue::Int(v),
            ) => t.push_int(*v as u32),
            (kind, value) => panic!("argument {value:?} does not match parameter type {kind:?}"),
        }
    }
    assert!(
        supplied.next().is_none(),
        "extra arguments for descriptor {spec}"
    );
}

/// Type a dispatch-loop result by the method's return code.
fn typed_result(value: ReturnValue, return_code: TypeCode) -> Option<JValue> {
    match (value, return_code) {
        (ReturnValue::Void, _) => None,
        (ReturnValue::Int(bits), TypeCode::Float) => Some(JValue::Float(f32::from_bits(bits))),
        (ReturnValue::Int(bits), _) => Some(JValue::Int(bits as i32)),
        (ReturnValue::Long(bits), TypeCode::Double) => Some(JValue::Double(f64::from_bits(bits))),
        (ReturnValue::Long(bits), _) => Some(JValue::Long(bits as i64)),
        (ReturnValue::Object(o), _) => Some(JValue::Object(o)),
    }
}

/// Pop a native call's pushed result as a typed value.
fn pop_typed_result(t: &mut VmThread, return_code: TypeCode) -> Option<JValue> {
    match return_code {
        TypeCode::Void => None,
        TypeCode::Float => Some(JValue::Float(t.pop_float())),
        TypeCode::Double => Some(JValue::Double(t.pop_double())),
        TypeCode::Long => Some(JValue::Long(t.pop_long() as i64)),
        TypeCode::Object => Some(JValue::Object(t.pop_object())),
        _ => Some(JValue::Int(t.pop_int() as i32)),
    }
}
