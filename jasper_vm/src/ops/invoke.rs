//! Invocation opcodes and the bootstrap reentry arm.

use crate::class_init::class_init;
use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_core::Opcode;
use jasper_runtime::pool::{
    find_interface_method, find_virtual_method, is_special_method, resolve_method,
};
use jasper_runtime::{
    AccessFlags, ClassRef, ClassVmFlags, Code, ConstPool, Method, MethodRef,
};

pub(crate) fn invokestatic(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let method = match resolve_method(&runtime, t.current_method(), index) {
        Ok(method) => method,
        Err(error) => return t.raise_linkage(&error),
    };

    // Rewind 3: the instruction replays after <clinit> completes.
    if let Some(control) = class_init(t, method.class(), 3) {
        return control;
    }
    Control::Invoke(method)
}

pub(crate) fn invokevirtual(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let method = match resolve_method(&runtime, t.current_method(), index) {
        Ok(method) => method,
        Err(error) => return t.raise_linkage(&error),
    };

    let receiver = t.stack.peek_object(t.sp() - method.parameter_footprint());
    match receiver.get() {
        Some(object) => {
            let class = object.class();
            if let Some(control) = class_init(t, class, 3) {
                return control;
            }
            if class.vm_flags().contains(ClassVmFlags::BOOTSTRAP) {
                // The virtual table is not trustworthy yet; run the
                // reentry stub, which forces full resolution and
                // replays this instruction.
                return Control::Invoke(bootstrap_stub(class, method));
            }
            Control::Invoke(find_virtual_method(method, class))
        }
        None => t.raise_null_pointer(),
    }
}

pub(crate) fn invokespecial(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let method = match resolve_method(&runtime, t.current_method(), index) {
        Ok(method) => method,
        Err(error) => return t.raise_linkage(&error),
    };

    let receiver = t.stack.peek_object(t.sp() - method.parameter_footprint());
    if receiver.is_null() {
        return t.raise_null_pointer();
    }

    let caller_class = t.current_method().class();
    if is_special_method(method, caller_class) {
        let super_class = caller_class
            .super_class()
            .expect("super invocation without a superclass");
        if let Some(control) = class_init(t, super_class, 3) {
            return control;
        }
        Control::Invoke(find_virtual_method(method, super_class))
    } else {
        Control::Invoke(method)
    }
}

pub(crate) fn invokeinterface(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    // Skip the historical count and zero operand bytes.
    t.ip += 2;

    let runtime = t.runtime().clone();
    let method = match resolve_method(&runtime, t.current_method(), index) {
        Ok(method) => method,
        Err(error) => return t.raise_linkage(&error),
    };

    let receiver = t.stack.peek_object(t.sp() - method.parameter_footprint());
    match receiver.get() {
        Some(object) => match find_interface_method(method, object.class()) {
            Ok(target) => Control::Invoke(target),
            Err(error) => t.raise_linkage(&error),
        },
        None => t.raise_null_pointer(),
    }
}

/// Build a one-instruction stub whose body is the reentry opcode. Its
/// frame absorbs the call's arguments; executing it pops that frame,
/// resolves the receiver's class for real, and replays the call.
fn bootstrap_stub(class: ClassRef, method: MethodRef) -> MethodRef {
    let code = Code::new(
        vec![Opcode::Impdep1 as u8],
        1,
        method.parameter_footprint() as u16,
        ConstPool::empty(),
        Vec::new(),
    );
    let flags = method.flags()
        & !(AccessFlags::NATIVE | AccessFlags::SYNCHRONIZED | AccessFlags::ABSTRACT);
    let stub = Method::bytecode(method.name(), method.spec(), flags, code)
        .expect("stub shares a validated descriptor");
    let stub: MethodRef = Box::leak(Box::new(stub));
    stub.link(class);
    stub
}

/// Bootstrap reentry: a virtual call landed on a bootstrap-marked class.
/// Pop the stub frame, force full resolution of the receiver's class by
/// the call site's loader, and rewind so the call re-executes against
/// the patched virtual table.
pub(crate) fn impdep1(t: &mut VmThread) -> Control {
    debug_assert!(t.frame_next(t.frame) >= 0);
    t.pop_frame();

    debug_assert_eq!(
        t.active_code().body()[t.ip - 3],
        Opcode::Invokevirtual as u8
    );
    t.ip -= 2;

    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let method = match resolve_method(&runtime, t.current_method(), index) {
        Ok(method) => method,
        Err(error) => return t.raise_linkage(&error),
    };

    let receiver = t.stack.peek_object(t.sp() - method.parameter_footprint());
    let class = receiver
        .get()
        .expect("bootstrap reentry with null receiver")
        .class();
    debug_assert!(class.vm_flags().contains(ClassVmFlags::BOOTSTRAP));

    let loader = t.current_method().class().loader();
    if let Err(error) = runtime.resolve_class(loader, class.name()) {
        return t.raise_linkage(&error);
    }

    t.ip -= 3;
    Control::Next
}
