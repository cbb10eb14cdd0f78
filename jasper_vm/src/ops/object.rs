//! Object allocation, type tests, throw, and monitor opcodes.

use crate::class_init::class_init;
use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_runtime::pool::{instance_of, resolve_class_in_pool};

pub(crate) fn new(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let class = match resolve_class_in_pool(&runtime, t.current_method(), index) {
        Ok(class) => class,
        Err(error) => return t.raise_linkage(&error),
    };

    if let Some(control) = class_init(t, class, 3) {
        return control;
    }

    let instance = runtime.make_instance(class);
    t.push_object(instance);
    Control::Next
}

pub(crate) fn checkcast(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let target = t.stack.peek_object(t.sp() - 1);
    if let Some(object) = target.get() {
        let runtime = t.runtime().clone();
        let class = match resolve_class_in_pool(&runtime, t.current_method(), index) {
            Ok(class) => class,
            Err(error) => return t.raise_linkage(&error),
        };
        if !instance_of(class, target) {
            return t.raise_class_cast(object.class(), class);
        }
    }
    Control::Next
}

pub(crate) fn instanceof(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let target = t.stack.peek_object(t.sp() - 1);
    if target.is_null() {
        let _ = t.pop_object();
        t.push_int(0);
        return Control::Next;
    }
    let runtime = t.runtime().clone();
    let class = match resolve_class_in_pool(&runtime, t.current_method(), index) {
        Ok(class) => class,
        Err(error) => return t.raise_linkage(&error),
    };
    let value = t.pop_object();
    t.push_int(u32::from(instance_of(class, value)));
    Control::Next
}

pub(crate) fn athrow(t: &mut VmThread) -> Control {
    let exception = t.pop_object();
    if exception.is_null() {
        return t.raise_null_pointer();
    }
    t.raise(exception)
}

pub(crate) fn monitorenter(t: &mut VmThread) -> Control {
    let target = t.pop_object();
    match target.get() {
        Some(object) => {
            object.monitor().acquire();
            Control::Next
        }
        None => t.raise_null_pointer(),
    }
}

pub(crate) fn monitorexit(t: &mut VmThread) -> Control {
    let target = t.pop_object();
    match target.get() {
        Some(object) => {
            object.monitor().release();
            Control::Next
        }
        None => t.raise_null_pointer(),
    }
}
