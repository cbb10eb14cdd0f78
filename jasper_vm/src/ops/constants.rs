//! Constant-pushing opcodes.

use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_runtime::pool::resolve_class_in_pool;
use jasper_runtime::{ObjRef, PoolEntry};

pub(crate) fn aconst_null(t: &mut VmThread) -> Control {
    t.push_object(ObjRef::NULL);
    Control::Next
}

pub(crate) fn iconst_m1(t: &mut VmThread) -> Control {
    t.push_int(-1i32 as u32);
    Control::Next
}

pub(crate) fn iconst_0(t: &mut VmThread) -> Control {
    t.push_int(0);
    Control::Next
}

pub(crate) fn iconst_1(t: &mut VmThread) -> Control {
    t.push_int(1);
    Control::Next
}

pub(crate) fn iconst_2(t: &mut VmThread) -> Control {
    t.push_int(2);
    Control::Next
}

pub(crate) fn iconst_3(t: &mut VmThread) -> Control {
    t.push_int(3);
    Control::Next
}

pub(crate) fn iconst_4(t: &mut VmThread) -> Control {
    t.push_int(4);
    Control::Next
}

pub(crate) fn iconst_5(t: &mut VmThread) -> Control {
    t.push_int(5);
    Control::Next
}

pub(crate) fn lconst_0(t: &mut VmThread) -> Control {
    t.push_long(0);
    Control::Next
}

pub(crate) fn lconst_1(t: &mut VmThread) -> Control {
    t.push_long(1);
    Control::Next
}

pub(crate) fn fconst_0(t: &mut VmThread) -> Control {
    t.push_float(0.0);
    Control::Next
}

pub(crate) fn fconst_1(t: &mut VmThread) -> Control {
    t.push_float(1.0);
    Control::Next
}

pub(crate) fn fconst_2(t: &mut VmThread) -> Control {
    t.push_float(2.0);
    Control::Next
}

pub(crate) fn dconst_0(t: &mut VmThread) -> Control {
    t.push_double(0.0);
    Control::Next
}

pub(crate) fn dconst_1(t: &mut VmThread) -> Control {
    t.push_double(1.0);
    Control::Next
}

pub(crate) fn bipush(t: &mut VmThread) -> Control {
    let value = t.read_u8() as i8;
    t.push_int(value as i32 as u32);
    Control::Next
}

pub(crate) fn sipush(t: &mut VmThread) -> Control {
    let value = t.read_i16();
    t.push_int(value as i32 as u32);
    Control::Next
}

/// Shared body of `ldc` and `ldc_w`: push a single-word pool constant,
/// resolving symbolic class entries to their mirrors.
fn ldc_value(t: &mut VmThread, index: u16) -> Control {
    let pool = t.active_code().pool();
    match pool.entry(index) {
        Some(PoolEntry::Int(v)) => t.push_int(*v as u32),
        Some(PoolEntry::Float(v)) => t.push_float(*v),
        Some(PoolEntry::Str(text)) => {
            let runtime = t.runtime().clone();
            let object = runtime.intern_string(text);
            t.push_object(object);
        }
        Some(PoolEntry::Class { .. }) => {
            let runtime = t.runtime().clone();
            let method = t.current_method();
            match resolve_class_in_pool(&runtime, method, index) {
                Ok(class) => {
                    let mirror = class.mirror(&runtime);
                    t.push_object(mirror);
                }
                Err(error) => return t.raise_linkage(&error),
            }
        }
        entry => panic!("ldc of unexpected pool entry {entry:?} at index {index}"),
    }
    Control::Next
}

pub(crate) fn ldc(t: &mut VmThread) -> Control {
    let index = t.read_u8() as u16;
    ldc_value(t, index)
}

pub(crate) fn ldc_w(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    ldc_value(t, index)
}

pub(crate) fn ldc2_w(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let pool = t.active_code().pool();
    match pool.entry(index) {
        Some(PoolEntry::Long(v)) => t.push_long(*v as u64),
        Some(PoolEntry::Double(v)) => t.push_double(*v),
        entry => panic!("ldc2_w of unexpected pool entry {entry:?} at index {index}"),
    }
    Control::Next
}
