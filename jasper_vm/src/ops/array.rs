//! Array allocation, element access, and length.
//!
//! Element loads and stores share a bounds/null gate; byte access must
//! accept both byte and boolean arrays, which the element body kind
//! discriminates.

use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_core::opcode::array_type;
use jasper_core::TypeCode;
use jasper_runtime::pool::resolve_class_in_pool;
use jasper_runtime::{ArrayBody, ClassRef, ObjRef, Runtime};
use smallvec::SmallVec;

/// Null and bounds gate shared by every element access.
fn array_at(
    t: &mut VmThread,
    array: ObjRef,
    index: i32,
) -> Result<&'static ArrayBody, Control> {
    match array.get() {
        None => Err(t.raise_null_pointer()),
        Some(object) => {
            let body = object.array().expect("array opcode on non-array object");
            if index < 0 || index as usize >= body.len() {
                Err(t.raise_array_index(index, body.len()))
            } else {
                Ok(body)
            }
        }
    }
}

// =============================================================================
// Loads
// =============================================================================

pub(crate) fn iaload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert_eq!(body.element_kind(), TypeCode::Int);
            let value = body.load(index as usize);
            t.push_int(value as u32);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn laload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert!(matches!(
                body.element_kind(),
                TypeCode::Long | TypeCode::Double
            ));
            let value = body.load(index as usize);
            t.push_long(value);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn faload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert_eq!(body.element_kind(), TypeCode::Float);
            let value = body.load(index as usize);
            t.push_int(value as u32);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn daload(t: &mut VmThread) -> Control {
    laload(t)
}

pub(crate) fn aaload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert_eq!(body.element_kind(), TypeCode::Object);
            let word = body.load(index as usize) as usize;
            // Object array cells only ever hold reference words.
            let value = unsafe { ObjRef::from_word(word) };
            t.push_object(value);
            Control::Next
        }
        Err(control) => control,
    }
}

/// Serves byte and boolean arrays alike.
pub(crate) fn baload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert!(matches!(
                body.element_kind(),
                TypeCode::Byte | TypeCode::Boolean
            ));
            let value = body.load(index as usize);
            t.push_int(value as u32);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn caload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert_eq!(body.element_kind(), TypeCode::Char);
            let value = body.load(index as usize);
            t.push_int(value as u32);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn saload(t: &mut VmThread) -> Control {
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert_eq!(body.element_kind(), TypeCode::Short);
            let value = body.load(index as usize);
            t.push_int(value as u32);
            Control::Next
        }
        Err(control) => control,
    }
}

// =============================================================================
// Stores
// =============================================================================

pub(crate) fn iastore(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            body.store(index as usize, value as u64);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn lastore(t: &mut VmThread) -> Control {
    let value = t.pop_long();
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            body.store(index as usize, value);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn fastore(t: &mut VmThread) -> Control {
    iastore(t)
}

pub(crate) fn dastore(t: &mut VmThread) -> Control {
    lastore(t)
}

pub(crate) fn aastore(t: &mut VmThread) -> Control {
    let value = t.pop_object();
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            body.store(index as usize, value.as_word() as u64);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn bastore(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    let index = t.pop_int() as i32;
    let array = t.pop_object();
    match array_at(t, array, index) {
        Ok(body) => {
            debug_assert!(matches!(
                body.element_kind(),
                TypeCode::Byte | TypeCode::Boolean
            ));
            body.store(index as usize, value as u64);
            Control::Next
        }
        Err(control) => control,
    }
}

pub(crate) fn castore(t: &mut VmThread) -> Control {
    iastore(t)
}

pub(crate) fn sastore(t: &mut VmThread) -> Control {
    iastore(t)
}

// =============================================================================
// Allocation and length
// =============================================================================

pub(crate) fn newarray(t: &mut VmThread) -> Control {
    let count = t.pop_int() as i32;
    if count < 0 {
        return t.raise_negative_array_size(count);
    }
    let type_code = t.read_u8();
    let kind = match type_code {
        array_type::T_BOOLEAN => TypeCode::Boolean,
        array_type::T_CHAR => TypeCode::Char,
        array_type::T_FLOAT => TypeCode::Float,
        array_type::T_DOUBLE => TypeCode::Double,
        array_type::T_BYTE => TypeCode::Byte,
        array_type::T_SHORT => TypeCode::Short,
        array_type::T_INT => TypeCode::Int,
        array_type::T_LONG => TypeCode::Long,
        other => panic!("invalid newarray element type {other}"),
    };
    let runtime = t.runtime().clone();
    let array = runtime.make_primitive_array(kind, count as usize);
    t.push_object(array);
    Control::Next
}

pub(crate) fn anewarray(t: &mut VmThread) -> Control {
    let count = t.pop_int() as i32;
    if count < 0 {
        return t.raise_negative_array_size(count);
    }
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let component = match resolve_class_in_pool(&runtime, t.current_method(), index) {
        Ok(class) => class,
        Err(error) => return t.raise_linkage(&error),
    };
    let array = runtime.make_object_array(component, count as usize);
    t.push_object(array);
    Control::Next
}

pub(crate) fn multianewarray(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let dimensions = t.read_u8() as usize;

    let runtime = t.runtime().clone();
    let class = match resolve_class_in_pool(&runtime, t.current_method(), index) {
        Ok(class) => class,
        Err(error) => return t.raise_linkage(&error),
    };

    let mut counts: SmallVec<[i32; 4]> = SmallVec::from_elem(0, dimensions);
    for i in (0..dimensions).rev() {
        counts[i] = t.pop_int() as i32;
        if counts[i] < 0 {
            return t.raise_negative_array_size(counts[i]);
        }
    }

    let array = populate_multi_array(&runtime, class, &counts);
    t.push_object(array);
    Control::Next
}

/// Build a rank-`counts.len()` array of `class`, filling nested
/// dimensions recursively. Dimensions past the popped counts stay null.
fn populate_multi_array(runtime: &Runtime, class: ClassRef, counts: &[i32]) -> ObjRef {
    let length = counts[0] as usize;
    let array = runtime.make_array_with_class(class, length);
    if counts.len() > 1 {
        let component = class
            .array_kind()
            .and_then(|kind| kind.component)
            .expect("multi-dimensional array class without component");
        let body = array.get().and_then(|o| o.array()).expect("fresh array");
        for i in 0..length {
            let nested = populate_multi_array(runtime, component, &counts[1..]);
            body.store(i, nested.as_word() as u64);
        }
    }
    array
}

pub(crate) fn arraylength(t: &mut VmThread) -> Control {
    let array = t.pop_object();
    match array.get() {
        Some(object) => {
            let body = object.array().expect("arraylength on non-array object");
            t.push_int(body.len() as u32);
            Control::Next
        }
        None => t.raise_null_pointer(),
    }
}
