//! The native invocation bridge.
//!
//! On a native method's first call the bridge parses its descriptor into
//! a calling-convention type vector (prefixed by two pointers for the
//! environment and the receiver or class), accumulates the argument-table
//! size under platform padding rules, and resolves the target symbol.
//! The descriptor is cached on the method; the cache cell's own
//! synchronization orders publication against concurrent callers.
//!
//! Two calling paths exist. Fast natives get a flat word array with
//! objects passed as raw handles and are invoked directly. Slow natives
//! run under a pushed frame with object arguments indirected through
//! stack slots, so a collector could update them while the call is out of
//! interpreter control.

use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_core::{DescriptorCursor, NativeType, TypeCode};
use jasper_runtime::{
    Class, Method, MethodRef, MethodVmFlags, NativeEnv, NativeFunction, NativeMethodData, ObjRef,
};
use smallvec::SmallVec;

type ArgWords = SmallVec<[usize; 12]>;

/// Mangle a method's class and name into its native symbol, JNI style.
fn mangled_symbol(method: &Method) -> String {
    fn mangle_into(out: &mut String, part: &str) {
        for c in part.chars() {
            match c {
                '/' => out.push('_'),
                '_' => out.push_str("_1"),
                c => out.push(c),
            }
        }
    }

    let mut symbol = String::from("Java_");
    mangle_into(&mut symbol, method.class().name());
    symbol.push('_');
    mangle_into(&mut symbol, method.name());
    symbol
}

/// Build and cache the calling descriptor for `method`, resolving its
/// symbol through the system loader.
fn resolve_native_data<'m>(
    t: &mut VmThread,
    method: &'m Method,
) -> Result<&'m NativeMethodData, Control> {
    let cell = method.native_data().expect("native call on bytecode method");
    if let Some(data) = cell.get() {
        return Ok(data);
    }

    let symbol = mangled_symbol(method);
    let function = match t.runtime().system().resolve(&symbol) {
        Some(function) => function,
        None => {
            let message = format!(
                "{}.{}{}",
                method.class().name(),
                method.name(),
                method.spec()
            );
            let exception = t.runtime().make_unsatisfied_link_error(&message);
            return Err(t.raise(exception));
        }
    };

    let word = std::mem::size_of::<usize>();
    let mut parameter_types: Vec<NativeType> = vec![NativeType::Pointer, NativeType::Pointer];
    let mut argument_table_size = 2 * word;
    let mut cursor = DescriptorCursor::new(method.spec()).expect("validated descriptor");
    while cursor.has_next() {
        let native = cursor.next().expect("validated descriptor").native_type();
        parameter_types.push(native);
        argument_table_size += native.padded_size();
    }

    let _ = cell.set(NativeMethodData {
        function,
        parameter_types: parameter_types.into_boxed_slice(),
        argument_table_size,
        return_type: method.return_code().native_type(),
    });
    Ok(cell.get().expect("descriptor cache just filled"))
}

/// Marshal stack slots starting at the frame base into argument words.
///
/// `start` indexes the parameter-type vector past the environment entry:
/// 0 marshals the receiver, 1 skips to the first declared parameter.
/// With `indirect`, object arguments become pointers to their stack
/// slots (null becoming the null pointer itself).
fn marshal_arguments(
    t: &mut VmThread,
    args: &mut ArgWords,
    start: usize,
    data: &NativeMethodData,
    indirect: bool,
) {
    let count = data.parameter_types.len() - 1;
    let mut sp = t.frame_base(t.frame);
    for i in start..count {
        match data.parameter_types[i + 1] {
            NativeType::Int8 | NativeType::Int16 | NativeType::Int32 | NativeType::Float => {
                args.push(t.stack.peek_int(sp) as usize);
                sp += 1;
            }
            NativeType::Int64 | NativeType::Double => {
                let value = t.stack.peek_long(sp);
                if std::mem::size_of::<usize>() == 8 {
                    args.push(value as usize);
                } else {
                    args.push(value as u32 as usize);
                    args.push((value >> 32) as usize);
                }
                sp += 2;
            }
            NativeType::Pointer => {
                if indirect {
                    let word = if t.stack.peek_object(sp).is_null() {
                        0
                    } else {
                        t.stack.slot_value_ptr(sp) as usize
                    };
                    args.push(word);
                } else {
                    args.push(t.stack.peek_object(sp).as_word());
                }
                sp += 1;
            }
            NativeType::Void => unreachable!("void parameter"),
        }
    }
}

/// Push a native call's 64-bit result, typed by the method's return code.
/// Indirect object results arrive as a pointer to a reference slot.
fn push_result(t: &mut VmThread, return_code: TypeCode, result: u64, indirect: bool) {
    match return_code {
        TypeCode::Byte | TypeCode::Boolean => t.push_int(result as u8 as i8 as i32 as u32),
        TypeCode::Char => t.push_int(result as u16 as u32),
        TypeCode::Short => t.push_int(result as u16 as i16 as i32 as u32),
        TypeCode::Int | TypeCode::Float => t.push_int(result as u32),
        TypeCode::Long | TypeCode::Double => t.push_long(result),
        TypeCode::Object => {
            let object = if indirect {
                if result == 0 {
                    ObjRef::NULL
                } else {
                    // A handle produced by push_reference or a local
                    // reference slot.
                    unsafe { ObjRef::from_word(*(result as *const usize)) }
                }
            } else {
                unsafe { ObjRef::from_word(result as usize) }
            };
            t.push_object(object);
        }
        TypeCode::Void => {}
    }
}

/// Call a native method; on return its typed result is on the caller's
/// operand stack.
pub(crate) fn invoke_native(t: &mut VmThread, method: MethodRef) -> Control {
    let data = match resolve_native_data(t, method) {
        Ok(data) => data,
        Err(control) => return control,
    };

    if method.vm_flags().contains(MethodVmFlags::FAST_NATIVE) {
        invoke_native_fast(t, method, data)
    } else {
        invoke_native_slow(t, method, data)
    }
}

fn invoke_native_fast(t: &mut VmThread, method: MethodRef, data: &NativeMethodData) -> Control {
    t.push_frame(method);

    let mut args = ArgWords::new();
    let start = usize::from(method.is_static());
    marshal_arguments(t, &mut args, start, data, false);

    let function = match &data.function {
        NativeFunction::Fast(function) => *function,
        NativeFunction::Slow(_) => panic!(
            "fast-native method {} resolved to a trampolined function",
            method.name()
        ),
    };
    let env = NativeEnv(t as *mut VmThread as *mut ());
    let result = function(env, method, &args);

    t.pop_frame();
    if t.pending_exception().is_some() {
        return Control::Throw;
    }
    push_result(t, method.return_code(), result, false);
    Control::Next
}

fn invoke_native_slow(t: &mut VmThread, method: MethodRef, data: &NativeMethodData) -> Control {
    t.push_frame(method);

    let mut args = ArgWords::new();
    args.push(t as *mut VmThread as usize);

    let start = if method.is_static() {
        // Static natives receive their class where instance natives
        // receive the receiver. Classes are pinned, so the pointer is
        // passed directly.
        args.push(method.class() as *const Class as usize);
        1
    } else {
        0
    };
    marshal_arguments(t, &mut args, start, data, true);

    // The call leaves interpreter control; a coordinating collector would
    // treat the thread as idle for its duration.
    let runtime = t.runtime().clone();
    let result = runtime.system().call(
        &data.function,
        &args,
        &data.parameter_types,
        data.parameter_types.len(),
        data.argument_table_size,
        data.return_type,
    );

    t.pop_frame();
    if t.pending_exception().is_some() {
        return Control::Throw;
    }
    push_result(t, method.return_code(), result, true);
    Control::Next
}
