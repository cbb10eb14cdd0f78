//! Field access: `getfield`, `putfield`, `getstatic`, `putstatic`.
//!
//! Volatile accesses get acquire/release ordering from the field
//! storage; 64-bit volatiles on 32-bit hosts fall back to the field's
//! own monitor so a concurrent reader can never observe a torn value.

use crate::class_init::class_init;
use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_core::TypeCode;
use jasper_runtime::pool::resolve_field;
use jasper_runtime::{Field, FieldStorage, ObjRef};

/// Does this access take the per-field monitor instead of fences?
#[inline]
fn wide_volatile(field: &Field) -> bool {
    field.is_volatile()
        && cfg!(target_pointer_width = "32")
        && matches!(field.kind(), TypeCode::Long | TypeCode::Double)
}

/// Push a field's value from `storage`, typed by the field kind.
fn push_field(t: &mut VmThread, storage: &FieldStorage, field: &Field, volatile: bool) {
    let raw = storage.load_typed(field.offset(), field.kind(), volatile);
    match field.kind() {
        TypeCode::Long | TypeCode::Double => t.push_long(raw),
        TypeCode::Object => {
            // Reference cells only ever hold words stored from ObjRef.
            let value = unsafe { ObjRef::from_word(raw as usize) };
            t.push_object(value);
        }
        _ => t.push_int(raw as u32),
    }
}

pub(crate) fn getfield(t: &mut VmThread) -> Control {
    if t.stack.peek_object(t.sp() - 1).is_null() {
        return t.raise_null_pointer();
    }
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let field = match resolve_field(&runtime, t.current_method(), index) {
        Ok(field) => field,
        Err(error) => return t.raise_linkage(&error),
    };
    debug_assert!(!field.is_static());

    let locked = wide_volatile(field);
    if locked {
        field.monitor().acquire();
    }

    let target = t.pop_object().get().expect("null checked above");
    push_field(t, target.fields(), field, field.is_volatile() && !locked);

    if locked {
        field.monitor().release();
    }
    Control::Next
}

pub(crate) fn getstatic(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let field = match resolve_field(&runtime, t.current_method(), index) {
        Ok(field) => field,
        Err(error) => return t.raise_linkage(&error),
    };
    debug_assert!(field.is_static());

    if let Some(control) = class_init(t, field.class(), 3) {
        return control;
    }

    let locked = wide_volatile(field);
    if locked {
        field.monitor().acquire();
    }

    push_field(
        t,
        field.class().static_table(),
        field,
        field.is_volatile() && !locked,
    );

    if locked {
        field.monitor().release();
    }
    Control::Next
}

pub(crate) fn putfield(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let field = match resolve_field(&runtime, t.current_method(), index) {
        Ok(field) => field,
        Err(error) => return t.raise_linkage(&error),
    };
    debug_assert!(!field.is_static());

    let locked = wide_volatile(field);
    if locked {
        field.monitor().acquire();
    }
    let volatile = field.is_volatile() && !locked;

    let control = match field.kind() {
        TypeCode::Long | TypeCode::Double => {
            let value = t.pop_long();
            let target = t.pop_object();
            match target.get() {
                Some(object) => {
                    object
                        .fields()
                        .store_typed(field.offset(), field.kind(), value, volatile);
                    Control::Next
                }
                None => t.raise_null_pointer(),
            }
        }
        TypeCode::Object => {
            let value = t.pop_object();
            let target = t.pop_object();
            match target.get() {
                Some(object) => {
                    if runtime.field_write_permitted(target, value, field) {
                        object.fields().store_typed(
                            field.offset(),
                            field.kind(),
                            value.as_word() as u64,
                            volatile,
                        );
                        Control::Next
                    } else {
                        let message =
                            format!("field assignment rejected: {}.{}", field.class().name(), field.name());
                        let exception = runtime.make_incompatible_class_change_error(&message);
                        t.raise(exception)
                    }
                }
                None => t.raise_null_pointer(),
            }
        }
        _ => {
            let value = t.pop_int();
            let target = t.pop_object();
            match target.get() {
                Some(object) => {
                    object
                        .fields()
                        .store_typed(field.offset(), field.kind(), value as u64, volatile);
                    Control::Next
                }
                None => t.raise_null_pointer(),
            }
        }
    };

    if locked {
        field.monitor().release();
    }
    control
}

pub(crate) fn putstatic(t: &mut VmThread) -> Control {
    let index = t.read_u16();
    let runtime = t.runtime().clone();
    let field = match resolve_field(&runtime, t.current_method(), index) {
        Ok(field) => field,
        Err(error) => return t.raise_linkage(&error),
    };
    debug_assert!(field.is_static());

    if let Some(control) = class_init(t, field.class(), 3) {
        return control;
    }

    let locked = wide_volatile(field);
    if locked {
        field.monitor().acquire();
    }
    let volatile = field.is_volatile() && !locked;

    let table = field.class().static_table();
    match field.kind() {
        TypeCode::Long | TypeCode::Double => {
            let value = t.pop_long();
            table.store_typed(field.offset(), field.kind(), value, volatile);
        }
        TypeCode::Object => {
            let value = t.pop_object();
            table.store_typed(
                field.offset(),
                field.kind(),
                value.as_word() as u64,
                volatile,
            );
        }
        _ => {
            let value = t.pop_int();
            table.store_typed(field.offset(), field.kind(), value as u64, volatile);
        }
    }

    if locked {
        field.monitor().release();
    }
    Control::Next
}
