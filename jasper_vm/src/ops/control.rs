//! Branches, switches, subroutines, and returns.
//!
//! Branch offsets are relative to the opcode byte: by the time the
//! operand has been read, `ip` sits past the whole instruction, so the
//! target is `ip - length + offset`. Switch tables are 4-byte aligned
//! after the opcode byte.

use crate::dispatch::{Control, ReturnValue};
use crate::thread::VmThread;
use jasper_runtime::{ClassVmFlags, MethodVmFlags};
use std::sync::atomic::{fence, Ordering};

pub(crate) fn nop(_t: &mut VmThread) -> Control {
    Control::Next
}

/// Apply a pc-relative branch for an instruction of `length` bytes.
#[inline]
fn branch(t: &mut VmThread, offset: i32, length: usize) {
    t.ip = (t.ip as i64 - length as i64 + offset as i64) as usize;
}

// =============================================================================
// Conditional branches
// =============================================================================

pub(crate) fn ifeq(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if t.pop_int() == 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifne(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if t.pop_int() != 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn iflt(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if (t.pop_int() as i32) < 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifge(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if (t.pop_int() as i32) >= 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifgt(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if (t.pop_int() as i32) > 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifle(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if (t.pop_int() as i32) <= 0 {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmpeq(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a == b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmpne(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a != b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmplt(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a < b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmpge(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a >= b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmpgt(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a > b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_icmple(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_int() as i32;
    let a = t.pop_int() as i32;
    if a <= b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_acmpeq(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_object();
    let a = t.pop_object();
    if a == b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn if_acmpne(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let b = t.pop_object();
    let a = t.pop_object();
    if a != b {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifnull(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if t.pop_object().is_null() {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

pub(crate) fn ifnonnull(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    if !t.pop_object().is_null() {
        branch(t, offset as i32, 3);
    }
    Control::Next
}

// =============================================================================
// Unconditional transfers
// =============================================================================

pub(crate) fn goto(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    branch(t, offset as i32, 3);
    Control::Next
}

pub(crate) fn goto_w(t: &mut VmThread) -> Control {
    let offset = t.read_i32();
    branch(t, offset, 5);
    Control::Next
}

pub(crate) fn jsr(t: &mut VmThread) -> Control {
    let offset = t.read_i16();
    let return_address = t.ip as u32;
    t.push_int(return_address);
    branch(t, offset as i32, 3);
    Control::Next
}

pub(crate) fn jsr_w(t: &mut VmThread) -> Control {
    let offset = t.read_i32();
    let return_address = t.ip as u32;
    t.push_int(return_address);
    branch(t, offset, 5);
    Control::Next
}

pub(crate) fn ret(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    t.ip = t.local_int(index) as usize;
    Control::Next
}

// =============================================================================
// Switches
// =============================================================================

pub(crate) fn tableswitch(t: &mut VmThread) -> Control {
    let base = t.ip - 1;
    t.ip += 3;
    t.ip -= t.ip % 4;

    let default = t.read_i32();
    let low = t.read_i32();
    let high = t.read_i32();
    let key = t.pop_int() as i32;

    let target = if key >= low && key <= high {
        let entry = t.ip + (key - low) as usize * 4;
        t.code_i32_at(entry)
    } else {
        default
    };
    t.ip = (base as i64 + target as i64) as usize;
    Control::Next
}

pub(crate) fn lookupswitch(t: &mut VmThread) -> Control {
    let base = t.ip - 1;
    t.ip += 3;
    t.ip -= t.ip % 4;

    let default = t.read_i32();
    let pair_count = t.read_i32();
    let key = t.pop_int() as i32;

    // Pairs are sorted by key; binary search.
    let mut bottom = 0i32;
    let mut top = pair_count;
    while bottom < top {
        let middle = bottom + (top - bottom) / 2;
        let entry = t.ip + middle as usize * 8;
        let candidate = t.code_i32_at(entry);
        if key < candidate {
            top = middle;
        } else if key > candidate {
            bottom = middle + 1;
        } else {
            let target = t.code_i32_at(entry + 4);
            t.ip = (base as i64 + target as i64) as usize;
            return Control::Next;
        }
    }

    t.ip = (base as i64 + default as i64) as usize;
    Control::Next
}

// =============================================================================
// Returns
// =============================================================================

pub(crate) fn ireturn(t: &mut VmThread) -> Control {
    let result = t.pop_int();
    Control::Return(ReturnValue::Int(result))
}

pub(crate) fn lreturn(t: &mut VmThread) -> Control {
    let result = t.pop_long();
    Control::Return(ReturnValue::Long(result))
}

pub(crate) fn areturn(t: &mut VmThread) -> Control {
    let result = t.pop_object();
    Control::Return(ReturnValue::Object(result))
}

pub(crate) fn return_void(t: &mut VmThread) -> Control {
    let method = t.current_method();
    // Completing a constructor of a class with final members publishes
    // them before the reference can escape.
    if method.vm_flags().contains(MethodVmFlags::CONSTRUCTOR)
        && method
            .class()
            .vm_flags()
            .contains(ClassVmFlags::HAS_FINAL_MEMBER)
    {
        fence(Ordering::Release);
    }
    Control::Return(ReturnValue::Void)
}
