//! Long and floating comparison opcodes.
//!
//! `fcmpl`/`dcmpl` resolve an unordered comparison to -1, `fcmpg`/`dcmpg`
//! to +1, which is what lets compilers pick the branch-friendly variant.

use crate::dispatch::Control;
use crate::thread::VmThread;

pub(crate) fn lcmp(t: &mut VmThread) -> Control {
    let b = t.pop_long() as i64;
    let a = t.pop_long() as i64;
    let result = if a > b {
        1
    } else if a == b {
        0
    } else {
        -1i32
    };
    t.push_int(result as u32);
    Control::Next
}

pub(crate) fn fcmpl(t: &mut VmThread) -> Control {
    let b = t.pop_float();
    let a = t.pop_float();
    let result = if a < b {
        -1
    } else if a > b {
        1
    } else if a == b {
        0
    } else {
        -1i32
    };
    t.push_int(result as u32);
    Control::Next
}

pub(crate) fn fcmpg(t: &mut VmThread) -> Control {
    let b = t.pop_float();
    let a = t.pop_float();
    let result = if a < b {
        -1
    } else if a > b {
        1
    } else if a == b {
        0
    } else {
        1i32
    };
    t.push_int(result as u32);
    Control::Next
}

pub(crate) fn dcmpl(t: &mut VmThread) -> Control {
    let b = t.pop_double();
    let a = t.pop_double();
    let result = if a < b {
        -1
    } else if a > b {
        1
    } else if a == b {
        0
    } else {
        -1i32
    };
    t.push_int(result as u32);
    Control::Next
}

pub(crate) fn dcmpg(t: &mut VmThread) -> Control {
    let b = t.pop_double();
    let a = t.pop_double();
    let result = if a < b {
        -1
    } else if a > b {
        1
    } else if a == b {
        0
    } else {
        1i32
    };
    t.push_int(result as u32);
    Control::Next
}
