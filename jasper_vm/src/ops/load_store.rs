//! Local variable loads and stores.
//!
//! Float loads and stores share the int handlers (same slot shape), and
//! double shares long; the dispatch table maps both opcodes to one
//! handler, so only the distinct shapes appear here.

use crate::dispatch::Control;
use crate::thread::VmThread;

pub(crate) fn iload(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let value = t.local_int(index);
    t.push_int(value);
    Control::Next
}

pub(crate) fn iload_0(t: &mut VmThread) -> Control {
    let value = t.local_int(0);
    t.push_int(value);
    Control::Next
}

pub(crate) fn iload_1(t: &mut VmThread) -> Control {
    let value = t.local_int(1);
    t.push_int(value);
    Control::Next
}

pub(crate) fn iload_2(t: &mut VmThread) -> Control {
    let value = t.local_int(2);
    t.push_int(value);
    Control::Next
}

pub(crate) fn iload_3(t: &mut VmThread) -> Control {
    let value = t.local_int(3);
    t.push_int(value);
    Control::Next
}

pub(crate) fn lload(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let value = t.local_long(index);
    t.push_long(value);
    Control::Next
}

pub(crate) fn lload_0(t: &mut VmThread) -> Control {
    let value = t.local_long(0);
    t.push_long(value);
    Control::Next
}

pub(crate) fn lload_1(t: &mut VmThread) -> Control {
    let value = t.local_long(1);
    t.push_long(value);
    Control::Next
}

pub(crate) fn lload_2(t: &mut VmThread) -> Control {
    let value = t.local_long(2);
    t.push_long(value);
    Control::Next
}

pub(crate) fn lload_3(t: &mut VmThread) -> Control {
    let value = t.local_long(3);
    t.push_long(value);
    Control::Next
}

pub(crate) fn aload(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let value = t.local_object(index);
    t.push_object(value);
    Control::Next
}

pub(crate) fn aload_0(t: &mut VmThread) -> Control {
    let value = t.local_object(0);
    t.push_object(value);
    Control::Next
}

pub(crate) fn aload_1(t: &mut VmThread) -> Control {
    let value = t.local_object(1);
    t.push_object(value);
    Control::Next
}

pub(crate) fn aload_2(t: &mut VmThread) -> Control {
    let value = t.local_object(2);
    t.push_object(value);
    Control::Next
}

pub(crate) fn aload_3(t: &mut VmThread) -> Control {
    let value = t.local_object(3);
    t.push_object(value);
    Control::Next
}

pub(crate) fn istore(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let value = t.pop_int();
    t.set_local_int(index, value);
    Control::Next
}

pub(crate) fn istore_0(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    t.set_local_int(0, value);
    Control::Next
}

pub(crate) fn istore_1(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    t.set_local_int(1, value);
    Control::Next
}

pub(crate) fn istore_2(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    t.set_local_int(2, value);
    Control::Next
}

pub(crate) fn istore_3(t: &mut VmThread) -> Control {
    let value = t.pop_int();
    t.set_local_int(3, value);
    Control::Next
}

pub(crate) fn lstore(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let value = t.pop_long();
    t.set_local_long(index, value);
    Control::Next
}

pub(crate) fn lstore_0(t: &mut VmThread) -> Control {
    let value = t.pop_long();
    t.set_local_long(0, value);
    Control::Next
}

pub(crate) fn lstore_1(t: &mut VmThread) -> Control {
    let value = t.pop_long();
    t.set_local_long(1, value);
    Control::Next
}

pub(crate) fn lstore_2(t: &mut VmThread) -> Control {
    let value = t.pop_long();
    t.set_local_long(2, value);
    Control::Next
}

pub(crate) fn lstore_3(t: &mut VmThread) -> Control {
    let value = t.pop_long();
    t.set_local_long(3, value);
    Control::Next
}

// Reference stores copy the slot tag along with the value, so a
// subroutine return address stored by astore survives intact.

pub(crate) fn astore(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    t.store_local(index);
    Control::Next
}

pub(crate) fn astore_0(t: &mut VmThread) -> Control {
    t.store_local(0);
    Control::Next
}

pub(crate) fn astore_1(t: &mut VmThread) -> Control {
    t.store_local(1);
    Control::Next
}

pub(crate) fn astore_2(t: &mut VmThread) -> Control {
    t.store_local(2);
    Control::Next
}

pub(crate) fn astore_3(t: &mut VmThread) -> Control {
    t.store_local(3);
    Control::Next
}

pub(crate) fn iinc(t: &mut VmThread) -> Control {
    let index = t.read_u8() as usize;
    let constant = t.read_u8() as i8;
    let value = (t.local_int(index) as i32).wrapping_add(constant as i32);
    t.set_local_int(index, value as u32);
    Control::Next
}
