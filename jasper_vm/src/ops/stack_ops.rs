//! Pure stack reshuffling: pop, dup family, swap.
//!
//! These copy whole slots, tags included, so they work identically on
//! references, ints, and the halves of wide values.

use crate::dispatch::Control;
use crate::thread::VmThread;

pub(crate) fn pop(t: &mut VmThread) -> Control {
    t.stack.drop_slots(1);
    Control::Next
}

pub(crate) fn pop2(t: &mut VmThread) -> Control {
    t.stack.drop_slots(2);
    Control::Next
}

pub(crate) fn dup(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 1, sp);
    t.stack.set_sp(sp + 1);
    Control::Next
}

pub(crate) fn dup_x1(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 1, sp);
    t.stack.copy_slot(sp - 2, sp - 1);
    t.stack.copy_slot(sp, sp - 2);
    t.stack.set_sp(sp + 1);
    Control::Next
}

pub(crate) fn dup_x2(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 1, sp);
    t.stack.copy_slot(sp - 2, sp - 1);
    t.stack.copy_slot(sp - 3, sp - 2);
    t.stack.copy_slot(sp, sp - 3);
    t.stack.set_sp(sp + 1);
    Control::Next
}

pub(crate) fn dup2(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 2, sp);
    t.stack.copy_slot(sp - 1, sp + 1);
    t.stack.set_sp(sp + 2);
    Control::Next
}

pub(crate) fn dup2_x1(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 1, sp + 1);
    t.stack.copy_slot(sp - 2, sp);
    t.stack.copy_slot(sp - 3, sp - 1);
    t.stack.copy_slot(sp, sp - 3);
    t.stack.copy_slot(sp + 1, sp - 2);
    t.stack.set_sp(sp + 2);
    Control::Next
}

pub(crate) fn dup2_x2(t: &mut VmThread) -> Control {
    let sp = t.stack.sp();
    t.stack.copy_slot(sp - 1, sp + 1);
    t.stack.copy_slot(sp - 2, sp);
    t.stack.copy_slot(sp - 3, sp - 1);
    t.stack.copy_slot(sp - 4, sp - 2);
    t.stack.copy_slot(sp, sp - 4);
    t.stack.copy_slot(sp + 1, sp - 3);
    t.stack.set_sp(sp + 2);
    Control::Next
}

pub(crate) fn swap(t: &mut VmThread) -> Control {
    t.stack.swap_top();
    Control::Next
}
