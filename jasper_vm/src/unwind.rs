//! Exception unwinding: handler lookup and the frame-popping loop.

use crate::frame::FRAME_FOOTPRINT;
use crate::thread::VmThread;
use jasper_runtime::pool::{instance_of, resolve_class_in_pool};

/// Search `frame`'s handler table for the saved instruction pointer.
///
/// A row matches when the throwing pc lies in `[start, end)` and the
/// catch type is absent (finally) or the pending exception is an instance
/// of it. A catch type that fails to resolve merely disqualifies its row.
pub(crate) fn find_exception_handler(t: &VmThread, frame: isize) -> Option<usize> {
    let method = t.frame_method(frame);
    let code = method.code()?;
    let exception = t.pending_exception()?;
    // The saved ip points past the faulting opcode's last consumed byte.
    let pc = t.frame_ip(frame).wrapping_sub(1);

    for handler in code.handlers() {
        if pc < handler.start as usize || pc >= handler.end as usize {
            continue;
        }
        if handler.catch_type != 0 {
            let catch = match resolve_class_in_pool(t.runtime(), method, handler.catch_type) {
                Ok(class) => class,
                Err(_) => continue,
            };
            if !instance_of(catch, exception) {
                continue;
            }
        }
        return Some(handler.handler_pc as usize);
    }
    None
}

/// Walk frames from the current one down to `base` looking for a handler.
///
/// On a match the operand area is trimmed to the frame's stack base, the
/// caught exception is pushed, and true is returned with `ip` at the
/// handler. Otherwise every frame down to and including `base` is popped
/// and the exception stays pending for the caller.
pub(crate) fn unwind(t: &mut VmThread, base: isize) -> bool {
    t.spill_ip();
    while t.frame >= base && t.frame >= 0 {
        if let Some(handler_pc) = find_exception_handler(t, t.frame) {
            t.stack.set_sp(t.frame as usize + FRAME_FOOTPRINT);
            t.ip = handler_pc;
            let exception = t
                .take_pending_exception()
                .expect("unwinding without a pending exception");
            t.stack.push_object(exception);
            return true;
        }
        t.pop_frame();
    }
    false
}
