//! Lazy class initialization during dispatch.
//!
//! Rather than running `<clinit>` recursively on the Rust call stack, the
//! dispatcher rewinds `ip` so the triggering instruction re-executes after
//! initialization, then enters the initializer as an ordinary frame. The
//! per-thread class-init list is the persistent state that lets the frame
//! machine detect the initializer's completion and the facade answer
//! re-entrance queries.

use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_runtime::ClassRef;

/// Trigger initialization of `class` if it still needs it.
///
/// Returns the control transfer that enters `<clinit>` when this thread
/// claimed the run (after rewinding `ip` by `ip_rewind` bytes so the
/// triggering instruction replays), a throw when a previous initializer
/// failed, and `None` when execution can simply continue.
pub(crate) fn class_init(t: &mut VmThread, class: ClassRef, ip_rewind: usize) -> Option<Control> {
    if !class.needs_init() {
        return None;
    }
    match class.pre_init() {
        Ok(true) => {
            let initializer = class
                .initializer()
                .expect("claimed initialization of class without <clinit>");
            t.class_init_list.push(class);
            t.ip -= ip_rewind;
            Some(Control::Invoke(initializer))
        }
        Ok(false) => None,
        Err(error) => Some(t.raise_linkage(&error)),
    }
}

/// Is `class` mid-initialization on this thread, through either the
/// interpreter's list or a reflective facade entry?
pub fn is_initializing(t: &VmThread, class: ClassRef) -> bool {
    t.class_init_list
        .iter()
        .chain(t.class_init_stack.iter())
        .any(|&c| std::ptr::eq(c, class))
}
