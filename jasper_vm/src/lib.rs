//! Stack-based class-file interpreter core.
//!
//! This crate executes verified method bodies against a tagged
//! operand/frame stack. Four subsystems cooperate:
//!
//! - the **tagged stack and frame machine** ([`stack`], [`frame`]): a
//!   fixed per-thread array of (tag, value) word pairs, with call frames
//!   threaded through it via four bookkeeping slots;
//! - the **instruction dispatcher** ([`dispatch`], [`ops`]): a static
//!   table of per-opcode handlers covering the canonical instruction
//!   range, the `wide` prefix, and the bootstrap reentry arm;
//! - the **native invocation bridge** ([`native`]): descriptor-driven
//!   argument marshalling into the platform calling convention, with a
//!   direct path for registered fast natives;
//! - the **exception unwinder** ([`unwind`]): frame-by-frame handler
//!   table search with catch-type resolution.
//!
//! The [`Processor`] facade ties them together for the surrounding
//! runtime: thread creation, invocation by method or symbolic name,
//! stack walking, and root enumeration.
//!
//! # Example
//!
//! ```ignore
//! let runtime = Runtime::new();
//! let processor = Processor::new(runtime.clone());
//! let mut thread = processor.make_thread();
//! let result = processor.invoke(&mut thread, method, None, &[JValue::Int(3)])?;
//! ```

mod class_init;
mod dispatch;
mod frame;
mod native;
mod ops;
mod processor;
mod stack;
mod thread;
mod unwind;

pub use class_init::is_initializing;
pub use processor::Processor;
pub use stack::{TaggedStack, STACK_SLOT_COUNT, STACK_SLOT_LIMIT};
pub use thread::VmThread;
