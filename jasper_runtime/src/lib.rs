//! Process-wide runtime services for the jasper virtual machine.
//!
//! This crate owns everything shared between interpreter threads: the
//! object model (instances, typed arrays, throwables, strings), classes
//! with their virtual and interface tables, method and code bodies, the
//! constant pool and its resolution, object monitors, class-initialization
//! coordination, the string intern table, and the native-call system
//! abstraction.
//!
//! Heap objects and class metadata are allocated once and live for the
//! lifetime of the process; reclaiming them is a collector's job and no
//! collector runs here. What the runtime does guarantee is the root
//! contract: every reference the interpreter can observe is reachable from
//! its tagged stack slots and class-init list, which the execution engine
//! exposes to a visitor.

pub mod class;
pub mod heap;
pub mod method;
pub mod monitor;
pub mod object;
pub mod pool;
pub mod runtime;
pub mod system;
pub mod value;

pub use class::{AccessFlags, ArrayKind, Class, ClassBuilder, ClassRef, ClassVmFlags, Field};
pub use heap::Heap;
pub use method::{
    Code, ExceptionHandler, Method, MethodBody, MethodRef, MethodVmFlags, NativeMethodData,
};
pub use monitor::{Monitor, ThreadInterrupt};
pub use object::{ArrayBody, FieldStorage, ObjRef, Object, ObjectBody};
pub use pool::{ConstPool, LinkageError, PoolEntry};
pub use runtime::{FieldGuard, Runtime, TraceElement, WellKnown};
pub use system::{FastNativeFn, HostSystem, NativeEnv, NativeFunction, System};
pub use value::JValue;

/// Class-loader identity. Loader 0 is the bootstrap loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(pub u32);

impl LoaderId {
    pub const BOOT: LoaderId = LoaderId(0);
}
