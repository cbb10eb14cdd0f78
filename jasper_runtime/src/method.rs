//! Methods, bytecode bodies, and cached native descriptors.

use crate::class::{AccessFlags, ClassRef};
use crate::pool::ConstPool;
use crate::system::NativeFunction;
use bitflags::bitflags;
use jasper_core::{descriptor, DescriptorError, NativeType, TypeCode};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// A linked method. Pinned for the process lifetime.
pub type MethodRef = &'static Method;

bitflags! {
    /// Internal method state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodVmFlags: u32 {
        /// This is the class initializer; popping its frame completes
        /// initialization.
        const CLASS_INIT  = 1 << 0;
        /// This is `<init>`; a return from it may need the final-field
        /// publication fence.
        const CONSTRUCTOR = 1 << 1;
        /// Native method using the direct calling path: flat word
        /// arguments, no idle-state transition.
        const FAST_NATIVE = 1 << 2;
    }
}

/// An exception-handler table row. `catch_type` is a constant-pool index;
/// 0 means "any" (a finally handler).
#[derive(Debug, Clone, Copy)]
pub struct ExceptionHandler {
    pub start: u16,
    pub end: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// A bytecode method body.
#[derive(Debug)]
pub struct Code {
    body: Box<[u8]>,
    max_stack: u16,
    max_locals: u16,
    pool: Arc<ConstPool>,
    handlers: Box<[ExceptionHandler]>,
}

impl Code {
    pub fn new(
        body: Vec<u8>,
        max_stack: u16,
        max_locals: u16,
        pool: Arc<ConstPool>,
        handlers: Vec<ExceptionHandler>,
    ) -> Code {
        Code {
            body: body.into_boxed_slice(),
            max_stack,
            max_locals,
            pool,
            handlers: handlers.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn max_stack(&self) -> usize {
        self.max_stack as usize
    }

    #[inline]
    pub fn max_locals(&self) -> usize {
        self.max_locals as usize
    }

    #[inline]
    pub fn pool(&self) -> &ConstPool {
        &self.pool
    }

    #[inline]
    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }
}

/// Cached calling information for a resolved native method, built on
/// first use: the target function, the argument types in calling
/// convention order (prefixed by two pointers for the environment and
/// the receiver or class), the accumulated argument table size, and the
/// return type.
#[derive(Debug)]
pub struct NativeMethodData {
    pub function: NativeFunction,
    pub parameter_types: Box<[NativeType]>,
    pub argument_table_size: usize,
    pub return_type: NativeType,
}

/// The executable body variant of a method.
#[derive(Debug)]
pub enum MethodBody {
    Bytecode(Code),
    /// Descriptor cache is filled on first call; publication is ordered
    /// by the cell's own synchronization.
    Native(OnceLock<NativeMethodData>),
    Abstract,
}

/// A linked method.
#[derive(Debug)]
pub struct Method {
    name: Arc<str>,
    spec: Arc<str>,
    flags: AccessFlags,
    vm_flags: AtomicU32,
    return_code: TypeCode,
    parameter_count: u16,
    parameter_footprint: u16,
    /// Virtual (or interface) table slot, assigned during class linking.
    offset: AtomicU16,
    class: OnceLock<ClassRef>,
    body: MethodBody,
}

impl Method {
    fn new(
        name: &str,
        spec: &str,
        flags: AccessFlags,
        body: MethodBody,
    ) -> Result<Method, DescriptorError> {
        let has_receiver = !flags.contains(AccessFlags::STATIC);
        let mut vm_flags = MethodVmFlags::empty();
        if name == "<init>" {
            vm_flags |= MethodVmFlags::CONSTRUCTOR;
        }
        Ok(Method {
            name: Arc::from(name),
            spec: Arc::from(spec),
            flags,
            vm_flags: AtomicU32::new(vm_flags.bits()),
            return_code: descriptor::return_code(spec)?,
            parameter_count: descriptor::parameter_count(spec)? as u16,
            parameter_footprint: descriptor::parameter_footprint(spec, has_receiver)? as u16,
            offset: AtomicU16::new(0),
            class: OnceLock::new(),
            body,
        })
    }

    /// A method with a bytecode body.
    pub fn bytecode(
        name: &str,
        spec: &str,
        flags: AccessFlags,
        code: Code,
    ) -> Result<Method, DescriptorError> {
        Method::new(name, spec, flags, MethodBody::Bytecode(code))
    }

    /// A natively implemented method; the `NATIVE` flag is implied.
    pub fn native(name: &str, spec: &str, flags: AccessFlags) -> Result<Method, DescriptorError> {
        Method::new(
            name,
            spec,
            flags | AccessFlags::NATIVE,
            MethodBody::Native(OnceLock::new()),
        )
    }

    /// An abstract declaration (interface methods, abstract classes).
    pub fn abstract_method(
        name: &str,
        spec: &str,
        flags: AccessFlags,
    ) -> Result<Method, DescriptorError> {
        Method::new(name, spec, flags | AccessFlags::ABSTRACT, MethodBody::Abstract)
    }

    /// Route this native method through the direct calling path.
    pub fn fast_native(self) -> Method {
        self.vm_flags
            .fetch_or(MethodVmFlags::FAST_NATIVE.bits(), Ordering::Relaxed);
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn spec(&self) -> &Arc<str> {
        &self.spec
    }

    #[inline]
    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    #[inline]
    pub fn vm_flags(&self) -> MethodVmFlags {
        MethodVmFlags::from_bits_truncate(self.vm_flags.load(Ordering::Acquire))
    }

    pub(crate) fn mark_initializer(&self) {
        self.vm_flags
            .fetch_or(MethodVmFlags::CLASS_INIT.bits(), Ordering::AcqRel);
    }

    #[inline]
    pub fn return_code(&self) -> TypeCode {
        self.return_code
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameter_count as usize
    }

    #[inline]
    pub fn parameter_footprint(&self) -> usize {
        self.parameter_footprint as usize
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire) as usize
    }

    pub(crate) fn set_offset(&self, offset: u16) {
        self.offset.store(offset, Ordering::Release);
    }

    pub fn class(&self) -> ClassRef {
        self.class.get().expect("method not linked")
    }

    pub fn link(&self, class: ClassRef) {
        let _ = self.class.set(class);
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::STATIC)
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.flags.contains(AccessFlags::NATIVE)
    }

    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(AccessFlags::SYNCHRONIZED)
    }

    /// Dispatched through the virtual table: instance method whose name
    /// does not open with `<`.
    #[inline]
    pub fn is_virtual(&self) -> bool {
        !self
            .flags
            .intersects(AccessFlags::STATIC | AccessFlags::PRIVATE)
            && !self.name.starts_with('<')
    }

    pub fn code(&self) -> Option<&Code> {
        match &self.body {
            MethodBody::Bytecode(code) => Some(code),
            _ => None,
        }
    }

    pub fn native_data(&self) -> Option<&OnceLock<NativeMethodData>> {
        match &self.body {
            MethodBody::Native(cell) => Some(cell),
            _ => None,
        }
    }
}
