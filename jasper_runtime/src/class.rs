//! Classes: access flags, fields, virtual and interface tables, and the
//! linking builder used by embedders and tests.
//!
//! Class metadata is immutable after linking and lives for the process
//! lifetime, so a class reference is a plain `&'static Class`. The only
//! mutable pieces are the VM flag word (initialization state, bootstrap
//! marking) and the static field table, both of which are atomic.

use crate::method::{Method, MethodRef};
use crate::monitor::Monitor;
use crate::object::{FieldStorage, ObjRef};
use crate::runtime::Runtime;
use crate::LoaderId;
use bitflags::bitflags;
use jasper_core::{DescriptorError, TypeCode};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

/// A linked class. References are handed out by the class map and stay
/// valid forever.
pub type ClassRef = &'static Class;

bitflags! {
    /// Class-file access flags, shared by classes, fields, and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        /// `ACC_SYNCHRONIZED` on methods, `ACC_SUPER` on classes.
        const SYNCHRONIZED = 0x0020;
        const SUPER        = 0x0020;
        const VOLATILE     = 0x0040;
        const NATIVE       = 0x0100;
        const INTERFACE    = 0x0200;
        const ABSTRACT     = 0x0400;
    }
}

bitflags! {
    /// Internal class state bits, stored atomically.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassVmFlags: u32 {
        /// `<clinit>` has not run yet.
        const NEED_INIT        = 1 << 0;
        /// Some thread is running `<clinit>` right now.
        const INIT_IN_PROGRESS = 1 << 1;
        /// `<clinit>` completed abruptly; the class is unusable.
        const INIT_ERROR       = 1 << 2;
        /// Boot-image class whose virtual table may require delayed
        /// loader resolution before it is trustworthy.
        const BOOTSTRAP        = 1 << 3;
        /// The class declares at least one final instance field;
        /// constructor returns emit a store-store fence.
        const HAS_FINAL_MEMBER = 1 << 4;
    }
}

/// A declared field after linking.
#[derive(Debug)]
pub struct Field {
    name: Arc<str>,
    spec: Arc<str>,
    kind: TypeCode,
    flags: AccessFlags,
    /// Cell index into the instance's field storage, or into the class's
    /// static table for static fields.
    offset: usize,
    class: OnceLock<ClassRef>,
    /// Guards 64-bit volatile accesses on hosts without atomic 64-bit
    /// loads and stores.
    monitor: Monitor,
}

impl Field {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn spec(&self) -> &Arc<str> {
        &self.spec
    }

    #[inline]
    pub fn kind(&self) -> TypeCode {
        self.kind
    }

    #[inline]
    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn class(&self) -> ClassRef {
        self.class.get().expect("field not linked")
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::STATIC)
    }

    #[inline]
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(AccessFlags::VOLATILE)
    }

    #[inline]
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}

/// Pairing of an implemented interface with the concrete methods backing
/// its slots; `methods[i]` implements the interface's method at offset
/// `i`.
#[derive(Debug)]
pub struct InterfaceEntry {
    pub interface: ClassRef,
    pub methods: Vec<MethodRef>,
}

/// Element description of an array class.
#[derive(Debug, Clone, Copy)]
pub struct ArrayKind {
    pub element: TypeCode,
    /// Component class for object arrays.
    pub component: Option<ClassRef>,
}

impl PartialEq for ArrayKind {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
            && match (self.component, other.component) {
                (Some(a), Some(b)) => std::ptr::eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for ArrayKind {}

#[derive(Debug, Default)]
struct InitSync {
    state: Mutex<Option<ThreadId>>,
    cond: Condvar,
}

/// A linked class.
pub struct Class {
    name: Arc<str>,
    flags: AccessFlags,
    vm_flags: AtomicU32,
    loader: LoaderId,
    super_class: Option<ClassRef>,
    fields: Box<[Field]>,
    static_fields: Box<[Field]>,
    /// Total instance field cells including inherited ones.
    instance_field_count: usize,
    /// Which instance field cells hold references, inherited included.
    reference_mask: Box<[bool]>,
    static_table: FieldStorage,
    methods: Vec<MethodRef>,
    /// Patchable: bootstrap-image classes get their slots rewritten when
    /// the loader finishes resolving them.
    virtual_table: RwLock<Vec<MethodRef>>,
    interface_table: OnceLock<Vec<InterfaceEntry>>,
    initializer: OnceLock<Option<MethodRef>>,
    array: Option<ArrayKind>,
    monitor: Monitor,
    init: InitSync,
    /// Lazily created `java/lang/Class` instance for this class.
    mirror: OnceLock<ObjRef>,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class").field("name", &self.name).finish()
    }
}

impl Class {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    #[inline]
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    #[inline]
    pub fn vm_flags(&self) -> ClassVmFlags {
        ClassVmFlags::from_bits_truncate(self.vm_flags.load(Ordering::Acquire))
    }

    pub fn set_vm_flags(&self, flags: ClassVmFlags) {
        self.vm_flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub fn clear_vm_flags(&self, flags: ClassVmFlags) {
        self.vm_flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    #[inline]
    pub fn super_class(&self) -> Option<ClassRef> {
        self.super_class
    }

    #[inline]
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(AccessFlags::INTERFACE)
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    #[inline]
    pub fn array_kind(&self) -> Option<ArrayKind> {
        self.array
    }

    /// True while first use must still trigger `<clinit>`.
    #[inline]
    pub fn needs_init(&self) -> bool {
        self.vm_flags().contains(ClassVmFlags::NEED_INIT)
    }

    pub fn initializer(&self) -> Option<MethodRef> {
        self.initializer.get().copied().flatten()
    }

    pub fn instance_field_count(&self) -> usize {
        self.instance_field_count
    }

    pub fn reference_mask(&self) -> &[bool] {
        &self.reference_mask
    }

    pub fn static_table(&self) -> &FieldStorage {
        &self.static_table
    }

    pub fn declared_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn declared_static_fields(&self) -> &[Field] {
        &self.static_fields
    }

    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    /// Read one virtual-table slot.
    #[inline]
    pub fn virtual_method_at(&self, index: usize) -> MethodRef {
        self.virtual_table.read()[index]
    }

    pub fn virtual_table_len(&self) -> usize {
        self.virtual_table.read().len()
    }

    pub fn virtual_table_snapshot(&self) -> Vec<MethodRef> {
        self.virtual_table.read().clone()
    }

    /// Rewrite a virtual-table slot; used by the loader when a bootstrap
    /// class is finally resolved.
    pub fn patch_virtual_slot(&self, index: usize, method: MethodRef) {
        self.virtual_table.write()[index] = method;
    }

    /// Interface dispatch entries; empty while the class is still being
    /// linked.
    pub fn interface_table(&self) -> &[InterfaceEntry] {
        self.interface_table.get().map(|v| &**v).unwrap_or(&[])
    }

    /// The `java/lang/Class` instance mirroring this class.
    pub fn mirror(&'static self, runtime: &Runtime) -> ObjRef {
        *self
            .mirror
            .get_or_init(|| runtime.make_instance(runtime.well_known().class_class))
    }

    /// Find a declared field by name, searching the super chain.
    pub fn lookup_field(&'static self, name: &str) -> Option<&'static Field> {
        let mut current: Option<ClassRef> = Some(self);
        while let Some(class) = current {
            if let Some(field) = class
                .fields
                .iter()
                .chain(class.static_fields.iter())
                .find(|f| &*f.name == name)
            {
                return Some(field);
            }
            current = class.super_class;
        }
        None
    }

    /// Find a method by name and descriptor, searching the super chain
    /// and then superinterfaces.
    pub fn lookup_method(&'static self, name: &str, spec: &str) -> Option<MethodRef> {
        let mut current: Option<ClassRef> = Some(self);
        while let Some(class) = current {
            if let Some(&method) = class
                .methods
                .iter()
                .find(|m| &**m.name() == name && &**m.spec() == spec)
            {
                return Some(method);
            }
            current = class.super_class;
        }
        let mut current: Option<ClassRef> = Some(self);
        while let Some(class) = current {
            for entry in class.interface_table() {
                if let Some(found) = entry.interface.lookup_method(name, spec) {
                    return Some(found);
                }
            }
            current = class.super_class;
        }
        None
    }

    /// Subtyping: is `other` assignable to `self`?
    pub fn is_assignable_from(&'static self, other: ClassRef) -> bool {
        if let (Some(a), Some(b)) = (self.array, other.array) {
            return match (a.component, b.component) {
                (Some(ac), Some(bc)) => ac.is_assignable_from(bc),
                (None, None) => a.element == b.element,
                _ => false,
            };
        }
        if other.is_array() {
            // Arrays are assignable only to their own shape or the root.
            return self.super_class.is_none() && !self.is_array() && !self.is_interface();
        }

        let mut current: Option<ClassRef> = Some(other);
        while let Some(class) = current {
            if std::ptr::eq(class, self) {
                return true;
            }
            for entry in class.interface_table() {
                if entry.interface.extends_interface(self) {
                    return true;
                }
            }
            current = class.super_class;
        }
        false
    }

    /// Is this interface `target` itself, or a transitive subinterface?
    fn extends_interface(&'static self, target: ClassRef) -> bool {
        if std::ptr::eq(self, target) {
            return true;
        }
        self.interface_table()
            .iter()
            .any(|entry| entry.interface.extends_interface(target))
    }

    // =========================================================================
    // Initialization coordination
    // =========================================================================

    /// Decide whether the calling thread must run `<clinit>` now.
    ///
    /// Returns `Ok(true)` when this thread has claimed initialization,
    /// `Ok(false)` when the class is already initialized or this thread is
    /// re-entering its own in-progress initialization, and `Err` when a
    /// previous initializer failed.
    pub fn pre_init(&self) -> Result<bool, crate::pool::LinkageError> {
        let me = std::thread::current().id();
        let mut holder = self.init.state.lock();
        loop {
            let flags = self.vm_flags();
            if flags.contains(ClassVmFlags::INIT_ERROR) {
                return Err(crate::pool::LinkageError::NoClassDef(self.name.clone()));
            }
            if !flags.contains(ClassVmFlags::NEED_INIT) {
                return Ok(false);
            }
            if flags.contains(ClassVmFlags::INIT_IN_PROGRESS) {
                if *holder == Some(me) {
                    // Recursive trigger from our own <clinit>.
                    return Ok(false);
                }
                self.init.cond.wait(&mut holder);
                continue;
            }
            self.set_vm_flags(ClassVmFlags::INIT_IN_PROGRESS);
            *holder = Some(me);
            return Ok(true);
        }
    }

    /// Publish the outcome of a `<clinit>` run claimed via [`pre_init`].
    ///
    /// [`pre_init`]: Class::pre_init
    pub fn post_init(&self, succeeded: bool) {
        let mut holder = self.init.state.lock();
        *holder = None;
        if succeeded {
            self.clear_vm_flags(ClassVmFlags::NEED_INIT | ClassVmFlags::INIT_IN_PROGRESS);
        } else {
            self.set_vm_flags(ClassVmFlags::INIT_ERROR);
            self.clear_vm_flags(ClassVmFlags::NEED_INIT | ClassVmFlags::INIT_IN_PROGRESS);
        }
        self.init.cond.notify_all();
    }
}

// =============================================================================
// Builder
// =============================================================================

struct FieldDecl {
    name: Arc<str>,
    spec: Arc<str>,
    flags: AccessFlags,
}

/// Links a class: computes field offsets, the virtual table, interface
/// dispatch tables, and registers the result in the runtime's class map.
pub struct ClassBuilder {
    name: Arc<str>,
    flags: AccessFlags,
    vm_flags: ClassVmFlags,
    loader: LoaderId,
    super_class: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    fields: Vec<FieldDecl>,
    methods: Vec<Method>,
    array: Option<ArrayKind>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: Arc::from(name),
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            vm_flags: ClassVmFlags::empty(),
            loader: LoaderId::BOOT,
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            array: None,
        }
    }

    pub fn flags(mut self, flags: AccessFlags) -> ClassBuilder {
        self.flags = flags;
        self
    }

    pub fn loader(mut self, loader: LoaderId) -> ClassBuilder {
        self.loader = loader;
        self
    }

    pub fn super_class(mut self, super_class: ClassRef) -> ClassBuilder {
        self.super_class = Some(super_class);
        self
    }

    pub fn implements(mut self, interface: ClassRef) -> ClassBuilder {
        self.interfaces.push(interface);
        self
    }

    /// Mark as a bootstrap-image class with an untrusted virtual table.
    pub fn bootstrap(mut self) -> ClassBuilder {
        self.vm_flags |= ClassVmFlags::BOOTSTRAP;
        self
    }

    pub(crate) fn array_kind(mut self, kind: ArrayKind) -> ClassBuilder {
        self.array = Some(kind);
        self
    }

    pub fn field(mut self, name: &str, spec: &str, flags: AccessFlags) -> ClassBuilder {
        self.fields.push(FieldDecl {
            name: Arc::from(name),
            spec: Arc::from(spec),
            flags,
        });
        self
    }

    pub fn method(mut self, method: Method) -> ClassBuilder {
        self.methods.push(method);
        self
    }

    /// Link and register. Returns the pinned class reference.
    pub fn build(self, runtime: &Runtime) -> Result<ClassRef, DescriptorError> {
        let super_instance_fields = self
            .super_class
            .map(|s| s.instance_field_count)
            .unwrap_or(0);

        let mut reference_mask: Vec<bool> = self
            .super_class
            .map(|s| s.reference_mask.to_vec())
            .unwrap_or_default();

        let mut has_final_member = self
            .super_class
            .map(|s| s.vm_flags().contains(ClassVmFlags::HAS_FINAL_MEMBER))
            .unwrap_or(false);

        let mut instance_fields = Vec::new();
        let mut static_fields = Vec::new();
        let mut next_instance = super_instance_fields;
        let mut next_static = 0;

        for decl in self.fields {
            let kind = TypeCode::from_descriptor(decl.spec.as_bytes()[0])
                .ok_or(DescriptorError::BadTypeLetter(decl.spec.as_bytes()[0] as char))?;
            let is_static = decl.flags.contains(AccessFlags::STATIC);
            let offset = if is_static {
                next_static += 1;
                next_static - 1
            } else {
                if decl.flags.contains(AccessFlags::FINAL) {
                    has_final_member = true;
                }
                reference_mask.push(kind == TypeCode::Object);
                next_instance += 1;
                next_instance - 1
            };
            let field = Field {
                name: decl.name,
                spec: decl.spec,
                kind,
                flags: decl.flags,
                offset,
                class: OnceLock::new(),
                monitor: Monitor::new(),
            };
            if is_static {
                static_fields.push(field);
            } else {
                instance_fields.push(field);
            }
        }

        // Pin methods first so table construction can hold references.
        let methods: Vec<MethodRef> = self
            .methods
            .into_iter()
            .map(|m| {
                let method: MethodRef = Box::leak(Box::new(m));
                method
            })
            .collect();

        let mut vm_flags = self.vm_flags;
        if has_final_member {
            vm_flags |= ClassVmFlags::HAS_FINAL_MEMBER;
        }
        let has_initializer = methods
            .iter()
            .any(|m| &**m.name() == "<clinit>");
        if has_initializer {
            vm_flags |= ClassVmFlags::NEED_INIT;
        }

        let class: ClassRef = Box::leak(Box::new(Class {
            name: self.name,
            flags: self.flags,
            vm_flags: AtomicU32::new(vm_flags.bits()),
            loader: self.loader,
            super_class: self.super_class,
            fields: instance_fields.into_boxed_slice(),
            static_fields: static_fields.into_boxed_slice(),
            instance_field_count: next_instance,
            reference_mask: reference_mask.into_boxed_slice(),
            static_table: FieldStorage::new(next_static),
            methods,
            virtual_table: RwLock::new(Vec::new()),
            interface_table: OnceLock::new(),
            initializer: OnceLock::new(),
            array: self.array,
            monitor: Monitor::new(),
            init: InitSync::default(),
            mirror: OnceLock::new(),
        }));

        for field in class.fields.iter().chain(class.static_fields.iter()) {
            let _ = field.class.set(class);
        }
        for &method in &class.methods {
            method.link(class);
        }

        // Virtual table: start from the superclass's and override by
        // name + descriptor; fresh virtual methods append.
        let mut vtable: Vec<MethodRef> = class
            .super_class
            .map(|s| s.virtual_table_snapshot())
            .unwrap_or_default();
        for &method in &class.methods {
            if !method.is_virtual() {
                continue;
            }
            let slot = vtable
                .iter()
                .position(|m| m.name() == method.name() && m.spec() == method.spec());
            match slot {
                Some(index) => {
                    method.set_offset(index as u16);
                    vtable[index] = method;
                }
                None => {
                    method.set_offset(vtable.len() as u16);
                    vtable.push(method);
                }
            }
        }

        // Interface methods get their declaration-order offsets.
        if class.is_interface() {
            for (index, &method) in class.methods.iter().enumerate() {
                method.set_offset(index as u16);
            }
        }
        *class.virtual_table.write() = vtable;

        // Interface dispatch tables, inherited interfaces included.
        let mut entries: Vec<InterfaceEntry> = Vec::new();
        let mut pending: Vec<ClassRef> = self.interfaces.clone();
        if let Some(s) = class.super_class {
            for entry in s.interface_table() {
                pending.push(entry.interface);
            }
        }
        for interface in pending {
            if entries
                .iter()
                .any(|e| std::ptr::eq(e.interface, interface))
            {
                continue;
            }
            let methods = interface
                .methods
                .iter()
                .map(|im| {
                    class
                        .lookup_method(im.name(), im.spec())
                        .unwrap_or(*im)
                })
                .collect();
            entries.push(InterfaceEntry { interface, methods });
        }
        let _ = class.interface_table.set(entries);

        let initializer = class
            .methods
            .iter()
            .copied()
            .find(|m| &**m.name() == "<clinit>");
        if let Some(init) = initializer {
            init.mark_initializer();
        }
        let _ = class.initializer.set(initializer);

        runtime.register_class(class);
        Ok(class)
    }
}
