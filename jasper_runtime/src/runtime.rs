//! Process-wide runtime state: the class map, heap, intern table, system
//! handle, and the well-known classes the execution engine raises errors
//! through.

use crate::class::{ArrayKind, ClassBuilder, ClassRef, Field};
use crate::heap::Heap;
use crate::method::MethodRef;
use crate::object::{ArrayBody, ObjRef, Object, ObjectBody};
use crate::pool::LinkageError;
use crate::system::{HostSystem, System};
use crate::LoaderId;
use jasper_core::TypeCode;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

/// One frame of a captured stack trace.
#[derive(Debug, Clone, Copy)]
pub struct TraceElement {
    pub method: MethodRef,
    pub ip: usize,
}

/// Pluggable write-barrier hook consulted on reference field stores.
/// Returning false rejects the write.
pub type FieldGuard = fn(target: ObjRef, value: ObjRef, field: &Field) -> bool;

/// Classes the core needs by identity.
#[derive(Debug)]
pub struct WellKnown {
    pub object: ClassRef,
    pub class_class: ClassRef,
    pub string: ClassRef,
    pub throwable: ClassRef,
    pub error: ClassRef,
    pub exception: ClassRef,
    pub runtime_exception: ClassRef,
    pub null_pointer: ClassRef,
    pub arithmetic: ClassRef,
    pub array_index: ClassRef,
    pub negative_array_size: ClassRef,
    pub class_cast: ClassRef,
    pub array_store: ClassRef,
    pub stack_overflow: ClassRef,
    pub unsatisfied_link: ClassRef,
    pub incompatible_class_change: ClassRef,
    pub no_such_field: ClassRef,
    pub no_such_method: ClassRef,
    pub no_class_def: ClassRef,
    pub exception_in_initializer: ClassRef,
    pub interrupted: ClassRef,
    pub boolean_array: ClassRef,
    pub byte_array: ClassRef,
    pub char_array: ClassRef,
    pub short_array: ClassRef,
    pub int_array: ClassRef,
    pub long_array: ClassRef,
    pub float_array: ClassRef,
    pub double_array: ClassRef,
}

/// Hook run when a bootstrap-marked class is fully resolved by a loader;
/// typically patches the class's virtual table.
pub type BootstrapHook = Box<dyn Fn(&Runtime, ClassRef) + Send + Sync>;

pub struct Runtime {
    heap: Heap,
    classes: Mutex<FxHashMap<(LoaderId, Arc<str>), ClassRef>>,
    intern: Mutex<FxHashMap<Arc<str>, ObjRef>>,
    system: Arc<dyn System>,
    well_known: OnceLock<WellKnown>,
    field_guard: OnceLock<FieldGuard>,
    bootstrap_hook: OnceLock<BootstrapHook>,
}

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Runtime::with_system(Arc::new(HostSystem::new()))
    }

    pub fn with_system(system: Arc<dyn System>) -> Arc<Runtime> {
        let runtime = Arc::new(Runtime {
            heap: Heap::new(),
            classes: Mutex::new(FxHashMap::default()),
            intern: Mutex::new(FxHashMap::default()),
            system,
            well_known: OnceLock::new(),
            field_guard: OnceLock::new(),
            bootstrap_hook: OnceLock::new(),
        });
        runtime.bootstrap();
        runtime
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn system(&self) -> &dyn System {
        &*self.system
    }

    pub fn well_known(&self) -> &WellKnown {
        self.well_known.get().expect("runtime not bootstrapped")
    }

    /// Install the cross-thread field-assignment policy. First caller
    /// wins; the default permits every write.
    pub fn set_field_guard(&self, guard: FieldGuard) {
        let _ = self.field_guard.set(guard);
    }

    pub fn field_write_permitted(&self, target: ObjRef, value: ObjRef, field: &Field) -> bool {
        match self.field_guard.get() {
            Some(guard) => guard(target, value, field),
            None => true,
        }
    }

    /// Install the loader's bootstrap-resolution hook.
    pub fn set_bootstrap_hook(&self, hook: BootstrapHook) {
        let _ = self.bootstrap_hook.set(hook);
    }

    // =========================================================================
    // Class map
    // =========================================================================

    pub fn register_class(&self, class: ClassRef) {
        self.classes
            .lock()
            .insert((class.loader(), class.name().clone()), class);
    }

    pub fn find_class(&self, loader: LoaderId, name: &str) -> Option<ClassRef> {
        let classes = self.classes.lock();
        classes
            .get(&(loader, Arc::from(name)))
            .or_else(|| classes.get(&(LoaderId::BOOT, Arc::from(name))))
            .copied()
    }

    /// Resolve a class by name for `loader`. Resolving a bootstrap-marked
    /// class runs the loader hook and clears the marking, after which its
    /// virtual table is trustworthy.
    pub fn resolve_class(&self, loader: LoaderId, name: &str) -> Result<ClassRef, LinkageError> {
        let found = self.find_class(loader, name);
        let class = match found {
            Some(class) => class,
            None if name.starts_with('[') => self.resolve_array_class(loader, name)?,
            None => return Err(LinkageError::ClassNotFound(Arc::from(name))),
        };
        if class
            .vm_flags()
            .contains(crate::class::ClassVmFlags::BOOTSTRAP)
        {
            if let Some(hook) = self.bootstrap_hook.get() {
                hook(self, class);
            }
            class.clear_vm_flags(crate::class::ClassVmFlags::BOOTSTRAP);
        }
        Ok(class)
    }

    /// The class of arrays with `component` elements, created on demand.
    pub fn object_array_class(&self, component: ClassRef) -> ClassRef {
        let name = if component.name().starts_with('[') {
            format!("[{}", component.name())
        } else {
            format!("[L{};", component.name())
        };
        if let Some(existing) = self.find_class(component.loader(), &name) {
            return existing;
        }
        ClassBuilder::new(&name)
            .loader(component.loader())
            .super_class(self.well_known().object)
            .array_kind(ArrayKind {
                element: TypeCode::Object,
                component: Some(component),
            })
            .build(self)
            .expect("array class link")
    }

    /// Resolve an array class from its descriptor name, building the
    /// component chain as needed.
    fn resolve_array_class(&self, loader: LoaderId, name: &str) -> Result<ClassRef, LinkageError> {
        let rest = &name[1..];
        match rest.as_bytes().first() {
            Some(b'[') => {
                let component = self.resolve_class(loader, rest)?;
                Ok(self.object_array_class(component))
            }
            Some(b'L') if rest.ends_with(';') => {
                let component = self.resolve_class(loader, &rest[1..rest.len() - 1])?;
                Ok(self.object_array_class(component))
            }
            Some(&letter) => {
                let kind = TypeCode::from_descriptor(letter)
                    .filter(|k| !matches!(k, TypeCode::Object | TypeCode::Void))
                    .ok_or_else(|| LinkageError::ClassNotFound(Arc::from(name)))?;
                Ok(self.primitive_array_class(kind))
            }
            None => Err(LinkageError::ClassNotFound(Arc::from(name))),
        }
    }

    pub fn primitive_array_class(&self, kind: TypeCode) -> ClassRef {
        let wk = self.well_known();
        match kind {
            TypeCode::Boolean => wk.boolean_array,
            TypeCode::Byte => wk.byte_array,
            TypeCode::Char => wk.char_array,
            TypeCode::Short => wk.short_array,
            TypeCode::Int => wk.int_array,
            TypeCode::Long => wk.long_array,
            TypeCode::Float => wk.float_array,
            TypeCode::Double => wk.double_array,
            _ => panic!("not a primitive array element kind: {kind:?}"),
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    pub fn make_instance(&self, class: ClassRef) -> ObjRef {
        ObjRef::new(self.heap.pin(Object::new(
            class,
            ObjectBody::Instance(crate::object::FieldStorage::new(
                class.instance_field_count(),
            )),
        )))
    }

    pub fn make_primitive_array(&self, kind: TypeCode, length: usize) -> ObjRef {
        let class = self.primitive_array_class(kind);
        ObjRef::new(self.heap.pin(Object::new(
            class,
            ObjectBody::Array(ArrayBody::with_length(kind, length)),
        )))
    }

    pub fn make_object_array(&self, component: ClassRef, length: usize) -> ObjRef {
        let class = self.object_array_class(component);
        self.make_array_with_class(class, length)
    }

    /// Allocate an array whose class is already known; the element body
    /// kind comes from the class's array descriptor.
    pub fn make_array_with_class(&self, class: ClassRef, length: usize) -> ObjRef {
        let kind = class
            .array_kind()
            .expect("array allocation with non-array class")
            .element;
        ObjRef::new(self.heap.pin(Object::new(
            class,
            ObjectBody::Array(ArrayBody::with_length(kind, length)),
        )))
    }

    pub fn make_string(&self, text: &str) -> ObjRef {
        ObjRef::new(self.heap.pin(Object::new(
            self.well_known().string,
            ObjectBody::String(Arc::from(text)),
        )))
    }

    /// Interned string: literals with equal text share one object.
    pub fn intern_string(&self, text: &Arc<str>) -> ObjRef {
        let mut intern = self.intern.lock();
        if let Some(&existing) = intern.get(text) {
            return existing;
        }
        let object = ObjRef::new(self.heap.pin(Object::new(
            self.well_known().string,
            ObjectBody::String(text.clone()),
        )));
        intern.insert(text.clone(), object);
        object
    }

    pub fn make_throwable(&self, class: ClassRef, message: Option<&str>) -> ObjRef {
        ObjRef::new(self.heap.pin(Object::new(
            class,
            ObjectBody::Throwable {
                message: message.map(Arc::from),
                trace: OnceLock::new(),
            },
        )))
    }

    // =========================================================================
    // Error constructors
    // =========================================================================

    pub fn make_null_pointer_exception(&self) -> ObjRef {
        self.make_throwable(self.well_known().null_pointer, None)
    }

    pub fn make_arithmetic_exception(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().arithmetic, Some(message))
    }

    pub fn make_array_index_out_of_bounds_exception(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().array_index, Some(message))
    }

    pub fn make_negative_array_size_exception(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().negative_array_size, Some(message))
    }

    pub fn make_class_cast_exception(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().class_cast, Some(message))
    }

    pub fn make_stack_overflow_error(&self) -> ObjRef {
        self.make_throwable(self.well_known().stack_overflow, None)
    }

    pub fn make_unsatisfied_link_error(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().unsatisfied_link, Some(message))
    }

    pub fn make_incompatible_class_change_error(&self, message: &str) -> ObjRef {
        self.make_throwable(self.well_known().incompatible_class_change, Some(message))
    }

    pub fn make_exception_in_initializer_error(&self, cause: ObjRef) -> ObjRef {
        let message = cause
            .get()
            .map(|o| o.class().name().to_string())
            .unwrap_or_default();
        self.make_throwable(self.well_known().exception_in_initializer, Some(&message))
    }

    pub fn make_interrupted_exception(&self) -> ObjRef {
        self.make_throwable(self.well_known().interrupted, None)
    }

    /// The throwable corresponding to a resolution failure.
    pub fn make_linkage_throwable(&self, error: &LinkageError) -> ObjRef {
        let wk = self.well_known();
        let message = error.to_string();
        match error {
            LinkageError::ClassNotFound(_) | LinkageError::NoClassDef(_) => {
                self.make_throwable(wk.no_class_def, Some(&message))
            }
            LinkageError::FieldNotFound { .. } => {
                self.make_throwable(wk.no_such_field, Some(&message))
            }
            LinkageError::MethodNotFound { .. } => {
                self.make_throwable(wk.no_such_method, Some(&message))
            }
            LinkageError::UnsatisfiedLink(_) => {
                self.make_throwable(wk.unsatisfied_link, Some(&message))
            }
            LinkageError::IncompatibleClassChange(_) | LinkageError::BadPoolEntry { .. } => {
                self.make_throwable(wk.incompatible_class_change, Some(&message))
            }
        }
    }

    // =========================================================================
    // Bootstrapping
    // =========================================================================

    fn bootstrap(self: &Arc<Runtime>) {
        fn bare(runtime: &Runtime, name: &str, super_class: Option<ClassRef>) -> ClassRef {
            let mut builder = ClassBuilder::new(name);
            if let Some(s) = super_class {
                builder = builder.super_class(s);
            }
            builder.build(runtime).expect("boot class link")
        }

        fn prim_array(runtime: &Runtime, name: &str, root: ClassRef, kind: TypeCode) -> ClassRef {
            ClassBuilder::new(name)
                .super_class(root)
                .array_kind(ArrayKind {
                    element: kind,
                    component: None,
                })
                .build(runtime)
                .expect("boot class link")
        }

        let object = bare(self, "java/lang/Object", None);
        let class_class = bare(self, "java/lang/Class", Some(object));
        let string = bare(self, "java/lang/String", Some(object));
        let throwable = bare(self, "java/lang/Throwable", Some(object));
        let error = bare(self, "java/lang/Error", Some(throwable));
        let exception = bare(self, "java/lang/Exception", Some(throwable));
        let runtime_exception = bare(self, "java/lang/RuntimeException", Some(exception));

        let well_known = WellKnown {
            object,
            class_class,
            string,
            throwable,
            error,
            exception,
            runtime_exception,
            null_pointer: bare(self, "java/lang/NullPointerException", Some(runtime_exception)),
            arithmetic: bare(self, "java/lang/ArithmeticException", Some(runtime_exception)),
            array_index: bare(
                self,
                "java/lang/ArrayIndexOutOfBoundsException",
                Some(runtime_exception),
            ),
            negative_array_size: bare(
                self,
                "java/lang/NegativeArraySizeException",
                Some(runtime_exception),
            ),
            class_cast: bare(self, "java/lang/ClassCastException", Some(runtime_exception)),
            array_store: bare(self, "java/lang/ArrayStoreException", Some(runtime_exception)),
            stack_overflow: bare(self, "java/lang/StackOverflowError", Some(error)),
            unsatisfied_link: bare(self, "java/lang/UnsatisfiedLinkError", Some(error)),
            incompatible_class_change: bare(
                self,
                "java/lang/IncompatibleClassChangeError",
                Some(error),
            ),
            no_such_field: bare(self, "java/lang/NoSuchFieldError", Some(error)),
            no_such_method: bare(self, "java/lang/NoSuchMethodError", Some(error)),
            no_class_def: bare(self, "java/lang/NoClassDefFoundError", Some(error)),
            exception_in_initializer: bare(
                self,
                "java/lang/ExceptionInInitializerError",
                Some(error),
            ),
            interrupted: bare(self, "java/lang/InterruptedException", Some(exception)),
            boolean_array: prim_array(self, "[Z", object, TypeCode::Boolean),
            byte_array: prim_array(self, "[B", object, TypeCode::Byte),
            char_array: prim_array(self, "[C", object, TypeCode::Char),
            short_array: prim_array(self, "[S", object, TypeCode::Short),
            int_array: prim_array(self, "[I", object, TypeCode::Int),
            long_array: prim_array(self, "[J", object, TypeCode::Long),
            float_array: prim_array(self, "[F", object, TypeCode::Float),
            double_array: prim_array(self, "[D", object, TypeCode::Double),
        };
        self.well_known
            .set(well_known)
            .expect("runtime bootstrapped twice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_registers_hierarchy() {
        let rt = Runtime::new();
        let wk = rt.well_known();
        assert!(wk.throwable.is_assignable_from(wk.null_pointer));
        assert!(wk.error.is_assignable_from(wk.stack_overflow));
        assert!(!wk.exception.is_assignable_from(wk.stack_overflow));
        assert!(rt.find_class(LoaderId::BOOT, "java/lang/Object").is_some());
    }

    #[test]
    fn intern_shares_objects() {
        let rt = Runtime::new();
        let text: Arc<str> = Arc::from("hello");
        let a = rt.intern_string(&text);
        let b = rt.intern_string(&text);
        assert_eq!(a, b);
        let c = rt.make_string("hello");
        assert_ne!(a, c);
    }

    #[test]
    fn object_array_classes_are_memoized() {
        let rt = Runtime::new();
        let a = rt.object_array_class(rt.well_known().string);
        let b = rt.object_array_class(rt.well_known().string);
        assert!(std::ptr::eq(a, b));
        assert_eq!(&**a.name(), "[Ljava/lang/String;");
    }

    #[test]
    fn throwables_carry_messages() {
        let rt = Runtime::new();
        let exc = rt.make_array_index_out_of_bounds_exception("5 not in [0,3)");
        let object = exc.get().unwrap();
        assert!(std::ptr::eq(object.class(), rt.well_known().array_index));
        assert_eq!(&**object.throwable_message().unwrap(), "5 not in [0,3)");
    }

    #[test]
    fn array_subtyping() {
        let rt = Runtime::new();
        let wk = rt.well_known();
        let string_array = rt.object_array_class(wk.string);
        let object_array = rt.object_array_class(wk.object);
        assert!(object_array.is_assignable_from(string_array));
        assert!(!string_array.is_assignable_from(object_array));
        assert!(wk.object.is_assignable_from(string_array));
        assert!(wk.int_array.is_assignable_from(wk.int_array));
        assert!(!wk.int_array.is_assignable_from(wk.long_array));
    }
}
