//! Constant pool entries and symbolic resolution.
//!
//! Pool indices follow the class-file convention: they are 1-based, and
//! catch-type index 0 means "any". Symbolic entries cache their resolution
//! in a fill-once cell so repeated executions of the same instruction
//! skip the lookup.

use crate::class::{ClassRef, Field};
use crate::method::MethodRef;
use crate::object::ObjRef;
use crate::runtime::Runtime;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Failure to resolve a symbolic reference. The execution engine turns
/// these into the corresponding throwables.
#[derive(Debug, Clone, Error)]
pub enum LinkageError {
    #[error("class not found: {0}")]
    ClassNotFound(Arc<str>),
    #[error("class unusable after failed initialization: {0}")]
    NoClassDef(Arc<str>),
    #[error("field not found: {class}.{name}")]
    FieldNotFound { class: Arc<str>, name: Arc<str> },
    #[error("method not found: {class}.{name}{spec}")]
    MethodNotFound {
        class: Arc<str>,
        name: Arc<str>,
        spec: Arc<str>,
    },
    #[error("unsatisfied link: {0}")]
    UnsatisfiedLink(Arc<str>),
    #[error("incompatible class change: {0}")]
    IncompatibleClassChange(Arc<str>),
    #[error("constant pool entry {index} has unexpected kind")]
    BadPoolEntry { index: u16 },
}

/// One constant-pool row.
#[derive(Debug)]
pub enum PoolEntry {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// A string literal; `ldc` pushes the interned object.
    Str(Arc<str>),
    /// A symbolic class reference.
    Class {
        name: Arc<str>,
        resolved: OnceLock<ClassRef>,
    },
    /// A symbolic field reference.
    FieldRef {
        class: Arc<str>,
        name: Arc<str>,
        resolved: OnceLock<&'static Field>,
    },
    /// A symbolic method reference.
    MethodRef {
        class: Arc<str>,
        name: Arc<str>,
        spec: Arc<str>,
        resolved: OnceLock<MethodRef>,
    },
}

impl PoolEntry {
    pub fn class(name: &str) -> PoolEntry {
        PoolEntry::Class {
            name: Arc::from(name),
            resolved: OnceLock::new(),
        }
    }

    pub fn field_ref(class: &str, name: &str) -> PoolEntry {
        PoolEntry::FieldRef {
            class: Arc::from(class),
            name: Arc::from(name),
            resolved: OnceLock::new(),
        }
    }

    pub fn method_ref(class: &str, name: &str, spec: &str) -> PoolEntry {
        PoolEntry::MethodRef {
            class: Arc::from(class),
            name: Arc::from(name),
            spec: Arc::from(spec),
            resolved: OnceLock::new(),
        }
    }
}

/// A method's singleton constant pool.
#[derive(Debug, Default)]
pub struct ConstPool {
    entries: Vec<PoolEntry>,
}

impl ConstPool {
    pub fn new(entries: Vec<PoolEntry>) -> Arc<ConstPool> {
        Arc::new(ConstPool { entries })
    }

    pub fn empty() -> Arc<ConstPool> {
        Arc::new(ConstPool::default())
    }

    /// Fetch by 1-based class-file index.
    pub fn entry(&self, index: u16) -> Option<&PoolEntry> {
        index.checked_sub(1).and_then(|i| self.entries.get(i as usize))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a class symbol in `method`'s pool.
pub fn resolve_class_in_pool(
    runtime: &Runtime,
    method: MethodRef,
    index: u16,
) -> Result<ClassRef, LinkageError> {
    let pool = method
        .code()
        .map(|code| code.pool())
        .ok_or(LinkageError::BadPoolEntry { index })?;
    match pool.entry(index) {
        Some(PoolEntry::Class { name, resolved }) => {
            cache_resolution(resolved, || {
                runtime.resolve_class(method.class().loader(), name)
            })
        }
        _ => Err(LinkageError::BadPoolEntry { index }),
    }
}

/// Read a resolution cache, filling it on first success. Resolution is
/// idempotent, so a racing second resolver just discards its result.
fn cache_resolution<T: Copy>(
    cell: &OnceLock<T>,
    resolve: impl FnOnce() -> Result<T, LinkageError>,
) -> Result<T, LinkageError> {
    if let Some(&cached) = cell.get() {
        return Ok(cached);
    }
    let value = resolve()?;
    Ok(*cell.get_or_init(|| value))
}

/// Resolve a field symbol in `method`'s pool.
pub fn resolve_field(
    runtime: &Runtime,
    method: MethodRef,
    index: u16,
) -> Result<&'static Field, LinkageError> {
    let pool = method
        .code()
        .map(|code| code.pool())
        .ok_or(LinkageError::BadPoolEntry { index })?;
    match pool.entry(index) {
        Some(PoolEntry::FieldRef {
            class,
            name,
            resolved,
        }) => cache_resolution(resolved, || {
            let holder = runtime.resolve_class(method.class().loader(), class)?;
            holder
                .lookup_field(name)
                .ok_or_else(|| LinkageError::FieldNotFound {
                    class: class.clone(),
                    name: name.clone(),
                })
        }),
        _ => Err(LinkageError::BadPoolEntry { index }),
    }
}

/// Resolve a method symbol in `method`'s pool.
pub fn resolve_method(
    runtime: &Runtime,
    method: MethodRef,
    index: u16,
) -> Result<MethodRef, LinkageError> {
    let pool = method
        .code()
        .map(|code| code.pool())
        .ok_or(LinkageError::BadPoolEntry { index })?;
    match pool.entry(index) {
        Some(PoolEntry::MethodRef {
            class,
            name,
            spec,
            resolved,
        }) => cache_resolution(resolved, || {
            let holder = runtime.resolve_class(method.class().loader(), class)?;
            holder
                .lookup_method(name, spec)
                .ok_or_else(|| LinkageError::MethodNotFound {
                    class: class.clone(),
                    name: name.clone(),
                    spec: spec.clone(),
                })
        }),
        _ => Err(LinkageError::BadPoolEntry { index }),
    }
}

/// Select the concrete override of `method` for a receiver of `class`.
#[inline]
pub fn find_virtual_method(method: MethodRef, class: ClassRef) -> MethodRef {
    class.virtual_method_at(method.offset())
}

/// Select the implementation of interface `method` for a receiver of
/// `class` via the paired interface dispatch tables.
pub fn find_interface_method(method: MethodRef, class: ClassRef) -> Result<MethodRef, LinkageError> {
    let owner = method.class();
    let mut current: Option<ClassRef> = Some(class);
    while let Some(c) = current {
        for entry in c.interface_table() {
            if std::ptr::eq(entry.interface, owner) {
                return Ok(entry.methods[method.offset()]);
            }
        }
        current = c.super_class();
    }
    Err(LinkageError::IncompatibleClassChange(
        format!("{} does not implement {}", class.name(), owner.name()).into(),
    ))
}

/// Does `invokespecial` of `method` from `class` require super-chain
/// virtual lookup rather than the resolved method itself?
pub fn is_special_method(method: MethodRef, class: ClassRef) -> bool {
    class.flags().contains(crate::class::AccessFlags::SUPER)
        && !method.name().starts_with('<')
        && !std::ptr::eq(method.class(), class)
        && method.class().is_assignable_from(class)
}

/// The `instanceof` relation; null is an instance of nothing.
#[inline]
pub fn instance_of(class: ClassRef, obj: ObjRef) -> bool {
    match obj.get() {
        Some(object) => class.is_assignable_from(object.class()),
        None => false,
    }
}
