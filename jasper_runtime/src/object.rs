//! Heap objects: instances, typed arrays, strings, and throwables.
//!
//! Objects are allocated once and pinned for the lifetime of the process
//! (collection is the collector's concern, not ours), so a reference is a
//! plain `&'static Object` and the null reference is its absence. All
//! mutable state inside an object is word-sized atomic cells, which gives
//! plain field and array element accesses the tear-freedom the execution
//! model requires and lets volatile accesses strengthen ordering in place.

use crate::class::ClassRef;
use crate::monitor::Monitor;
use crate::runtime::TraceElement;
use jasper_core::TypeCode;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A nullable object reference, one machine word wide.
#[derive(Debug, Clone, Copy)]
pub struct ObjRef(Option<&'static Object>);

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for ObjRef {}

impl ObjRef {
    pub const NULL: ObjRef = ObjRef(None);

    pub fn new(object: &'static Object) -> ObjRef {
        ObjRef(Some(object))
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_none()
    }

    #[inline]
    pub fn get(self) -> Option<&'static Object> {
        self.0
    }

    /// Raw word for storage in a tagged stack slot or atomic field cell.
    #[inline]
    pub fn as_word(self) -> usize {
        match self.0 {
            Some(object) => object as *const Object as usize,
            None => 0,
        }
    }

    /// Rebuild a reference from a word previously produced by
    /// [`ObjRef::as_word`].
    ///
    /// # Safety
    ///
    /// The word must be 0 or a pointer obtained from `as_word` on a live
    /// object. The tagged stack's tag discipline and the field cells'
    /// reference mask are what make call sites sound.
    #[inline]
    pub unsafe fn from_word(word: usize) -> ObjRef {
        if word == 0 {
            ObjRef::NULL
        } else {
            ObjRef(Some(unsafe { &*(word as *const Object) }))
        }
    }
}

/// A heap object: class reference, monitor, and a body variant.
#[derive(Debug)]
pub struct Object {
    class: ClassRef,
    monitor: Monitor,
    body: ObjectBody,
}

#[derive(Debug)]
pub enum ObjectBody {
    /// An ordinary instance: one atomic word cell per declared field.
    Instance(FieldStorage),
    /// A typed array.
    Array(ArrayBody),
    /// A string; interned copies share the same backing text.
    String(Arc<str>),
    /// A throwable: optional message plus the stack trace captured at
    /// construction.
    Throwable {
        message: Option<Arc<str>>,
        trace: OnceLock<Box<[TraceElement]>>,
    },
}

impl Object {
    pub fn new(class: ClassRef, body: ObjectBody) -> Object {
        Object {
            class,
            monitor: Monitor::new(),
            body,
        }
    }

    #[inline]
    pub fn class(&self) -> ClassRef {
        self.class
    }

    #[inline]
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    #[inline]
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    /// Field cells of an instance. Panics on non-instances; callers are
    /// downstream of a resolved field, so a mismatch is a linkage bug.
    pub fn fields(&self) -> &FieldStorage {
        match &self.body {
            ObjectBody::Instance(fields) => fields,
            _ => panic!("field access on non-instance object"),
        }
    }

    pub fn array(&self) -> Option<&ArrayBody> {
        match &self.body {
            ObjectBody::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn string_text(&self) -> Option<&Arc<str>> {
        match &self.body {
            ObjectBody::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn throwable_message(&self) -> Option<&Arc<str>> {
        match &self.body {
            ObjectBody::Throwable { message, .. } => message.as_ref(),
            _ => None,
        }
    }

    pub fn throwable_trace(&self) -> Option<&[TraceElement]> {
        match &self.body {
            ObjectBody::Throwable { trace, .. } => trace.get().map(|t| &**t),
            _ => None,
        }
    }

    /// Attach a stack trace snapshot; first writer wins.
    pub fn set_throwable_trace(&self, elements: Box<[TraceElement]>) {
        if let ObjectBody::Throwable { trace, .. } = &self.body {
            let _ = trace.set(elements);
        }
    }
}

// =============================================================================
// Field storage
// =============================================================================

/// Word-addressed atomic cells backing instance fields and class static
/// tables. Sub-word values are stored widened; references are stored as
/// their raw words.
#[derive(Debug)]
pub struct FieldStorage {
    cells: Box<[AtomicU64]>,
}

impl FieldStorage {
    pub fn new(count: usize) -> FieldStorage {
        let cells = (0..count).map(|_| AtomicU64::new(0)).collect();
        FieldStorage { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Plain load of the raw cell.
    #[inline]
    pub fn load(&self, offset: usize) -> u64 {
        self.cells[offset].load(Ordering::Relaxed)
    }

    /// Plain store of the raw cell.
    #[inline]
    pub fn store(&self, offset: usize, value: u64) {
        self.cells[offset].store(value, Ordering::Relaxed);
    }

    /// Volatile load: the value load followed by a load fence.
    #[inline]
    pub fn load_volatile(&self, offset: usize) -> u64 {
        let value = self.cells[offset].load(Ordering::Acquire);
        fence(Ordering::Acquire);
        value
    }

    /// Volatile store: store-store fence before the write, store-load
    /// fence after it.
    #[inline]
    pub fn store_volatile(&self, offset: usize, value: u64) {
        fence(Ordering::Release);
        self.cells[offset].store(value, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Typed load, sign- or zero-extending to the stack's int width.
    pub fn load_typed(&self, offset: usize, kind: TypeCode, volatile: bool) -> u64 {
        let raw = if volatile {
            self.load_volatile(offset)
        } else {
            self.load(offset)
        };
        widen(raw, kind)
    }

    /// Typed store. The value arrives in its widened stack representation.
    pub fn store_typed(&self, offset: usize, kind: TypeCode, value: u64, volatile: bool) {
        let raw = narrow(value, kind);
        if volatile {
            self.store_volatile(offset, raw);
        } else {
            self.store(offset, raw);
        }
    }
}

/// Sign/zero extension applied when a sub-word field value is pushed.
fn widen(raw: u64, kind: TypeCode) -> u64 {
    match kind {
        TypeCode::Byte | TypeCode::Boolean => raw as u8 as i8 as i32 as u32 as u64,
        TypeCode::Char => raw as u16 as u64,
        TypeCode::Short => raw as u16 as i16 as i32 as u32 as u64,
        TypeCode::Int | TypeCode::Float => raw as u32 as u64,
        _ => raw,
    }
}

/// Truncation applied when a widened stack value is stored to a field.
fn narrow(value: u64, kind: TypeCode) -> u64 {
    match kind {
        TypeCode::Byte | TypeCode::Boolean => value as u8 as u64,
        TypeCode::Char | TypeCode::Short => value as u16 as u64,
        TypeCode::Int | TypeCode::Float => value as u32 as u64,
        _ => value,
    }
}

// =============================================================================
// Arrays
// =============================================================================

/// Element storage for a typed array. Boolean arrays are distinct from
/// byte arrays so `baload`/`bastore` can discriminate by class.
#[derive(Debug)]
pub enum ArrayBody {
    Boolean(Box<[AtomicU64]>),
    Byte(Box<[AtomicU64]>),
    Char(Box<[AtomicU64]>),
    Short(Box<[AtomicU64]>),
    Int(Box<[AtomicU64]>),
    Long(Box<[AtomicU64]>),
    Float(Box<[AtomicU64]>),
    Double(Box<[AtomicU64]>),
    Object(Box<[AtomicU64]>),
}

impl ArrayBody {
    pub fn with_length(kind: TypeCode, length: usize) -> ArrayBody {
        let cells: Box<[AtomicU64]> = (0..length).map(|_| AtomicU64::new(0)).collect();
        match kind {
            TypeCode::Boolean => ArrayBody::Boolean(cells),
            TypeCode::Byte => ArrayBody::Byte(cells),
            TypeCode::Char => ArrayBody::Char(cells),
            TypeCode::Short => ArrayBody::Short(cells),
            TypeCode::Int => ArrayBody::Int(cells),
            TypeCode::Long => ArrayBody::Long(cells),
            TypeCode::Float => ArrayBody::Float(cells),
            TypeCode::Double => ArrayBody::Double(cells),
            TypeCode::Object => ArrayBody::Object(cells),
            TypeCode::Void => panic!("void array"),
        }
    }

    fn cells(&self) -> &[AtomicU64] {
        match self {
            ArrayBody::Boolean(c)
            | ArrayBody::Byte(c)
            | ArrayBody::Char(c)
            | ArrayBody::Short(c)
            | ArrayBody::Int(c)
            | ArrayBody::Long(c)
            | ArrayBody::Float(c)
            | ArrayBody::Double(c)
            | ArrayBody::Object(c) => c,
        }
    }

    pub fn element_kind(&self) -> TypeCode {
        match self {
            ArrayBody::Boolean(_) => TypeCode::Boolean,
            ArrayBody::Byte(_) => TypeCode::Byte,
            ArrayBody::Char(_) => TypeCode::Char,
            ArrayBody::Short(_) => TypeCode::Short,
            ArrayBody::Int(_) => TypeCode::Int,
            ArrayBody::Long(_) => TypeCode::Long,
            ArrayBody::Float(_) => TypeCode::Float,
            ArrayBody::Double(_) => TypeCode::Double,
            ArrayBody::Object(_) => TypeCode::Object,
        }
    }

    pub fn len(&self) -> usize {
        self.cells().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells().is_empty()
    }

    /// Raw element load, widened per the element kind. Bounds are the
    /// caller's responsibility (the dispatcher raises before indexing).
    #[inline]
    pub fn load(&self, index: usize) -> u64 {
        widen(self.cells()[index].load(Ordering::Relaxed), self.element_kind())
    }

    /// Raw element store; the value arrives widened.
    #[inline]
    pub fn store(&self, index: usize, value: u64) {
        self.cells()[index].store(narrow(value, self.element_kind()), Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
