//! Typed values crossing the facade boundary.

use crate::object::ObjRef;

/// A value handed to or returned from an invocation.
///
/// Inside the interpreter values live untyped in tagged stack slots; this
/// enum is the typed view used by the embedding surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JValue {
    Object(ObjRef),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl JValue {
    /// The null reference.
    pub const NULL: JValue = JValue::Object(ObjRef::NULL);

    pub fn as_object(self) -> Option<ObjRef> {
        match self {
            JValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            JValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(self) -> Option<i64> {
        match self {
            JValue::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f32> {
        match self {
            JValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(self) -> Option<f64> {
        match self {
            JValue::Double(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_select_by_type() {
        assert_eq!(JValue::Int(7).as_int(), Some(7));
        assert_eq!(JValue::Int(7).as_long(), None);
        assert_eq!(JValue::Long(-1).as_long(), Some(-1));
        assert_eq!(JValue::NULL.as_object(), Some(ObjRef::NULL));
        assert!(JValue::Double(0.5).as_double().unwrap() == 0.5);
    }
}
