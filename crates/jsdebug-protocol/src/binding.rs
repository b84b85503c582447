//! Shape-driven decoding of untyped JSON payloads.
//!
//! Plain shapes are serde structs decoded with [`decode_fields`]. A
//! polymorphic shape is a closed enum implementing [`Polymorphic`]: it
//! declares an ordered table of [`Subtype`]s, each guarded by a
//! [`Condition`] evaluated against the raw object. [`decode`] picks the
//! first subtype whose condition holds. [`Typed`] keeps the raw payload
//! next to the chosen variant so a caller can re-cast it later.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// A declarative rule for selecting a subtype.
#[derive(Debug, Clone, Copy)]
pub enum Condition {
    /// Always holds. Used for fallback subtypes.
    Always,
    /// The field is present (any value, including null).
    Present(&'static str),
    /// The field is absent.
    Absent(&'static str),
    /// The field is present and null.
    Null(&'static str),
    /// The field is a string equal to the given constant.
    Equals(&'static str, &'static str),
    /// The field is a boolean equal to the given value.
    Bool(&'static str, bool),
    /// Arbitrary predicate over the whole object.
    Custom(fn(&Map<String, Value>) -> bool),
}

impl Condition {
    /// Evaluate this condition against a JSON object.
    pub fn holds(&self, object: &Map<String, Value>) -> bool {
        match *self {
            Condition::Always => true,
            Condition::Present(field) => object.contains_key(field),
            Condition::Absent(field) => !object.contains_key(field),
            Condition::Null(field) => matches!(object.get(field), Some(Value::Null)),
            Condition::Equals(field, constant) => {
                object.get(field).and_then(Value::as_str) == Some(constant)
            }
            Condition::Bool(field, expected) => {
                object.get(field).and_then(Value::as_bool) == Some(expected)
            }
            Condition::Custom(predicate) => predicate(object),
        }
    }
}

/// One row of a polymorphic shape's subtype table.
pub struct Subtype<T> {
    /// Name used by [`Typed::cast`].
    pub name: &'static str,
    /// Selection condition.
    pub condition: Condition,
    /// Builds the variant from the raw payload.
    pub build: fn(&Value) -> Result<T, DecodeError>,
}

impl<T> Clone for Subtype<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Subtype<T> {}

impl<T> std::fmt::Debug for Subtype<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subtype")
            .field("name", &self.name)
            .field("condition", &self.condition)
            .finish()
    }
}

/// A shape whose concrete variant is chosen from the payload content.
pub trait Polymorphic: Sized + 'static {
    /// Shape name used in error messages.
    const SHAPE: &'static str;
    /// Candidate subtypes in evaluation order.
    const SUBTYPES: &'static [Subtype<Self>];
    /// Untyped subtype used when nothing in [`Self::SUBTYPES`] matches.
    const FALLBACK: Option<Subtype<Self>> = None;
}

/// View `raw` as a JSON object or fail with `NotAnObject`.
pub fn as_object<'a>(
    shape: &'static str,
    raw: &'a Value,
) -> Result<&'a Map<String, Value>, DecodeError> {
    raw.as_object().ok_or(DecodeError::NotAnObject { shape })
}

/// Find the subtype of `T` that `raw` selects.
pub fn select<T: Polymorphic>(raw: &Value) -> Result<Subtype<T>, DecodeError> {
    let object = as_object(T::SHAPE, raw)?;
    T::SUBTYPES
        .iter()
        .copied()
        .find(|subtype| subtype.condition.holds(object))
        .or(T::FALLBACK)
        .ok_or(DecodeError::NoMatchingSubtype { shape: T::SHAPE })
}

/// Decode a polymorphic shape.
pub fn decode<T: Polymorphic>(raw: &Value) -> Result<T, DecodeError> {
    let subtype = select::<T>(raw)?;
    (subtype.build)(raw)
}

/// Decode a plain field set.
pub fn decode_fields<T: DeserializeOwned>(
    shape: &'static str,
    raw: &Value,
) -> Result<T, DecodeError> {
    T::deserialize(raw).map_err(|source| DecodeError::Fields { shape, source })
}

/// Parse text into a JSON tree.
pub fn parse(text: &str) -> Result<Value, DecodeError> {
    Ok(serde_json::from_str(text)?)
}

/// A decoded polymorphic value together with its raw payload.
#[derive(Debug, Clone)]
pub struct Typed<T> {
    raw: Value,
    subtype: &'static str,
    value: T,
}

impl<T: Polymorphic> Typed<T> {
    /// Decode `raw`, remembering which subtype was selected.
    pub fn decode(raw: Value) -> Result<Self, DecodeError> {
        let subtype = select::<T>(&raw)?;
        let value = (subtype.build)(&raw)?;
        Ok(Self {
            raw,
            subtype: subtype.name,
            value,
        })
    }

    /// Name of the selected subtype.
    pub fn subtype(&self) -> &'static str {
        self.subtype
    }

    /// The decoded variant.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// The raw payload.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consume the view and return the decoded variant.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Re-decode the same payload as the named subtype.
    ///
    /// Fails with `SubtypeMismatch` when the subtype's condition does not
    /// hold. The view itself is left untouched.
    pub fn cast(&self, subtype: &str) -> Result<T, DecodeError> {
        let object = as_object(T::SHAPE, &self.raw)?;
        let candidate = T::SUBTYPES
            .iter()
            .copied()
            .chain(T::FALLBACK)
            .find(|s| s.name == subtype)
            .ok_or_else(|| DecodeError::UnknownSubtype {
                shape: T::SHAPE,
                subtype: subtype.to_string(),
            })?;
        if !candidate.condition.holds(object) {
            return Err(DecodeError::SubtypeMismatch {
                shape: T::SHAPE,
                subtype: subtype.to_string(),
            });
        }
        (candidate.build)(&self.raw)
    }
}

/// An optional field that distinguishes "absent" from "present and null".
///
/// Use with `#[serde(default)]` on the containing struct field; when
/// serializing pair it with `skip_serializing_if = "Field::is_absent"` so
/// absent fields are omitted from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// The key was not in the payload.
    Absent,
    /// The key was present with a JSON null.
    Null,
    /// The key carried a value.
    Present(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    /// Whether the key was absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// Whether the key was present with a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Borrow the value if present.
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }

    /// Take the value if present.
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Null,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<T>::deserialize(deserializer)?.into())
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Present(value) => value.serialize(serializer),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

/// Implement `Deserialize` for polymorphic shapes so they can sit inside
/// derived structs.
macro_rules! deserialize_polymorphic {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl<'de> serde::Deserialize<'de> for $ty {
                fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let raw = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
                    $crate::binding::decode(&raw).map_err(serde::de::Error::custom)
                }
            }
        )+
    };
}

pub(crate) use deserialize_polymorphic;
