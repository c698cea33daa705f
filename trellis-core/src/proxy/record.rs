//! Record Access
//!
//! A [`ReactiveProxy`](super::ReactiveProxy) is generic over any record that
//! can read and write its fields by name. That capability is the
//! [`FieldAccess`] trait. It can be implemented by hand, generated for a plain
//! struct with [`field_access!`](crate::field_access), or provided by the
//! dynamic [`Record`] type.

use indexmap::{IndexMap, IndexSet};

use super::value::{ConversionError, Value};
use crate::error::{ReactiveError, Result};

/// Name-keyed access to the fields of a record.
pub trait FieldAccess {
    /// Current value of `field`, or `None` if the record has no such field.
    fn get_field(&self, field: &str) -> Option<Value>;

    /// Overwrite `field`.
    ///
    /// Fails with `FieldNotFound` for unknown fields, `NotWritable` for
    /// read-only ones and `TypeMismatch` when the value has the wrong shape.
    fn set_field(&mut self, field: &str, value: Value) -> Result<()>;

    /// Names of every readable field, in declaration order.
    fn field_names(&self) -> Vec<String>;
}

/// A record whose fields are defined at runtime.
///
/// Fields keep their insertion order. Any field may be marked read-only.
/// Writes may change a field's value type; only unknown and read-only fields
/// are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
    read_only: IndexSet<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Builder-style insertion of a read-only field.
    pub fn with_read_only(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.read_only.insert(field.clone());
        self.fields.insert(field, value.into());
        self
    }

    /// Add or replace a field, bypassing the read-only check.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn is_read_only(&self, field: &str) -> bool {
        self.read_only.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FieldAccess for Record {
    fn get_field(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        if self.read_only.contains(field) {
            return Err(ReactiveError::not_writable(field));
        }
        match self.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ReactiveError::field_not_found(field)),
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

/// Convert `value` for a write to `field`, mapping conversion failures to
/// `TypeMismatch`. Used by [`field_access!`](crate::field_access).
#[doc(hidden)]
pub fn convert_field<T>(field: &str, value: Value) -> Result<T>
where
    T: TryFrom<Value, Error = ConversionError>,
{
    T::try_from(value).map_err(|err| ReactiveError::type_mismatch(field, err.expected))
}

/// Implement [`FieldAccess`] for a struct by listing its fields.
///
/// Every listed field type must convert into [`Value`] and back via
/// `TryFrom<Value>`. Fields after `readonly` can be read but not written.
/// Field names are the Rust identifiers.
///
/// ```rust
/// use trellis_core::field_access;
/// use trellis_core::proxy::FieldAccess;
///
/// #[derive(Debug, Clone)]
/// struct Person {
///     id: i64,
///     name: String,
///     age: i64,
/// }
///
/// field_access!(Person { name, age } readonly { id });
///
/// let mut person = Person { id: 1, name: "Ann".into(), age: 28 };
/// assert_eq!(person.get_field("name"), Some("Ann".into()));
/// assert!(person.set_field("age", 29.into()).is_ok());
/// assert!(person.set_field("id", 2.into()).is_err());
/// ```
#[macro_export]
macro_rules! field_access {
    ($ty:ty { $($field:ident),* $(,)? } $(readonly { $($ro:ident),* $(,)? })?) => {
        impl $crate::proxy::FieldAccess for $ty {
            fn get_field(&self, field: &str) -> ::std::option::Option<$crate::proxy::Value> {
                match field {
                    $(stringify!($field) => ::std::option::Option::Some(
                        $crate::proxy::Value::from(::std::clone::Clone::clone(&self.$field)),
                    ),)*
                    $($(stringify!($ro) => ::std::option::Option::Some(
                        $crate::proxy::Value::from(::std::clone::Clone::clone(&self.$ro)),
                    ),)*)?
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                field: &str,
                value: $crate::proxy::Value,
            ) -> $crate::Result<()> {
                match field {
                    $(stringify!($field) => {
                        self.$field = $crate::proxy::convert_field(field, value)?;
                        ::std::result::Result::Ok(())
                    })*
                    $($(stringify!($ro) => ::std::result::Result::Err(
                        $crate::ReactiveError::not_writable(field),
                    ),)*)?
                    _ => ::std::result::Result::Err($crate::ReactiveError::field_not_found(field)),
                }
            }

            fn field_names(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![
                    $(::std::string::String::from(stringify!($field)),)*
                    $($(::std::string::String::from(stringify!($ro)),)*)?
                ]
            }
        }
    };
}
