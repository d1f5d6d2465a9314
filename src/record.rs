//! Record shapes and positional field access.
//!
//! A record is a struct describing one table row. `#[derive(Record)]`
//! produces a static [`RecordShape`] (field names, tags and type shapes in
//! declaration order) and a [`FieldAccess`] implementation that reads and
//! writes fields by position. The column model reads only the shape; value
//! extraction walks a [`FieldIndex`](crate::column::FieldIndex) through
//! [`FieldAccess::field`], and scanning a result row walks it through
//! [`FieldAccess::set_field`].
//!
//! Every field that is not tagged `-` or `json` must implement
//! [`FieldType`], private ones included: a private field still counts as a
//! column source when it holds a nested record. Types with no cell
//! representation (locks, cells, channels, functions) have opaque
//! implementations; anything else needs its own impl or a `-` tag.
//!
//! ```ignore
//! #[derive(Record)]
//! pub struct User {
//!     #[sql("pk autoincr")]
//!     pub id: i64,
//!     pub name: String,
//!     pub address: Address,          // nested: address_street, ...
//!     #[sql(flatten)]
//!     pub audit: Audit,              // embedded: created_at, ...
//!     #[sql("json")]
//!     pub prefs: HashMap<String, String>,
//! }
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::mpsc::{Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SqlRowError, SqlRowResult};
use crate::value::Value;

/// Static description of a record type.
#[derive(Debug, Clone, Copy)]
pub struct RecordShape {
    pub name: &'static str,
    pub fields: &'static [FieldShape],
}

/// One declared field of a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldShape {
    pub name: &'static str,
    /// Raw tag text from `#[sql("...")]`.
    pub tag: &'static str,
    /// Visible outside the defining module.
    pub public: bool,
    /// `#[sql(flatten)]`: splice the nested record's columns in place.
    pub embedded: bool,
    pub ty: TypeShape,
}

/// What kind of value a field holds, as far as column mapping cares.
#[derive(Debug, Clone, Copy)]
pub enum TypeKind {
    /// A single cell: numbers, text, booleans.
    Scalar,
    Bytes,
    Timestamp,
    /// A nested record whose fields become columns.
    Record(&'static RecordShape),
    /// Stored as one JSON cell.
    Serialized,
    Map,
    Function,
    Channel,
    Interface,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeShape {
    pub kind: TypeKind,
    /// Declared through `Option<_>`.
    pub nullable: bool,
}

impl TypeShape {
    pub const SCALAR: TypeShape = TypeShape::of(TypeKind::Scalar);
    pub const BYTES: TypeShape = TypeShape::of(TypeKind::Bytes);
    pub const TIMESTAMP: TypeShape = TypeShape::of(TypeKind::Timestamp);
    pub const SERIALIZED: TypeShape = TypeShape::of(TypeKind::Serialized);
    pub const MAP: TypeShape = TypeShape::of(TypeKind::Map);
    pub const FUNCTION: TypeShape = TypeShape::of(TypeKind::Function);
    pub const CHANNEL: TypeShape = TypeShape::of(TypeKind::Channel);
    pub const INTERFACE: TypeShape = TypeShape::of(TypeKind::Interface);

    pub const fn of(kind: TypeKind) -> TypeShape {
        TypeShape {
            kind,
            nullable: false,
        }
    }

    pub const fn record(shape: &'static RecordShape) -> TypeShape {
        TypeShape::of(TypeKind::Record(shape))
    }

    pub const fn nullable(self) -> TypeShape {
        TypeShape {
            kind: self.kind,
            nullable: true,
        }
    }

    /// The nested record shape, if this is a record type.
    pub fn as_record(&self) -> Option<&'static RecordShape> {
        match self.kind {
            TypeKind::Record(shape) => Some(shape),
            _ => None,
        }
    }

    /// Kinds that never map to a column unless stored as JSON.
    pub fn is_unmappable(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Map | TypeKind::Function | TypeKind::Channel | TypeKind::Interface
        )
    }
}

/// A field value handed out by [`FieldAccess::field`].
pub enum FieldRef<'a> {
    Value(Value),
    Record(&'a dyn FieldAccess),
    /// An absent optional value.
    Null,
    /// A value with no cell representation (maps, functions, channels).
    Opaque,
}

impl<'a> FieldRef<'a> {
    /// A JSON cell holding `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> SqlRowResult<FieldRef<'a>> {
        Ok(FieldRef::Value(Value::json(value)?))
    }
}

/// Positional access to a record's fields. Object safe.
pub trait FieldAccess {
    /// The field at `position` in declaration order.
    fn field(&self, position: usize) -> SqlRowResult<FieldRef<'_>>;

    /// Store `value` in the field at `index`: the first position selects a
    /// field of this record, the rest continue into nested records.
    fn set_field(&mut self, index: &[usize], value: Value) -> SqlRowResult<()>;
}

/// A row type: a static shape plus positional field access.
pub trait Record: FieldAccess + Any {
    const SHAPE: &'static RecordShape;
}

/// A type that can appear as a record field.
pub trait FieldType {
    const SHAPE: TypeShape;

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>>;

    /// Store a scanned cell. `path` continues into nested records and is
    /// empty for a leaf value.
    fn assign(&mut self, path: &[usize], value: Value) -> SqlRowResult<()>;

    /// A fresh value to scan into when an optional field is still `None`.
    fn blank() -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// Scan a cell into a field stored as JSON.
pub fn assign_json<T: DeserializeOwned>(
    slot: &mut T,
    path: &[usize],
    value: Value,
) -> SqlRowResult<()> {
    if !path.is_empty() {
        return Err(no_nested_fields("a json field"));
    }
    *slot = match value {
        Value::Json(v) => serde_json::from_value(v)?,
        Value::Text(s) => serde_json::from_str(&s)?,
        Value::Bytes(b) => serde_json::from_slice(&b)?,
        other => serde_json::from_value(serde_json::to_value(&other)?)?,
    };
    Ok(())
}

fn no_nested_fields(what: &str) -> SqlRowError {
    SqlRowError::TypeShape(format!("{} has no nested fields", what))
}

fn decode_leaf<T>(
    path: &[usize],
    value: &Value,
    type_name: &str,
    decode: fn(&Value) -> Option<T>,
) -> SqlRowResult<T> {
    if !path.is_empty() {
        return Err(no_nested_fields(type_name));
    }
    decode(value).ok_or_else(|| {
        SqlRowError::TypeShape(format!("cannot scan a {} cell into {}", value.kind(), type_name))
    })
}

macro_rules! leaf_field {
    ($($t:ty: $shape:expr => $encode:expr, $decode:expr;)+) => {
        $(impl FieldType for $t {
            const SHAPE: TypeShape = $shape;

            fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
                let encode: fn(&$t) -> Option<Value> = $encode;
                encode(self).map(FieldRef::Value).ok_or_else(|| {
                    SqlRowError::TypeShape(format!(
                        "{} value out of range for a 64-bit column",
                        stringify!($t)
                    ))
                })
            }

            fn assign(&mut self, path: &[usize], value: Value) -> SqlRowResult<()> {
                let decode: fn(&Value) -> Option<$t> = $decode;
                *self = decode_leaf(path, &value, stringify!($t), decode)?;
                Ok(())
            }

            fn blank() -> Option<Self> {
                Some(<$t as Default>::default())
            }
        })+
    };
}

leaf_field! {
    bool: TypeShape::SCALAR => |v| Some(Value::Bool(*v)), Value::as_bool;
    i8: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    i16: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    i32: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    i64: TypeShape::SCALAR => |v| Some(Value::Int(*v)), Value::as_i64;
    i128: TypeShape::SCALAR => |v| i64::try_from(*v).ok().map(Value::Int), |v| v.as_i64().map(i128::from);
    isize: TypeShape::SCALAR => |v| i64::try_from(*v).ok().map(Value::Int), |v| v.as_i64().and_then(|n| n.try_into().ok());
    u8: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    u16: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    u32: TypeShape::SCALAR => |v| Some(Value::Int(i64::from(*v))), |v| v.as_i64().and_then(|n| n.try_into().ok());
    u64: TypeShape::SCALAR => |v| i64::try_from(*v).ok().map(Value::Int), |v| v.as_i64().and_then(|n| n.try_into().ok());
    u128: TypeShape::SCALAR => |v| i64::try_from(*v).ok().map(Value::Int), |v| v.as_i64().and_then(|n| n.try_into().ok());
    usize: TypeShape::SCALAR => |v| i64::try_from(*v).ok().map(Value::Int), |v| v.as_i64().and_then(|n| n.try_into().ok());
    f32: TypeShape::SCALAR => |v| Some(Value::Float(f64::from(*v))), |v| v.as_f64().map(|f| f as f32);
    f64: TypeShape::SCALAR => |v| Some(Value::Float(*v)), Value::as_f64;
    char: TypeShape::SCALAR => |v| Some(Value::Text(v.to_string())), |v| {
        let mut chars = v.as_text()?.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    };
    String: TypeShape::SCALAR => |v| Some(Value::Text(v.clone())), |v| v.as_text().map(str::to_string);
    serde_json::Value: TypeShape::SCALAR => |v| Some(Value::Json(v.clone())), |v| match v {
        Value::Json(json) => Some(json.clone()),
        Value::Text(s) => serde_json::from_str(s).ok(),
        other => Some(other.to_json()),
    };
    Vec<u8>: TypeShape::BYTES => |v| Some(Value::Bytes(v.clone())), |v| v.as_bytes().map(<[u8]>::to_vec);
    DateTime<Utc>: TypeShape::TIMESTAMP => |v| Some(Value::Timestamp(*v)), Value::as_timestamp;
    NaiveDateTime: TypeShape::TIMESTAMP => |v| Some(Value::Timestamp(v.and_utc())), |v| v.as_timestamp().map(|t| t.naive_utc());
    NaiveDate: TypeShape::TIMESTAMP => |v| Some(Value::Date(*v)), Value::as_date;
}

impl<T: FieldType> FieldType for Option<T> {
    const SHAPE: TypeShape = T::SHAPE.nullable();

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
        match self {
            Some(v) => v.field_ref(),
            None => Ok(FieldRef::Null),
        }
    }

    /// NULL clears a leaf option. A NULL column inside an absent optional
    /// record leaves it absent; any other value creates it first.
    fn assign(&mut self, path: &[usize], value: Value) -> SqlRowResult<()> {
        if value.is_null() && path.is_empty() {
            *self = None;
            return Ok(());
        }
        if self.is_none() {
            if value.is_null() {
                return Ok(());
            }
            let blank = T::blank().ok_or_else(|| {
                SqlRowError::TypeShape(format!(
                    "cannot create a {} to scan into",
                    std::any::type_name::<T>()
                ))
            })?;
            *self = Some(blank);
        }
        match self {
            Some(inner) => inner.assign(path, value),
            None => Ok(()),
        }
    }

    fn blank() -> Option<Self> {
        Some(None)
    }
}

impl<T: FieldType> FieldType for Box<T> {
    const SHAPE: TypeShape = T::SHAPE;

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
        (**self).field_ref()
    }

    fn assign(&mut self, path: &[usize], value: Value) -> SqlRowResult<()> {
        (**self).assign(path, value)
    }

    fn blank() -> Option<Self> {
        T::blank().map(Box::new)
    }
}

fn not_scannable(type_name: &str) -> SqlRowError {
    SqlRowError::TypeShape(format!("cannot scan a column into {}", type_name))
}

impl<K, V, S: Default> FieldType for HashMap<K, V, S> {
    const SHAPE: TypeShape = TypeShape::MAP;

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
        Ok(FieldRef::Opaque)
    }

    fn assign(&mut self, _path: &[usize], _value: Value) -> SqlRowResult<()> {
        Err(not_scannable("a map"))
    }

    fn blank() -> Option<Self> {
        Some(HashMap::default())
    }
}

impl<K, V> FieldType for BTreeMap<K, V> {
    const SHAPE: TypeShape = TypeShape::MAP;

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
        Ok(FieldRef::Opaque)
    }

    fn assign(&mut self, _path: &[usize], _value: Value) -> SqlRowResult<()> {
        Err(not_scannable("a map"))
    }

    fn blank() -> Option<Self> {
        Some(BTreeMap::new())
    }
}

macro_rules! opaque_field {
    ($shape:expr => $($t:ty),+ $(,)?) => {
        $(impl<T> FieldType for $t {
            const SHAPE: TypeShape = $shape;

            fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
                Ok(FieldRef::Opaque)
            }

            fn assign(&mut self, _path: &[usize], _value: Value) -> SqlRowResult<()> {
                Err(not_scannable(stringify!($t)))
            }
        })+
    };
}

opaque_field!(TypeShape::CHANNEL => Sender<T>, SyncSender<T>, Receiver<T>);
opaque_field!(TypeShape::FUNCTION => fn() -> T, fn(&T), fn(T) -> T);
opaque_field!(TypeShape::INTERFACE => Mutex<T>, RwLock<T>, RefCell<T>, Cell<T>, PhantomData<T>);

impl FieldType for Arc<dyn Any + Send + Sync> {
    const SHAPE: TypeShape = TypeShape::INTERFACE;

    fn field_ref(&self) -> SqlRowResult<FieldRef<'_>> {
        Ok(FieldRef::Opaque)
    }

    fn assign(&mut self, _path: &[usize], _value: Value) -> SqlRowResult<()> {
        Err(not_scannable("a shared interface value"))
    }
}
