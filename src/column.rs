//! Column model: the flat, ordered list of columns behind a record type.
//!
//! The model is built once per record type by walking its [`RecordShape`]
//! in declaration order. Nested records contribute a path segment
//! (`address.street` → `address_street`); embedded (`#[sql(flatten)]`)
//! records splice their columns in without one.

use std::fmt;

use crate::error::{SqlRowError, SqlRowResult};
use crate::naming::Convention;
use crate::record::{FieldAccess, FieldRef, RecordShape, TypeKind};
use crate::tag::TagMeta;
use crate::value::Value;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub field: &'static str,
    pub tag: TagMeta,
}

impl PathSegment {
    /// Explicit tag name, or the convention's conversion of the field name.
    pub fn column_part(&self, convention: Convention) -> String {
        match &self.tag.name {
            Some(name) => name.clone(),
            None => convention.convert(self.field),
        }
    }
}

/// Field names from the record root to the leaf backing a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column name under `convention`.
    pub fn column_name(&self, convention: Convention) -> String {
        let parts: Vec<String> = self.0.iter().map(|s| s.column_part(convention)).collect();
        convention.join(&parts)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|s| s.field).collect();
        f.write_str(&names.join("."))
    }
}

/// Field positions from the record root to the leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldIndex(Vec<usize>);

impl FieldIndex {
    pub fn positions(&self) -> &[usize] {
        &self.0
    }
}

/// One database column and where its value lives in a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDescriptor {
    pub path: FieldPath,
    pub index: FieldIndex,
    /// Leaf field's tag.
    pub tag: TagMeta,
    /// Some field on the way to the leaf is an `Option`.
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn column_name(&self, convention: Convention) -> String {
        self.path.column_name(convention)
    }

    pub fn is_primary_key(&self) -> bool {
        self.tag.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.tag.auto_increment
    }

    /// `value` as it is bound to this column: `emptynull` columns store
    /// empty values as NULL.
    pub fn bound(&self, value: Value) -> Value {
        if self.tag.empty_null && value.is_empty() {
            Value::Null
        } else {
            value
        }
    }
}

/// Ordered columns of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    record: &'static str,
    columns: Vec<ColumnDescriptor>,
}

impl ColumnModel {
    /// Walk `shape` and collect its columns.
    pub fn build(shape: &RecordShape) -> SqlRowResult<ColumnModel> {
        let mut walker = Walker {
            record: shape.name,
            path: Vec::new(),
            index: Vec::new(),
            nullable: false,
            columns: Vec::new(),
        };
        walker.walk(shape)?;

        Ok(ColumnModel {
            record: shape.name,
            columns: walker.columns,
        })
    }

    /// Name of the record type.
    pub fn record(&self) -> &'static str {
        self.record
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Primary key columns in declaration order (composite keys have several).
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.tag.primary_key)
    }

    /// The primary key column, for operations that need exactly one.
    pub fn single_primary_key(&self) -> SqlRowResult<&ColumnDescriptor> {
        let mut keys = self.primary_keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => Err(SqlRowError::schema(self.record, "no primary key column")),
            (Some(_), Some(_)) => Err(SqlRowError::schema(
                self.record,
                format!(
                    "composite primary key ({} columns) where a single key is required",
                    self.primary_keys().count()
                ),
            )),
        }
    }

    pub fn auto_increment(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.tag.auto_increment)
    }

    pub fn version(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.tag.version)
    }

    /// Column names under `convention`, in model order.
    pub fn column_names(&self, convention: Convention) -> Vec<String> {
        self.columns.iter().map(|c| c.column_name(convention)).collect()
    }

    /// Find a column by its name under `convention`.
    pub fn find(&self, column: &str, convention: Convention) -> SqlRowResult<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.column_name(convention) == column)
            .ok_or_else(|| {
                SqlRowError::schema(self.record, format!("no column named '{}'", column))
            })
    }

    /// Read the value of `column` out of `record` by following its field
    /// index. An absent optional record on the way yields NULL.
    pub fn value(&self, column: &ColumnDescriptor, record: &dyn FieldAccess) -> SqlRowResult<Value> {
        let positions = column.index.positions();
        let mut current = record;

        for (depth, &position) in positions.iter().enumerate() {
            let last = depth + 1 == positions.len();
            match current.field(position)? {
                FieldRef::Record(inner) if !last => current = inner,
                FieldRef::Null => return Ok(Value::Null),
                FieldRef::Value(value) if last => return Ok(column.bound(value)),
                _ => {
                    return Err(SqlRowError::TypeShape(format!(
                        "{}.{}: field at position {} does not match the column model",
                        self.record, column.path, position
                    )));
                }
            }
        }

        Err(SqlRowError::TypeShape(format!(
            "{}.{}: empty field index",
            self.record, column.path
        )))
    }

    /// Match result column names to the columns they are scanned into.
    /// A name with no column is a type shape error: the destination record
    /// has nowhere to put it.
    pub fn scan_targets<'m, S: AsRef<str>>(
        &'m self,
        names: &[S],
        convention: Convention,
    ) -> SqlRowResult<ScanTargets<'m>> {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.find(name, convention).map_err(|_| {
                    SqlRowError::TypeShape(format!(
                        "result column '{}' has no field in {}",
                        name, self.record
                    ))
                })
            })
            .collect::<SqlRowResult<Vec<_>>>()?;

        Ok(ScanTargets {
            model: self,
            columns,
        })
    }

    /// Values of all `columns` of `record`, in order.
    pub fn values<'c>(
        &self,
        columns: impl IntoIterator<Item = &'c ColumnDescriptor>,
        record: &dyn FieldAccess,
    ) -> SqlRowResult<Vec<Value>> {
        columns.into_iter().map(|c| self.value(c, record)).collect()
    }
}

/// Result columns matched to record fields, resolved once per result set.
#[derive(Debug, Clone)]
pub struct ScanTargets<'m> {
    model: &'m ColumnModel,
    columns: Vec<&'m ColumnDescriptor>,
}

impl<'m> ScanTargets<'m> {
    pub fn columns(&self) -> &[&'m ColumnDescriptor] {
        &self.columns
    }

    /// Store one row's cells, in result column order, into `record`.
    pub fn scan(
        &self,
        cells: impl IntoIterator<Item = Value>,
        record: &mut dyn FieldAccess,
    ) -> SqlRowResult<()> {
        let cells: Vec<Value> = cells.into_iter().collect();
        if cells.len() != self.columns.len() {
            return Err(SqlRowError::TypeShape(format!(
                "{}: row has {} cells for {} columns",
                self.model.record,
                cells.len(),
                self.columns.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(cells) {
            // Empty values went out as NULL; the fresh record already holds them.
            if column.tag.empty_null && value.is_null() {
                continue;
            }
            record.set_field(column.index.positions(), value).map_err(|e| match e {
                SqlRowError::TypeShape(message) => SqlRowError::TypeShape(format!(
                    "{}.{}: {}",
                    self.model.record, column.path, message
                )),
                other => other,
            })?;
        }
        Ok(())
    }

    /// A new `T` filled from one row.
    pub fn read<T: FieldAccess + Default>(
        &self,
        cells: impl IntoIterator<Item = Value>,
    ) -> SqlRowResult<T> {
        let mut record = T::default();
        self.scan(cells, &mut record)?;
        Ok(record)
    }
}

struct Walker {
    record: &'static str,
    path: Vec<PathSegment>,
    index: Vec<usize>,
    nullable: bool,
    columns: Vec<ColumnDescriptor>,
}

impl Walker {
    fn walk(&mut self, shape: &RecordShape) -> SqlRowResult<()> {
        for (position, field) in shape.fields.iter().enumerate() {
            let tag = TagMeta::parse(field.tag).map_err(|e| match e {
                SqlRowError::Schema { message, .. } => SqlRowError::schema(
                    self.record,
                    format!("field `{}.{}`: {}", shape.name, field.name, message),
                ),
                other => other,
            })?;
            if tag.ignore {
                continue;
            }

            let nested = if tag.json { None } else { field.ty.as_record() };
            if !field.public && nested.is_none() {
                continue;
            }
            if nested.is_none() && !tag.json && field.ty.is_unmappable() {
                continue;
            }

            let outer_nullable = self.nullable;
            self.nullable |= field.ty.nullable;
            self.index.push(position);

            let segment = PathSegment {
                field: field.name,
                tag,
            };
            match (field.embedded, nested) {
                (true, Some(inner)) => self.walk(inner)?,
                (true, None) => {
                    return Err(SqlRowError::schema(
                        self.record,
                        format!(
                            "field `{}.{}` is flattened but is not a record",
                            shape.name, field.name
                        ),
                    ));
                }
                (false, Some(inner)) => {
                    self.path.push(segment);
                    self.walk(inner)?;
                    self.path.pop();
                }
                (false, None) => {
                    let leaf_tag = segment.tag.clone();
                    let mut path = self.path.clone();
                    path.push(segment);
                    self.columns.push(ColumnDescriptor {
                        path: FieldPath(path),
                        index: FieldIndex(self.index.clone()),
                        tag: leaf_tag,
                        nullable: self.nullable,
                    });
                }
            }

            self.index.pop();
            self.nullable = outer_nullable;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldShape, TypeShape};
    use pretty_assertions::assert_eq;

    const fn field(name: &'static str, tag: &'static str, ty: TypeShape) -> FieldShape {
        FieldShape {
            name,
            tag,
            public: true,
            embedded: false,
            ty,
        }
    }

    const ADDRESS: RecordShape = RecordShape {
        name: "Address",
        fields: &[
            field("street", "", TypeShape::SCALAR),
            field("locality", "town", TypeShape::SCALAR),
        ],
    };

    const AUDIT: RecordShape = RecordShape {
        name: "Audit",
        fields: &[
            field("created_at", "", TypeShape::TIMESTAMP),
            field("rev", "version", TypeShape::SCALAR),
        ],
    };

    const USER: RecordShape = RecordShape {
        name: "User",
        fields: &[
            field("id", "pk autoincr", TypeShape::SCALAR),
            field("HomeAddress", "", TypeShape::record(&ADDRESS)),
            FieldShape {
                name: "audit",
                tag: "",
                public: true,
                embedded: true,
                ty: TypeShape::record(&AUDIT),
            },
            field("skipped", "-", TypeShape::SCALAR),
            FieldShape {
                name: "secret",
                tag: "",
                public: false,
                embedded: false,
                ty: TypeShape::SCALAR,
            },
            field("callbacks", "", TypeShape::FUNCTION),
            field("prefs", "json", TypeShape::MAP),
            field("avatar", "", TypeShape::BYTES),
            field("nickname", "", TypeShape::SCALAR.nullable()),
        ],
    };

    #[test]
    fn test_walk_order_and_names() {
        let model = ColumnModel::build(&USER).unwrap();
        assert_eq!(
            model.column_names(Convention::Snake),
            vec![
                "id",
                "home_address_street",
                "home_address_town",
                "created_at",
                "rev",
                "prefs",
                "avatar",
                "nickname",
            ]
        );
    }

    #[test]
    fn test_field_index_follows_embedding() {
        let model = ColumnModel::build(&USER).unwrap();
        let positions: Vec<Vec<usize>> = model
            .columns()
            .iter()
            .map(|c| c.index.positions().to_vec())
            .collect();
        assert_eq!(
            positions,
            vec![
                vec![0],
                vec![1, 0],
                vec![1, 1],
                vec![2, 0],
                vec![2, 1],
                vec![6],
                vec![7],
                vec![8],
            ]
        );
        // Embedded fields add no path segment.
        assert_eq!(model.columns()[3].path.len(), 1);
        assert_eq!(model.columns()[1].path.to_string(), "HomeAddress.street");
    }

    #[test]
    fn test_key_queries() {
        let model = ColumnModel::build(&USER).unwrap();
        assert_eq!(model.single_primary_key().unwrap().column_name(Convention::Snake), "id");
        assert_eq!(model.auto_increment().unwrap().column_name(Convention::Snake), "id");
        assert_eq!(model.version().unwrap().column_name(Convention::Snake), "rev");
        assert!(model.columns()[7].nullable);
        assert!(!model.columns()[0].nullable);
    }

    #[test]
    fn test_composite_key_is_rejected_at_point_of_use() {
        const KEYED: RecordShape = RecordShape {
            name: "Keyed",
            fields: &[
                field("id", "pk", TypeShape::SCALAR),
                field("hash", "pk", TypeShape::SCALAR),
            ],
        };
        let model = ColumnModel::build(&KEYED).unwrap();
        assert_eq!(model.primary_keys().count(), 2);
        assert!(matches!(
            model.single_primary_key(),
            Err(SqlRowError::Schema { .. })
        ));
    }

    #[test]
    fn test_missing_key() {
        let model = ColumnModel::build(&ADDRESS).unwrap();
        let err = model.single_primary_key().unwrap_err();
        assert_eq!(err.to_string(), "Schema error in Address: no primary key column");
    }

    #[test]
    fn test_flatten_requires_record() {
        const BAD: RecordShape = RecordShape {
            name: "Bad",
            fields: &[FieldShape {
                name: "x",
                tag: "",
                public: true,
                embedded: true,
                ty: TypeShape::SCALAR,
            }],
        };
        assert!(ColumnModel::build(&BAD).is_err());
    }

    #[test]
    fn test_bad_tag_names_field() {
        const BAD: RecordShape = RecordShape {
            name: "Bad",
            fields: &[field("x", "pk name", TypeShape::SCALAR)],
        };
        let err = ColumnModel::build(&BAD).unwrap_err().to_string();
        assert!(err.contains("field `Bad.x`"), "{err}");
    }

    #[test]
    fn test_find_unknown_column() {
        let model = ColumnModel::build(&USER).unwrap();
        assert!(model.find("home_address_town", Convention::Snake).is_ok());
        assert!(model.find("nope", Convention::Snake).is_err());
    }
}
