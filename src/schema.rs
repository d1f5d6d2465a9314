//! Schema: dialect, naming convention and the caches that go with them.
//!
//! A [`Schema`] is built once and shared (it is `Send + Sync`). Every
//! statement it prepares is cached by record type, dialect, convention and
//! template text, so preparing the same statement again is a map lookup.
//!
//! ```ignore
//! let schema = Schema::new(Dialect::Postgres, Convention::Snake);
//! let insert = schema.insert::<User>("users")?;
//! // insert into "users" ("name","email") values ($1,$2)
//! let args = insert.args(&user)?;
//! ```

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{CacheStats, ColumnCache, StatementCache, StatementKey};
use crate::column::{ColumnDescriptor, ColumnModel};
use crate::dialect::Dialect;
use crate::error::{SqlRowError, SqlRowResult};
use crate::expand::{expand, Bind};
use crate::naming::Convention;
use crate::record::Record;
use crate::value::Value;

/// An expanded template together with the column model it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub sql: String,
    pub binds: Vec<Bind>,
    /// Caller-supplied arguments the statement needs.
    pub arguments: usize,
    pub model: Arc<ColumnModel>,
}

impl PreparedStatement {
    /// Descriptors of the column binds, in bind order.
    pub fn bind_columns(&self) -> Vec<&ColumnDescriptor> {
        let columns = self.model.columns();
        self.binds
            .iter()
            .filter_map(|b| match b {
                Bind::Column(i) => columns.get(*i),
                Bind::Argument(_) => None,
            })
            .collect()
    }
}

/// Composition root for statement preparation.
pub struct Schema {
    dialect: Dialect,
    convention: Convention,
    columns: ColumnCache,
    statements: StatementCache,
}

impl Schema {
    pub fn new(dialect: Dialect, convention: Convention) -> Self {
        Self {
            dialect,
            convention,
            columns: ColumnCache::new(),
            statements: StatementCache::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Column model of `T`, built on first use.
    pub fn columns<T: Record>(&self) -> SqlRowResult<Arc<ColumnModel>> {
        self.columns
            .get_or_try_insert_with(TypeId::of::<T>(), || ColumnModel::build(T::SHAPE))
    }

    /// Expand `template` for `T`, or fetch it from the statement cache.
    pub fn prepare<T: Record>(&self, template: &str) -> SqlRowResult<Statement<T>> {
        let key = StatementKey {
            record: TypeId::of::<T>(),
            dialect: self.dialect,
            convention: self.convention,
            template: template.to_string(),
        };
        let prepared = self.statements.get_or_try_insert_with(key, || {
            let model = self.columns::<T>()?;
            let expansion = expand(template, &model, self.convention, self.dialect)?;
            Ok(PreparedStatement {
                arguments: expansion.argument_count(),
                sql: expansion.sql,
                binds: expansion.binds,
                model,
            })
        })?;

        Ok(Statement {
            prepared,
            _record: PhantomData,
        })
    }

    /// `insert into <table> (<insertable columns>) values (...)`.
    pub fn insert<T: Record>(&self, table: &str) -> SqlRowResult<Statement<T>> {
        let table = self.dialect.quote_path(table);
        self.prepare(&format!("insert into {} ({{}}) values ({{}})", table))
    }

    /// `update <table> set <updatable columns> where <key columns>`.
    pub fn update<T: Record>(&self, table: &str) -> SqlRowResult<Statement<T>> {
        let table = self.dialect.quote_path(table);
        self.prepare(&format!("update {} set {{}} where {{}}", table))
    }

    /// `delete from <table> where <key columns>`.
    pub fn delete<T: Record>(&self, table: &str) -> SqlRowResult<Statement<T>> {
        let table = self.dialect.quote_path(table);
        self.prepare(&format!("delete from {} where {{}}", table))
    }

    /// `select <all columns> from <table>`.
    pub fn select<T: Record>(&self, table: &str) -> SqlRowResult<Statement<T>> {
        let table = self.dialect.quote_path(table);
        self.prepare(&format!("select {{}} from {}", table))
    }

    /// `select <all columns> from <table> where <key column>`. The record
    /// must have exactly one primary key column.
    pub fn select_by_key<T: Record>(&self, table: &str) -> SqlRowResult<Statement<T>> {
        self.columns::<T>()?.single_primary_key()?;
        let table = self.dialect.quote_path(table);
        self.prepare(&format!("select {{}} from {} where {{}}", table))
    }

    /// Number of cached statements.
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Number of cached column models.
    pub fn model_count(&self) -> usize {
        self.columns.len()
    }

    pub fn statement_stats(&self) -> CacheStats {
        self.statements.stats()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(Dialect::default(), Convention::default())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("dialect", &self.dialect)
            .field("convention", &self.convention)
            .field("models", &self.columns.len())
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// A prepared statement for record type `T`.
pub struct Statement<T> {
    prepared: Arc<PreparedStatement>,
    _record: PhantomData<fn(&T)>,
}

impl<T> Clone for Statement<T> {
    fn clone(&self) -> Self {
        Self {
            prepared: Arc::clone(&self.prepared),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Statement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.prepared.sql)
            .field("binds", &self.prepared.binds)
            .finish()
    }
}

impl<T: Record> Statement<T> {
    pub fn sql(&self) -> &str {
        &self.prepared.sql
    }

    pub fn binds(&self) -> &[Bind] {
        &self.prepared.binds
    }

    pub fn bind_columns(&self) -> Vec<&ColumnDescriptor> {
        self.prepared.bind_columns()
    }

    pub fn prepared(&self) -> &Arc<PreparedStatement> {
        &self.prepared
    }

    /// Bind values for `row`, for statements without caller arguments.
    pub fn args(&self, row: &T) -> SqlRowResult<Vec<Value>> {
        self.args_with(row, &[])
    }

    /// Bind values for `row`, taking template `?`/`$N` markers from
    /// `arguments`.
    pub fn args_with(&self, row: &T, arguments: &[Value]) -> SqlRowResult<Vec<Value>> {
        let prepared = &self.prepared;
        if arguments.len() != prepared.arguments {
            return Err(SqlRowError::Arguments {
                expected: prepared.arguments,
                actual: arguments.len(),
            });
        }

        let columns = prepared.model.columns();
        prepared
            .binds
            .iter()
            .map(|bind| match *bind {
                Bind::Column(i) => prepared.model.value(&columns[i], row),
                Bind::Argument(n) => Ok(arguments[n].clone()),
            })
            .collect()
    }

    /// Bind values from bare key values instead of a record: the k-th
    /// primary key column takes `keys[k]`. Fails if the statement binds
    /// anything but key columns.
    pub fn key_args(&self, keys: &[Value]) -> SqlRowResult<Vec<Value>> {
        let model = &self.prepared.model;
        let key_count = model.primary_keys().count();
        if keys.len() != key_count {
            return Err(SqlRowError::Arguments {
                expected: key_count,
                actual: keys.len(),
            });
        }

        let columns = model.columns();
        self.prepared
            .binds
            .iter()
            .map(|bind| {
                let slot = match *bind {
                    Bind::Column(i) if columns[i].is_primary_key() => columns[..i]
                        .iter()
                        .filter(|c| c.is_primary_key())
                        .count(),
                    _ => {
                        return Err(SqlRowError::schema(
                            model.record(),
                            format!("statement binds more than key columns: {}", self.prepared.sql),
                        ));
                    }
                };
                Ok(keys[slot].clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(crate::Record)]
    struct Account {
        #[sql("pk autoincr")]
        pub id: i64,
        pub owner: String,
        #[sql("emptynull")]
        pub email: String,
        #[sql("version")]
        pub rev: i32,
    }

    #[derive(crate::Record)]
    struct Membership {
        #[sql("pk")]
        pub group_id: i64,
        #[sql("pk")]
        pub user_id: i64,
        pub role: String,
    }

    fn account() -> Account {
        Account {
            id: 7,
            owner: "ann".into(),
            email: String::new(),
            rev: 3,
        }
    }

    #[test]
    fn test_builders() {
        let schema = Schema::new(Dialect::Postgres, Convention::Snake);
        assert_eq!(
            schema.insert::<Account>("accounts").unwrap().sql(),
            r#"insert into "accounts" ("owner","email","rev") values ($1,$2,$3)"#
        );
        assert_eq!(
            schema.update::<Account>("accounts").unwrap().sql(),
            r#"update "accounts" set "owner"=$1,"email"=$2,"rev"=$3 where "id"=$4"#
        );
        assert_eq!(
            schema.delete::<Account>("accounts").unwrap().sql(),
            r#"delete from "accounts" where "id"=$1"#
        );
        assert_eq!(
            schema.select::<Account>("accounts").unwrap().sql(),
            r#"select "id","owner","email","rev" from "accounts""#
        );
    }

    #[test]
    fn test_builders_quote_qualified_tables() {
        let schema = Schema::new(Dialect::Postgres, Convention::Snake);
        assert_eq!(
            schema.delete::<Account>("billing.accounts").unwrap().sql(),
            r#"delete from "billing"."accounts" where "id"=$1"#
        );
    }

    #[test]
    fn test_args_follow_bind_order() {
        let schema = Schema::new(Dialect::Postgres, Convention::Snake);
        let update = schema.update::<Account>("accounts").unwrap();
        assert_eq!(
            update.args(&account()).unwrap(),
            vec![
                Value::Text("ann".into()),
                Value::Null,
                Value::Int(3),
                Value::Int(7),
            ]
        );
        let names: Vec<String> = update
            .bind_columns()
            .iter()
            .map(|c| c.column_name(Convention::Snake))
            .collect();
        assert_eq!(names, vec!["owner", "email", "rev", "id"]);
    }

    #[test]
    fn test_args_with_checks_count() {
        let schema = Schema::default();
        let stmt = schema
            .prepare::<Account>("update accounts set {} where {} and rev = ?")
            .unwrap();
        let err = stmt.args(&account()).unwrap_err();
        assert!(matches!(
            err,
            SqlRowError::Arguments {
                expected: 1,
                actual: 0
            }
        ));
        let args = stmt.args_with(&account(), &[Value::Int(2)]).unwrap();
        assert_eq!(args.last(), Some(&Value::Int(2)));
    }

    #[test]
    fn test_statements_are_cached() {
        let schema = Schema::default();
        let a = schema.select::<Account>("accounts").unwrap();
        let b = schema.select::<Account>("accounts").unwrap();
        assert!(Arc::ptr_eq(a.prepared(), b.prepared()));
        assert_eq!(schema.statement_count(), 1);
        assert_eq!(schema.model_count(), 1);

        schema.select::<Membership>("accounts").unwrap();
        assert_eq!(schema.statement_count(), 2);
        assert_eq!(schema.model_count(), 2);
    }

    #[test]
    fn test_select_by_key_requires_single_key() {
        let schema = Schema::default();
        let stmt = schema.select_by_key::<Account>("accounts").unwrap();
        assert_eq!(stmt.key_args(&[Value::Int(9)]).unwrap(), vec![Value::Int(9)]);

        let err = schema.select_by_key::<Membership>("members").unwrap_err();
        assert!(matches!(err, SqlRowError::Schema { .. }));
    }

    #[test]
    fn test_composite_key_args() {
        let schema = Schema::new(Dialect::MySql, Convention::Snake);
        let stmt = schema.delete::<Membership>("members").unwrap();
        assert_eq!(
            stmt.sql(),
            "delete from `members` where `group_id`=? and `user_id`=?"
        );
        assert_eq!(
            stmt.key_args(&[Value::Int(1), Value::Int(2)]).unwrap(),
            vec![Value::Int(1), Value::Int(2)]
        );
        assert!(stmt.key_args(&[Value::Int(1)]).is_err());

        let update = schema.update::<Membership>("members").unwrap();
        assert!(update.key_args(&[Value::Int(1), Value::Int(2)]).is_err());
    }
}
