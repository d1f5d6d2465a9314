//! # sqlrow: SQL templates for row records
//!
//! Write the SQL, leave out the column lists.
//!
//! sqlrow expands `{...}` placeholders in an SQL template into the columns
//! of a record type, rendered for the clause they appear in and quoted for
//! the target dialect. The bind values come out of a record instance in
//! placeholder order.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqlrow::prelude::*;
//!
//! #[derive(Record)]
//! pub struct User {
//!     #[sql("pk autoincr")]
//!     pub id: i64,
//!     pub name: String,
//!     pub email: String,
//! }
//!
//! let schema = Schema::new(Dialect::Postgres, Convention::Snake);
//! let stmt = schema.prepare::<User>("update users set {} where {}")?;
//! // => update users set "name"=$1,"email"=$2 where "id"=$3
//! let args = stmt.args(&user)?;
//! ```
//!
//! ## Placeholders
//!
//! | Placeholder   | Meaning                                   |
//! |---------------|-------------------------------------------|
//! | `{}`          | Default columns for the enclosing clause  |
//! | `{all}`       | Every column                              |
//! | `{pk}`        | Primary key columns                       |
//! | `{alias u}`   | Prefix each column with `u.`              |
//! | `{pk,alias u}`| Filter and alias combined                 |

extern crate self as sqlrow;

pub mod cache;
pub mod clause;
pub mod column;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod expand;
pub mod naming;
pub mod record;
pub mod scanner;
pub mod schema;
pub mod tag;
pub mod value;

pub use sqlrow_macros::Record;

pub mod prelude {
    pub use crate::clause::{Clause, Filter};
    pub use crate::column::{ColumnDescriptor, ColumnModel, ScanTargets};
    pub use crate::dialect::Dialect;
    pub use crate::engine::Db;
    pub use crate::error::*;
    pub use crate::expand::{expand, Bind, Expansion};
    pub use crate::naming::Convention;
    pub use crate::record::{FieldAccess, FieldType};
    pub use crate::schema::{Schema, Statement};
    pub use crate::value::Value;
    pub use crate::Record;
}

pub use record::{FieldAccess, FieldType, Record};

/// Expand `template` for record type `T` without a cache.
///
/// # Example
///
/// ```
/// use sqlrow::{Convention, Dialect, Record};
///
/// #[derive(Record)]
/// pub struct Pair {
///     #[sql("pk")]
///     pub id: i64,
///     pub name: String,
/// }
///
/// let out = sqlrow::expand_for::<Pair>("select {alias u} from t u", Dialect::MySql, Convention::Snake).unwrap();
/// assert_eq!(out.sql, "select u.`id`,u.`name` from t u");
/// ```
pub fn expand_for<T: Record>(
    template: &str,
    dialect: Dialect,
    convention: Convention,
) -> error::SqlRowResult<expand::Expansion> {
    let model = column::ColumnModel::build(T::SHAPE)?;
    expand::expand(template, &model, convention, dialect)
}

pub use dialect::Dialect;
pub use naming::Convention;
pub use schema::Schema;
