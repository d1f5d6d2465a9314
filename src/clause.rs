//! Clause tracking for template expansion.
//!
//! The expander never parses SQL. It only follows statement keywords to know
//! which part of a statement a placeholder sits in, which in turn decides the
//! default column filter and how the columns are rendered.

use std::fmt;

use crate::column::ColumnDescriptor;

/// The part of a statement currently being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Clause {
    #[default]
    None,
    SelectColumns,
    SelectFrom,
    SelectWhere,
    SelectOrderBy,
    InsertColumns,
    InsertValues,
    UpdateTable,
    UpdateSet,
    UpdateWhere,
    DeleteFrom,
    DeleteWhere,
}

impl Clause {
    /// Next clause after the statement keyword `word`. Words that do not
    /// apply in the current clause leave it unchanged.
    pub fn transition(self, word: &str) -> Clause {
        use Clause::*;

        match (self, word.to_ascii_lowercase().as_str()) {
            (_, "select") => SelectColumns,
            (_, "insert" | "into") => InsertColumns,
            (_, "update") => UpdateTable,
            (_, "delete") => DeleteFrom,
            (None | SelectColumns, "from") => SelectFrom,
            (SelectFrom | SelectColumns | SelectWhere, "order") => SelectOrderBy,
            (SelectFrom | SelectColumns, "where") => SelectWhere,
            (InsertColumns, "values") => InsertValues,
            (UpdateTable, "set") => UpdateSet,
            (UpdateSet | UpdateTable, "where") => UpdateWhere,
            (DeleteFrom, "where") => DeleteWhere,
            (current, _) => current,
        }
    }

    /// Column filter for a placeholder that names none.
    pub fn default_filter(self) -> Filter {
        match self {
            Clause::SelectWhere | Clause::SelectOrderBy | Clause::UpdateWhere | Clause::DeleteWhere => {
                Filter::PrimaryKey
            }
            Clause::InsertColumns | Clause::InsertValues => Filter::Insertable,
            Clause::UpdateSet => Filter::Updatable,
            _ => Filter::All,
        }
    }

    /// Whether a placeholder may appear here at all.
    pub fn accepts_placeholder(self) -> bool {
        !matches!(
            self,
            Clause::None | Clause::SelectFrom | Clause::UpdateTable | Clause::DeleteFrom
        )
    }

    /// WHERE-style clauses render `col=?` predicates joined by `and`.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            Clause::SelectWhere | Clause::UpdateWhere | Clause::DeleteWhere
        )
    }

    /// Clauses where an `alias` prefix is rendered.
    pub fn takes_alias(self) -> bool {
        matches!(self, Clause::SelectColumns | Clause::SelectOrderBy) || self.is_predicate()
    }

    pub fn name(self) -> &'static str {
        match self {
            Clause::None => "no clause",
            Clause::SelectColumns => "select columns",
            Clause::SelectFrom => "select from",
            Clause::SelectWhere => "select where",
            Clause::SelectOrderBy => "select order by",
            Clause::InsertColumns => "insert columns",
            Clause::InsertValues => "insert values",
            Clause::UpdateTable => "update table",
            Clause::UpdateSet => "update set",
            Clause::UpdateWhere => "update where",
            Clause::DeleteFrom => "delete from",
            Clause::DeleteWhere => "delete where",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which columns a placeholder selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    All,
    PrimaryKey,
    /// Everything but the auto-increment column.
    Insertable,
    /// Everything but primary key and auto-increment columns.
    Updatable,
}

impl Filter {
    pub fn accepts(self, column: &ColumnDescriptor) -> bool {
        match self {
            Filter::All => true,
            Filter::PrimaryKey => column.tag.primary_key,
            Filter::Insertable => !column.tag.auto_increment,
            Filter::Updatable => !column.tag.primary_key && !column.tag.auto_increment,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Filter::All => "all",
            Filter::PrimaryKey => "pk",
            Filter::Insertable => "insertable",
            Filter::Updatable => "updatable",
        };
        f.write_str(name)
    }
}
