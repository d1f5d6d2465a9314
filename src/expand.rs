//! Template expansion.
//!
//! A template is plain SQL with `{...}` placeholders:
//!
//! ```text
//! insert into users ({}) values ({})
//! select {alias u} from users u where {pk,alias u}
//! update users set {} where {}
//! ```
//!
//! The expander scans the template once, follows statement keywords through
//! the [`Clause`] state machine and replaces each placeholder with the
//! record's columns, rendered for the clause it sits in. Everything else is
//! copied through unchanged, except bind markers (`?`, `?N`, `$N`), which are
//! renumbered for the dialect so that caller arguments and column values
//! share one left-to-right numbering.

use std::collections::HashMap;

use crate::clause::{Clause, Filter};
use crate::column::ColumnModel;
use crate::dialect::Dialect;
use crate::error::{SqlRowError, SqlRowResult};
use crate::naming::Convention;
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;

/// Words that drive clause tracking and directive parsing.
pub const TEMPLATE_KEYWORDS: &[&str] = &[
    "select", "from", "where", "insert", "update", "into", "values", "set", "order", "delete",
    "alias", "all", "pk",
];

/// Source of one bind position in an expanded statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bind {
    /// The value of the i-th column of the model.
    Column(usize),
    /// The n-th caller-supplied argument (0-based).
    Argument(usize),
}

/// Result of expanding one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub sql: String,
    /// One entry per bind placeholder, left to right.
    pub binds: Vec<Bind>,
}

impl Expansion {
    /// Number of caller-supplied arguments the statement refers to.
    pub fn argument_count(&self) -> usize {
        self.binds
            .iter()
            .filter_map(|b| match b {
                Bind::Argument(n) => Some(n + 1),
                Bind::Column(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Bind values taken from column values keyed by column name, for
    /// records without a Rust type. Every bound column must be supplied;
    /// unknown column names are rejected.
    pub fn values(
        &self,
        model: &ColumnModel,
        convention: Convention,
        columns: &HashMap<String, Value>,
        arguments: &[Value],
    ) -> SqlRowResult<Vec<Value>> {
        let expected = self.argument_count();
        if arguments.len() != expected {
            return Err(SqlRowError::Arguments {
                expected,
                actual: arguments.len(),
            });
        }
        for name in columns.keys() {
            model.find(name, convention)?;
        }

        let descriptors = model.columns();
        let mut missing = Vec::new();
        let mut values = Vec::with_capacity(self.binds.len());
        for bind in &self.binds {
            match *bind {
                Bind::Column(i) => {
                    let column = &descriptors[i];
                    let name = column.column_name(convention);
                    match columns.get(&name) {
                        Some(value) => values.push(column.bound(value.clone())),
                        None => {
                            if !missing.contains(&name) {
                                missing.push(name);
                            }
                        }
                    }
                }
                Bind::Argument(n) => values.push(arguments[n].clone()),
            }
        }

        if !missing.is_empty() {
            return Err(SqlRowError::schema(
                model.record(),
                format!("no value for column(s) {}", missing.join(", ")),
            ));
        }
        Ok(values)
    }
}

/// Parsed contents of a `{...}` placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    pub filter: Option<Filter>,
    pub alias: Option<String>,
}

impl Directive {
    /// Parse the tokens between the braces. `source` is the raw directive
    /// text, used in error messages.
    pub fn parse(tokens: &[Token<'_>], source: &str) -> SqlRowResult<Directive> {
        let mut directive = Directive::default();
        let mut words = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment));

        while let Some(token) = words.next() {
            if token.is_operator(",") {
                continue;
            }
            if token.is_keyword("all") || token.is_keyword("pk") {
                if directive.filter.is_some() {
                    return Err(SqlRowError::directive(source, "more than one column filter"));
                }
                directive.filter = Some(if token.is_keyword("all") {
                    Filter::All
                } else {
                    Filter::PrimaryKey
                });
            } else if token.is_keyword("alias") {
                if directive.alias.is_some() {
                    return Err(SqlRowError::directive(source, "more than one alias"));
                }
                match words.next() {
                    Some(ident) if matches!(ident.kind, TokenKind::Ident | TokenKind::QuotedIdent) => {
                        directive.alias = Some(ident.text.to_string());
                    }
                    _ => return Err(SqlRowError::directive(source, "alias requires an identifier")),
                }
            } else {
                return Err(SqlRowError::directive(
                    source,
                    format!("unexpected {} {:?}", token.kind, token.text),
                ));
            }
        }

        Ok(directive)
    }
}

/// Expand `template` against the columns of `model`.
pub fn expand(
    template: &str,
    model: &ColumnModel,
    convention: Convention,
    dialect: Dialect,
) -> SqlRowResult<Expansion> {
    let mut expander = Expander {
        template,
        model,
        dialect,
        names: model.column_names(convention),
        clause: Clause::None,
        sql: String::with_capacity(template.len() + 64),
        binds: Vec::new(),
        next_argument: 0,
        insert_columns: None,
    };
    expander.run()?;

    Ok(Expansion {
        sql: expander.sql,
        binds: expander.binds,
    })
}

struct Expander<'t, 'm> {
    template: &'t str,
    model: &'m ColumnModel,
    dialect: Dialect,
    names: Vec<String>,
    clause: Clause,
    sql: String,
    binds: Vec<Bind>,
    /// Next argument taken by a bare `?`.
    next_argument: usize,
    /// Columns listed by the current statement's insert-columns placeholder.
    insert_columns: Option<Vec<usize>>,
}

impl<'t, 'm> Expander<'t, 'm> {
    fn run(&mut self) -> SqlRowResult<()> {
        let mut scanner = Scanner::new(self.template).with_keywords(TEMPLATE_KEYWORDS);

        loop {
            let token = scanner.next_token();
            match token.kind {
                TokenKind::End => return Ok(()),
                TokenKind::Illegal => return Err(SqlRowError::lexical(token.offset, token.text)),
                TokenKind::Keyword => {
                    let next = self.clause.transition(token.text);
                    if next == Clause::InsertColumns && self.clause != Clause::InsertColumns {
                        self.insert_columns = None;
                    }
                    self.clause = next;
                    self.sql.push_str(token.text);
                }
                TokenKind::Placeholder => self.argument(token)?,
                TokenKind::Operator if token.text == "{" => {
                    let (tokens, source) = self.collect_directive(&mut scanner, token)?;
                    let directive = Directive::parse(&tokens, source)?;
                    self.placeholder(&directive, source)?;
                }
                _ => self.sql.push_str(token.text),
            }
        }
    }

    /// Tokens up to the closing brace, and the raw text between the braces.
    fn collect_directive(
        &self,
        scanner: &mut Scanner<'t>,
        open: Token<'t>,
    ) -> SqlRowResult<(Vec<Token<'t>>, &'t str)> {
        let template = self.template;
        let start = open.offset + open.text.len();
        let mut tokens = Vec::new();

        loop {
            let token = scanner.next_token();
            match token.kind {
                TokenKind::End => {
                    return Err(SqlRowError::directive(
                        template[start..].trim(),
                        "missing closing '}'",
                    ));
                }
                TokenKind::Illegal => return Err(SqlRowError::lexical(token.offset, token.text)),
                TokenKind::Operator if token.text == "}" => {
                    return Ok((tokens, template[start..token.offset].trim()));
                }
                _ => tokens.push(token),
            }
        }
    }

    /// Renumber a bind marker already present in the template.
    fn argument(&mut self, token: Token<'_>) -> SqlRowResult<()> {
        let argument = match token.text.get(1..) {
            Some(digits) if !digits.is_empty() => match digits.parse::<usize>() {
                Ok(n) if n > 0 => n - 1,
                _ => return Err(SqlRowError::lexical(token.offset, token.text)),
            },
            _ => {
                let n = self.next_argument;
                self.next_argument += 1;
                n
            }
        };
        self.push_bind(Bind::Argument(argument));
        Ok(())
    }

    fn push_bind(&mut self, bind: Bind) {
        self.binds.push(bind);
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
    }

    fn placeholder(&mut self, directive: &Directive, source: &str) -> SqlRowResult<()> {
        let clause = self.clause;
        if !clause.accepts_placeholder() {
            return Err(SqlRowError::clause(
                clause,
                format!("placeholder {{{}}} cannot be expanded here", source),
            ));
        }

        let filter = directive.filter.unwrap_or_else(|| clause.default_filter());
        let selected: Vec<usize> = self
            .model
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.accepts(c))
            .map(|(i, _)| i)
            .collect();

        match clause {
            Clause::InsertColumns => self.insert_columns = Some(selected.clone()),
            Clause::InsertValues => match &self.insert_columns {
                None => {
                    return Err(SqlRowError::clause(
                        clause,
                        "values placeholder without a preceding columns placeholder",
                    ));
                }
                Some(columns) if columns.len() != selected.len() => {
                    return Err(SqlRowError::clause(
                        clause,
                        format!("{} values for {} columns", selected.len(), columns.len()),
                    ));
                }
                Some(columns) if *columns != selected => {
                    let listed: Vec<&str> = columns.iter().map(|&i| self.names[i].as_str()).collect();
                    return Err(SqlRowError::clause(
                        clause,
                        format!("values do not match the column list ({})", listed.join(",")),
                    ));
                }
                Some(_) => {}
            },
            _ => {}
        }

        if selected.is_empty() {
            return Err(SqlRowError::schema(
                self.model.record(),
                format!("placeholder {{{}}} in {} selects no columns ({})", source, clause, filter),
            ));
        }

        let prefix = match &directive.alias {
            Some(alias) if clause.takes_alias() => format!("{}.", alias),
            _ => String::new(),
        };
        let separator = if clause.is_predicate() { " and " } else { "," };

        for (n, &i) in selected.iter().enumerate() {
            if n > 0 {
                self.sql.push_str(separator);
            }
            let column = self.dialect.quote(&self.names[i]);
            match clause {
                Clause::InsertColumns => self.sql.push_str(&column),
                Clause::InsertValues => self.push_bind(Bind::Column(i)),
                Clause::UpdateSet => {
                    self.sql.push_str(&column);
                    self.sql.push('=');
                    self.push_bind(Bind::Column(i));
                }
                c if c.is_predicate() => {
                    self.sql.push_str(&prefix);
                    self.sql.push_str(&column);
                    self.sql.push('=');
                    self.push_bind(Bind::Column(i));
                }
                _ => {
                    self.sql.push_str(&prefix);
                    self.sql.push_str(&column);
                }
            }
        }

        Ok(())
    }
}
