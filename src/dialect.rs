//! SQL dialects: identifier quoting and bind placeholders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlRowError;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `"col"`, `$1`, `$2`, ...
    Postgres,
    /// `` `col` ``, `?` (also SQLite and MariaDB)
    MySql,
    /// `[col]`, `?`
    MsSql,
    /// `"col"`, `?`
    #[default]
    Ansi,
}

impl Dialect {
    /// Pick a dialect from a driver name or URL scheme.
    pub fn for_driver(driver: &str) -> Dialect {
        let scheme = driver.split(':').next().unwrap_or(driver).to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" | "pg" | "pgx" => Dialect::Postgres,
            "mysql" | "mariadb" | "sqlite" | "sqlite3" => Dialect::MySql,
            "mssql" | "sqlserver" => Dialect::MsSql,
            _ => Dialect::Ansi,
        }
    }

    /// Wrap an identifier in the dialect's quotes, doubling any embedded
    /// closing quote.
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = match self {
            Dialect::Postgres | Dialect::Ansi => ('"', '"'),
            Dialect::MySql => ('`', '`'),
            Dialect::MsSql => ('[', ']'),
        };
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(open);
        for c in ident.chars() {
            if c == close {
                quoted.push(close);
            }
            quoted.push(c);
        }
        quoted.push(close);
        quoted
    }

    /// Quote a possibly qualified name (`schema.table`) one part at a time.
    pub fn quote_path(&self, name: &str) -> String {
        let parts: Vec<String> = name.split('.').map(|part| self.quote(part)).collect();
        parts.join(".")
    }

    /// The bind placeholder for the `position`-th argument (1-based).
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", position),
            Dialect::MySql | Dialect::MsSql | Dialect::Ansi => "?".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MsSql => "mssql",
            Dialect::Ansi => "ansi",
        }
    }

    pub fn all() -> [Dialect; 4] {
        [Dialect::Postgres, Dialect::MySql, Dialect::MsSql, Dialect::Ansi]
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = SqlRowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" | "sqlite" => Ok(Dialect::MySql),
            "mssql" | "sqlserver" => Ok(Dialect::MsSql),
            "ansi" | "default" => Ok(Dialect::Ansi),
            other => Err(SqlRowError::Config(format!(
                "unknown dialect '{}'. Expected: postgres, mysql, mssql or ansi",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_table() {
        assert_eq!(Dialect::Postgres.quote("col"), r#""col""#);
        assert_eq!(Dialect::MySql.quote("col"), "`col`");
        assert_eq!(Dialect::MsSql.quote("col"), "[col]");
        assert_eq!(Dialect::Ansi.quote("col"), r#""col""#);
    }

    #[test]
    fn test_quote_escapes_closing_delimiter() {
        assert_eq!(Dialect::Postgres.quote(r#"a"b"#), r#""a""b""#);
        assert_eq!(Dialect::MySql.quote("a`b"), "`a``b`");
        assert_eq!(Dialect::MsSql.quote("a]b"), "[a]]b]");
    }

    #[test]
    fn test_quote_qualified_name() {
        assert_eq!(Dialect::Postgres.quote_path("public.users"), r#""public"."users""#);
        assert_eq!(Dialect::MsSql.quote_path("dbo.users"), "[dbo].[users]");
        assert_eq!(Dialect::MySql.quote_path("users"), "`users`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(12), "$12");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::MsSql.placeholder(3), "?");
        assert_eq!(Dialect::Ansi.placeholder(3), "?");
    }

    #[test]
    fn test_for_driver() {
        assert_eq!(Dialect::for_driver("postgres://localhost/db"), Dialect::Postgres);
        assert_eq!(Dialect::for_driver("sqlite::memory:"), Dialect::MySql);
        assert_eq!(Dialect::for_driver("mssql"), Dialect::MsSql);
        assert_eq!(Dialect::for_driver("odbc"), Dialect::Ansi);
    }
}
