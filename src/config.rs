//! TOML configuration.
//!
//! ```toml
//! dialect = "postgres"
//! convention = "snake"
//! database_url = "postgres://localhost/app"
//!
//! [records.Address]
//! fields = [
//!     { name = "street" },
//!     { name = "city", tag = "town" },
//! ]
//!
//! [records.User]
//! fields = [
//!     { name = "id", tag = "pk autoincr" },
//!     { name = "name" },
//!     { name = "home", record = "Address" },
//!     { name = "prefs", kind = "json" },
//! ]
//! ```
//!
//! Records defined here stand in for derived record types wherever no Rust
//! type exists, which is what the `sqlrow` command-line tool works with.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{SqlRowError, SqlRowResult};
use crate::naming::Convention;
use crate::record::{FieldShape, RecordShape, TypeShape};

/// File looked up in the working directory.
pub const LOCAL_CONFIG: &str = "sqlrow.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dialect: Option<Dialect>,
    #[serde(default)]
    pub convention: Option<Convention>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub records: BTreeMap<String, RecordDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDef {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    /// Name of another record in this file; makes the field a nested record.
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub flatten: bool,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

/// Value kind of a configured field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Scalar,
    Bytes,
    Timestamp,
    Json,
    Map,
    Function,
    Channel,
    Interface,
}

impl FieldKind {
    fn shape(self) -> TypeShape {
        match self {
            FieldKind::Scalar => TypeShape::SCALAR,
            FieldKind::Bytes => TypeShape::BYTES,
            FieldKind::Timestamp => TypeShape::TIMESTAMP,
            FieldKind::Json => TypeShape::SERIALIZED,
            FieldKind::Map => TypeShape::MAP,
            FieldKind::Function => TypeShape::FUNCTION,
            FieldKind::Channel => TypeShape::CHANNEL,
            FieldKind::Interface => TypeShape::INTERFACE,
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise from `./sqlrow.toml` or
    /// `<config dir>/sqlrow/config.toml`, whichever exists first. With no
    /// file at all the defaults apply.
    pub fn load(path: Option<&Path>) -> SqlRowResult<Config> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in Self::search_paths() {
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Candidate config files in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqlrow").join("config.toml"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> SqlRowResult<Config> {
        tracing::debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| SqlRowError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> SqlRowResult<Config> {
        toml::from_str(content).map_err(|e| SqlRowError::Config(e.to_string()))
    }

    /// Configured dialect, else the one implied by the configured
    /// database URL.
    pub fn dialect(&self) -> Dialect {
        self.dialect_for(self.database_url.as_deref())
    }

    /// Configured dialect, else the one implied by `database_url`.
    pub fn dialect_for(&self, database_url: Option<&str>) -> Dialect {
        self.dialect
            .or_else(|| database_url.map(Dialect::for_driver))
            .unwrap_or_default()
    }

    pub fn convention(&self) -> Convention {
        self.convention.unwrap_or_default()
    }

    pub fn record_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Build the shape of record `name`. Shapes are leaked: they live for
    /// the rest of the process, like those of derived records.
    pub fn record_shape(&self, name: &str) -> SqlRowResult<&'static RecordShape> {
        let mut visiting = Vec::new();
        self.build_shape(name, &mut visiting)
    }

    fn build_shape(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> SqlRowResult<&'static RecordShape> {
        let def = self
            .records
            .get(name)
            .ok_or_else(|| SqlRowError::schema(name, "no such record in configuration"))?;
        if visiting.iter().any(|v| v == name) {
            return Err(SqlRowError::schema(
                name,
                format!("record cycle: {} -> {}", visiting.join(" -> "), name),
            ));
        }
        visiting.push(name.to_string());

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let mut ty = match &field.record {
                Some(inner) => TypeShape::record(self.build_shape(inner, visiting)?),
                None => field.kind.shape(),
            };
            if field.nullable {
                ty = ty.nullable();
            }
            fields.push(FieldShape {
                name: leak(&field.name),
                tag: leak(&field.tag),
                public: field.public,
                embedded: field.flatten,
                ty,
            });
        }

        visiting.pop();
        Ok(Box::leak(Box::new(RecordShape {
            name: leak(name),
            fields: fields.leak(),
        })))
    }
}

fn leak(text: &str) -> &'static str {
    text.to_string().leak()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnModel;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
dialect = "mysql"

[records.Address]
fields = [
    { name = "street" },
    { name = "city", tag = "town" },
]

[records.Audit]
fields = [{ name = "created_at", kind = "timestamp" }]

[records.User]
fields = [
    { name = "id", tag = "pk autoincr" },
    { name = "home", record = "Address", nullable = true },
    { name = "audit", record = "Audit", flatten = true },
    { name = "prefs", kind = "map" },
    { name = "settings", kind = "map", tag = "json" },
    { name = "secret", public = false },
]
"#;

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.dialect(), Dialect::MySql);
        assert_eq!(config.convention(), Convention::Snake);
        assert_eq!(config.database_url, None);
        assert_eq!(
            config.record_names().collect::<Vec<_>>(),
            vec!["Address", "Audit", "User"]
        );
    }

    #[test]
    fn test_dialect_follows_database_url() {
        let config = Config::parse(r#"database_url = "mysql://localhost/app""#).unwrap();
        assert_eq!(config.dialect(), Dialect::MySql);
        assert_eq!(
            config.dialect_for(Some("postgres://u@localhost/db")),
            Dialect::Postgres
        );
        assert_eq!(Config::default().dialect_for(None), Dialect::Ansi);

        let pinned = Config::parse(SAMPLE).unwrap();
        assert_eq!(
            pinned.dialect_for(Some("postgres://u@localhost/db")),
            Dialect::MySql
        );
    }

    #[test]
    fn test_configured_record_columns() {
        let config = Config::parse(SAMPLE).unwrap();
        let shape = config.record_shape("User").unwrap();
        let model = ColumnModel::build(shape).unwrap();
        assert_eq!(
            model.column_names(Convention::Snake),
            vec!["id", "home_street", "home_town", "created_at", "settings"]
        );
        assert!(model.columns()[1].nullable);
    }

    #[test]
    fn test_unknown_reference() {
        let config = Config::parse(
            r#"
[records.A]
fields = [{ name = "b", record = "B" }]
"#,
        )
        .unwrap();
        let err = config.record_shape("A").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error in B: no such record in configuration"
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let config = Config::parse(
            r#"
[records.A]
fields = [{ name = "b", record = "B" }]

[records.B]
fields = [{ name = "a", record = "A" }]
"#,
        )
        .unwrap();
        let err = config.record_shape("A").unwrap_err().to_string();
        assert!(err.contains("A -> B -> A"), "{err}");
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Config::parse("dialect = 3"),
            Err(SqlRowError::Config(_))
        ));
        assert!(Config::parse("dialect = \"oracle\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, SqlRowError::Io(_)));
    }
}
