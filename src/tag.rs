//! Field tag mini-language.
//!
//! A tag is the string in a field's `#[sql("...")]` attribute:
//!
//! ```text
//! #[sql("-")]                    ignore the field
//! #[sql("pk autoincr")]          primary key, assigned by the database
//! #[sql("user_name")]            explicit column name
//! #[sql("'order', natural")]     quoted explicit name, natural key
//! #[sql("json")]                 stored as one JSON cell
//! ```

use crate::error::{SqlRowError, SqlRowResult};
use crate::scanner::{unquote, Scanner, TokenKind};

/// Words recognized inside a field tag.
pub const TAG_KEYWORDS: &[&str] = &[
    "pk",
    "primary_key",
    "primary",
    "autoincrement",
    "autoincr",
    "auto",
    "identity",
    "version",
    "json",
    "jsonb",
    "natural",
    "natural_key",
    "null",
    "omitempty",
    "emptynull",
];

/// Metadata parsed from one field tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagMeta {
    pub ignore: bool,
    pub name: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub version: bool,
    pub json: bool,
    pub natural_key: bool,
    pub empty_null: bool,
}

impl TagMeta {
    /// Parse a tag string. An empty tag yields the default metadata.
    pub fn parse(text: &str) -> SqlRowResult<TagMeta> {
        let mut meta = TagMeta::default();
        let mut tokens = Scanner::new(text)
            .with_keywords(TAG_KEYWORDS)
            .ignore_whitespace(true)
            .peekable();
        let mut first = true;

        while let Some(token) = tokens.next() {
            match token.kind {
                TokenKind::Illegal => {
                    return Err(SqlRowError::lexical(token.offset, token.text));
                }
                TokenKind::Operator if token.text == "-" && first => {
                    meta.ignore = true;
                    return Ok(meta);
                }
                TokenKind::Operator if token.text == "," => {}
                TokenKind::Ident | TokenKind::QuotedIdent | TokenKind::Literal if first => {
                    meta.name = Some(unquote(token.text));
                }
                TokenKind::Keyword => {
                    let word = token.text.to_ascii_lowercase();
                    let suffixes: &[&str] = match word.as_str() {
                        "primary" => &["key"],
                        "auto" => &["increment", "incr"],
                        _ => &[],
                    };
                    if tokens.peek().is_some_and(|next| {
                        next.kind == TokenKind::Ident
                            && suffixes.iter().any(|s| next.text.eq_ignore_ascii_case(s))
                    }) {
                        tokens.next();
                    }
                    meta.apply(&word);
                }
                _ => {
                    return Err(SqlRowError::schema(
                        "tag",
                        format!("unexpected {} {:?} in {:?}", token.kind, token.text, text),
                    ));
                }
            }
            first = false;
        }

        Ok(meta)
    }

    fn apply(&mut self, keyword: &str) {
        match keyword {
            "pk" | "primary_key" | "primary" => self.primary_key = true,
            "autoincrement" | "autoincr" | "auto" | "identity" => self.auto_increment = true,
            "version" => self.version = true,
            "json" | "jsonb" => self.json = true,
            "natural" | "natural_key" => self.natural_key = true,
            "null" | "omitempty" | "emptynull" => self.empty_null = true,
            _ => {}
        }
    }
}
