//! Lexical scanner for SQL templates and field tags.
//!
//! The scanner is pull-based: every call to [`Scanner::next_token`] recognizes
//! one token at the head of the remaining input. Nothing here fails; text the
//! scanner cannot make sense of comes back as a [`TokenKind::Illegal`] token
//! carrying the offending fragment, so callers can report it verbatim.
//!
//! ```text
//! select {alias u} from users u where u.id = ?
//!
//! Keyword "select", Operator "{", Keyword "alias", Ident "u", Operator "}",
//! Keyword "from", Ident "users", Ident "u", Keyword "where", Ident "u",
//! Operator ".", Ident "id", Operator "=", Placeholder "?"
//! (whitespace tokens omitted)
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit0, digit1, multispace1, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::pair,
    IResult,
};

/// Classification of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Ident,
    Keyword,
    QuotedIdent,
    Literal,
    Placeholder,
    Operator,
    Illegal,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Ident => "identifier",
            TokenKind::Keyword => "keyword",
            TokenKind::QuotedIdent => "quoted identifier",
            TokenKind::Literal => "literal",
            TokenKind::Placeholder => "placeholder",
            TokenKind::Operator => "operator",
            TokenKind::Illegal => "illegal",
            TokenKind::End => "end",
        };
        f.write_str(name)
    }
}

/// One token borrowed from the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of `text` in the scanned input.
    pub offset: usize,
}

impl<'a> Token<'a> {
    /// True when this is a keyword matching `word` (ASCII case-insensitive).
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }

    /// True when this is the operator `op`.
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

type Recognizer = fn(&str) -> IResult<&str, &str>;

/// Recognizers in the order they are attempted.
const RULES: &[(TokenKind, Recognizer)] = &[
    (TokenKind::Whitespace, whitespace as Recognizer),
    (TokenKind::Comment, line_comment as Recognizer),
    (TokenKind::Literal, string_literal as Recognizer),
    (TokenKind::QuotedIdent, double_quoted as Recognizer),
    (TokenKind::QuotedIdent, back_quoted as Recognizer),
    (TokenKind::QuotedIdent, bracketed as Recognizer),
    (TokenKind::Literal, number as Recognizer),
    (TokenKind::Placeholder, bind_placeholder as Recognizer),
    (TokenKind::Ident, identifier as Recognizer),
    (TokenKind::Operator, operator as Recognizer),
];

/// Pull-based tokenizer over a borrowed string.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    keywords: &'a [&'a str],
    ignore_whitespace: bool,
    done: bool,
}

impl<'a> Scanner<'a> {
    /// Create a scanner over `input` with no keywords.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            keywords: &[],
            ignore_whitespace: false,
            done: false,
        }
    }

    /// Identifiers matching one of `keywords` (case-insensitively) are
    /// reported as [`TokenKind::Keyword`].
    pub fn with_keywords(mut self, keywords: &'a [&'a str]) -> Self {
        self.keywords = keywords;
        self
    }

    /// Drop whitespace tokens instead of reporting them.
    pub fn ignore_whitespace(mut self, ignore: bool) -> Self {
        self.ignore_whitespace = ignore;
        self
    }

    /// Recognize the next token. Returns [`TokenKind::End`] once the input
    /// is exhausted, and keeps returning it.
    pub fn next_token(&mut self) -> Token<'a> {
        loop {
            let rest = &self.input[self.pos..];
            if rest.is_empty() {
                return Token {
                    kind: TokenKind::End,
                    text: "",
                    offset: self.pos,
                };
            }

            let (kind, len) = classify(rest);
            let token = Token {
                kind: self.reclassify(kind, &rest[..len]),
                text: &rest[..len],
                offset: self.pos,
            };
            self.pos += len;

            if token.kind == TokenKind::Whitespace && self.ignore_whitespace {
                continue;
            }
            return token;
        }
    }

    fn reclassify(&self, kind: TokenKind, text: &str) -> TokenKind {
        if kind == TokenKind::Ident && self.keywords.iter().any(|k| k.eq_ignore_ascii_case(text)) {
            TokenKind::Keyword
        } else {
            kind
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::End {
            self.done = true;
            return None;
        }
        Some(token)
    }
}

/// Find the kind and byte length of the token at the head of `input`.
fn classify(input: &str) -> (TokenKind, usize) {
    for (kind, recognize) in RULES {
        if let Ok((rest, _)) = recognize(input) {
            return (*kind, input.len() - rest.len());
        }
    }

    // Unterminated quoted forms swallow the rest of the input.
    match input.chars().next() {
        Some('\'' | '"' | '`' | '[') => (TokenKind::Illegal, input.len()),
        Some(c) => (TokenKind::Illegal, c.len_utf8()),
        None => (TokenKind::End, 0),
    }
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    multispace1(input)
}

/// `-- ...` up to, not including, the line break.
fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), take_till(|c| c == '\n')))(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    delimited_by(input, '\'', '\'')
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    delimited_by(input, '"', '"')
}

fn back_quoted(input: &str) -> IResult<&str, &str> {
    delimited_by(input, '`', '`')
}

fn bracketed(input: &str) -> IResult<&str, &str> {
    delimited_by(input, '[', ']')
}

/// Text between `open` and `close`, where a doubled `close` is an escaped
/// `close` rather than the end of the token.
fn delimited_by(input: &str, open: char, close: char) -> IResult<&str, &str> {
    let (mut rest, _) = char(open)(input)?;
    loop {
        let (after, _) = take_till(|c| c == close)(rest)?;
        let (after, _) = char(close)(after)?;
        match char::<_, nom::error::Error<&str>>(close)(after) {
            Ok((more, _)) => rest = more,
            Err(_) => {
                let len = input.len() - after.len();
                return Ok((after, &input[..len]));
            }
        }
    }
}

/// `12`, `12.`, `12.5` or `.5`.
fn number(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ))(input)
}

/// `?`, `?N` or `$N`.
fn bind_placeholder(input: &str) -> IResult<&str, &str> {
    alt((recognize(pair(one_of("?$"), digit1)), tag("?")))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("<="),
        tag(">="),
        tag("<>"),
        tag("!="),
        tag("||"),
        tag("::"),
        recognize(one_of("+-*/%=<>!(),.;{}:&|^~@#")),
    ))(input)
}

/// Strip the delimiters from a quoted literal or identifier and undo the
/// doubled-delimiter escapes. Unquoted text is returned unchanged.
pub fn unquote(text: &str) -> String {
    let close = match text.chars().next() {
        Some('\'') => '\'',
        Some('"') => '"',
        Some('`') => '`',
        Some('[') => ']',
        _ => return text.to_string(),
    };
    if text.len() < 2 || !text.ends_with(close) {
        return text.to_string();
    }

    let inner = &text[1..text.len() - close.len_utf8()];
    let doubled: String = [close, close].iter().collect();
    inner.replace(&doubled, &close.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        Scanner::new(input)
            .with_keywords(&["select", "from"])
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_select_template() {
        assert_eq!(
            kinds("select {} from t"),
            vec![
                (TokenKind::Keyword, "select"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Operator, "{"),
                (TokenKind::Operator, "}"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Keyword, "from"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Ident, "t"),
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let tokens = kinds("SELECT x FrOm y");
        assert_eq!(tokens[0], (TokenKind::Keyword, "SELECT"));
        assert_eq!(tokens[4], (TokenKind::Keyword, "FrOm"));
    }

    #[test]
    fn test_whitespace_run_is_one_token() {
        assert_eq!(
            kinds("a \t\n b"),
            vec![
                (TokenKind::Ident, "a"),
                (TokenKind::Whitespace, " \t\n "),
                (TokenKind::Ident, "b"),
            ]
        );
    }

    #[test]
    fn test_ignore_whitespace() {
        let tokens: Vec<_> = Scanner::new("pk ,  json")
            .ignore_whitespace(true)
            .map(|t| t.text)
            .collect();
        assert_eq!(tokens, vec!["pk", ",", "json"]);
    }

    #[test]
    fn test_string_literal_with_escape() {
        assert_eq!(
            kinds("'it''s' x"),
            vec![
                (TokenKind::Literal, "'it''s'"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Ident, "x"),
            ]
        );
    }

    #[test]
    fn test_delimited_identifiers() {
        assert_eq!(
            kinds(r#""a""b" `c``d` [e]]f]"#),
            vec![
                (TokenKind::QuotedIdent, r#""a""b""#),
                (TokenKind::Whitespace, " "),
                (TokenKind::QuotedIdent, "`c``d`"),
                (TokenKind::Whitespace, " "),
                (TokenKind::QuotedIdent, "[e]]f]"),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens: Vec<_> = Scanner::new("12 12. 12.5 .5")
            .ignore_whitespace(true)
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Literal, "12"),
                (TokenKind::Literal, "12."),
                (TokenKind::Literal, "12.5"),
                (TokenKind::Literal, ".5"),
            ]
        );
    }

    #[test]
    fn test_bind_placeholders() {
        let tokens: Vec<_> = Scanner::new("? ?2 $10")
            .ignore_whitespace(true)
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Placeholder, "?"),
                (TokenKind::Placeholder, "?2"),
                (TokenKind::Placeholder, "$10"),
            ]
        );
    }

    #[test]
    fn test_line_comment_stops_at_newline() {
        assert_eq!(
            kinds("x -- note\ny"),
            vec![
                (TokenKind::Ident, "x"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Comment, "-- note"),
                (TokenKind::Whitespace, "\n"),
                (TokenKind::Ident, "y"),
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens: Vec<_> = Scanner::new("a<=b<>c-d")
            .map(|t| t.text)
            .collect();
        assert_eq!(tokens, vec!["a", "<=", "b", "<>", "c", "-", "d"]);
    }

    #[test]
    fn test_unterminated_literal_is_illegal() {
        let mut scanner = Scanner::new("x = 'abc");
        let tokens: Vec<_> = scanner.by_ref().collect();
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Illegal);
        assert_eq!(last.text, "'abc");
        assert_eq!(last.offset, 4);
    }

    #[test]
    fn test_unknown_character_is_illegal() {
        let tokens: Vec<_> = Scanner::new("a \u{00a7} b").map(|t| (t.kind, t.text)).collect();
        assert_eq!(tokens[2], (TokenKind::Illegal, "\u{00a7}"));
        assert_eq!(tokens[4], (TokenKind::Ident, "b"));
    }

    #[test]
    fn test_end_is_sticky() {
        let mut scanner = Scanner::new("a");
        assert_eq!(scanner.next_token().kind, TokenKind::Ident);
        assert_eq!(scanner.next_token().kind, TokenKind::End);
        assert_eq!(scanner.next_token().kind, TokenKind::End);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote(r#""a""b""#), r#"a"b"#);
        assert_eq!(unquote("[e]]f]"), "e]f");
        assert_eq!(unquote("`id`"), "id");
        assert_eq!(unquote("plain"), "plain");
    }
}
