//! A small CQL reader covering what is needed to build table schemas:
//! `CREATE TABLE`, `CREATE KEYSPACE` and `USE` statements, plus type
//! expressions. Everything else in a script is skipped.

use crate::error::SchemaError;
use crate::partitioner::Partitioner;
use crate::table::{ClusteringOrder, ColumnDef, ColumnKind, TableSchema};
use crate::types::CqlType;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Identifier or keyword. Unquoted identifiers are lowercased.
    Ident { text: String, quoted: bool },
    Str(String),
    Number(String),
    Sym(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>, SchemaError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = src[i + 2..]
                    .find("*/")
                    .ok_or_else(|| SchemaError::parse(start, "unterminated comment"))?;
                i += 2 + end + 2;
            }
            b'\'' => {
                let (text, next) = read_quoted(src, i, '\'')?;
                out.push(Token { tok: Tok::Str(text), offset: start });
                i = next;
            }
            b'"' => {
                let (text, next) = read_quoted(src, i, '"')?;
                out.push(Token {
                    tok: Tok::Ident { text, quoted: true },
                    offset: start,
                });
                i = next;
            }
            b'0'..=b'9' => {
                i = read_number(bytes, i);
                out.push(Token {
                    tok: Tok::Number(src[start..i].to_string()),
                    offset: start,
                });
            }
            b'-' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i = read_number(bytes, i + 1);
                out.push(Token {
                    tok: Tok::Number(src[start..i].to_string()),
                    offset: start,
                });
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                out.push(Token {
                    tok: Tok::Ident {
                        text: src[start..i].to_ascii_lowercase(),
                        quoted: false,
                    },
                    offset: start,
                });
            }
            c if c.is_ascii_punctuation() => {
                out.push(Token { tok: Tok::Sym(c as char), offset: start });
                i += 1;
            }
            _ => return Err(SchemaError::parse(start, format!("unexpected character {:?}", c as char))),
        }
    }
    Ok(out)
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn read_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
        i += 1;
    }
    i
}

/// Reads a quoted literal starting at `start`; a doubled quote is an escaped
/// quote. Returns the unescaped text and the offset past the closing quote.
fn read_quoted(src: &str, start: usize, quote: char) -> Result<(String, usize), SchemaError> {
    let mut text = String::new();
    let mut chars = src[start + 1..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            if matches!(chars.peek(), Some((_, n)) if *n == quote) {
                chars.next();
                text.push(quote);
                continue;
            }
            return Ok((text, start + 1 + i + 1));
        }
        text.push(c);
    }
    Err(SchemaError::parse(start, "unterminated quoted literal"))
}

/// Splits a CQL script into statements on `;`, ignoring semicolons inside
/// literals and comments. Blank statements are dropped.
pub fn split_statements(src: &str) -> Vec<&str> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == q {
                        if bytes.get(i + 1) == Some(&q) {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = src[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
            }
            b';' => {
                push_statement(&mut out, &src[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        push_statement(&mut out, &src[start..]);
    }
    out
}

fn push_statement<'a>(out: &mut Vec<&'a str>, stmt: &'a str) {
    let trimmed = stmt.trim();
    let meaningful = tokenize(trimmed).map(|t| !t.is_empty()).unwrap_or(true);
    if !trimmed.is_empty() && meaningful {
        out.push(trimmed);
    }
}

/// One statement of a schema script, as far as schema loading cares.
#[derive(Debug, Clone)]
pub enum Statement {
    Use(String),
    CreateKeyspace(String),
    CreateTable(TableSchema),
    /// Anything else (indexes, types, inserts). Skipped by the catalog.
    Other,
}

/// Parses one statement. `current_keyspace` qualifies unqualified table names.
pub fn parse_statement(stmt: &str, current_keyspace: Option<&str>) -> Result<Statement, SchemaError> {
    let tokens = tokenize(stmt)?;
    let mut p = Parser::new(&tokens, stmt.len());
    if p.eat_keyword("use") {
        let ks = p.identifier()?;
        p.eat_sym(';');
        p.expect_end()?;
        return Ok(Statement::Use(ks));
    }
    if !p.peek_keyword("create") {
        return Ok(Statement::Other);
    }
    match p.peek_keyword_at(1) {
        Some("keyspace") | Some("schema") => {
            p.pos += 2;
            p.if_not_exists()?;
            Ok(Statement::CreateKeyspace(p.identifier()?))
        }
        Some("table") | Some("columnfamily") => {
            p.create_table(current_keyspace).map(Statement::CreateTable)
        }
        _ => Ok(Statement::Other),
    }
}

/// Parses a single `CREATE TABLE` statement.
///
/// # Errors
///
/// [`SchemaError::Parse`] for anything that is not a well-formed `CREATE
/// TABLE`, including an unqualified table name when no default keyspace is
/// given. Invalid definitions are reported by [`TableSchema::new`].
pub fn parse_create_table(stmt: &str, default_keyspace: Option<&str>) -> Result<TableSchema, SchemaError> {
    let stmt = stmt.trim().trim_end_matches(';');
    match parse_statement(stmt, default_keyspace)? {
        Statement::CreateTable(t) => Ok(t),
        _ => Err(SchemaError::parse(0, "expected CREATE TABLE")),
    }
}

/// Parses a type expression such as `map<text, frozen<list<int>>>`.
pub fn parse_type(s: &str) -> Result<CqlType, SchemaError> {
    let tokens = tokenize(s)?;
    let mut p = Parser::new(&tokens, s.len());
    let ty = p.cql_type()?;
    p.expect_end()?;
    Ok(ty)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end_offset: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], end_offset: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end_offset,
        }
    }

    fn peek(&self) -> Option<&'a Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end_offset, |t| t.offset)
    }

    fn error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::parse(self.offset(), message)
    }

    fn next(&mut self) -> Option<&'a Tok> {
        let t = self.tokens.get(self.pos).map(|t| &t.tok);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident { text, quoted: false }) if text == kw)
    }

    fn peek_keyword_at(&self, ahead: usize) -> Option<&'a str> {
        match self.tokens.get(self.pos + ahead).map(|t| &t.tok) {
            Some(Tok::Ident { text, quoted: false }) => Some(text.as_str()),
            _ => None,
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), SchemaError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", kw.to_ascii_uppercase())))
        }
    }

    fn eat_sym(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Sym(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, c: char) -> Result<(), SchemaError> {
        if self.eat_sym(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn expect_end(&self) -> Result<(), SchemaError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    fn identifier(&mut self) -> Result<String, SchemaError> {
        match self.peek() {
            Some(Tok::Ident { text, .. }) => {
                self.pos += 1;
                Ok(text.clone())
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn if_not_exists(&mut self) -> Result<(), SchemaError> {
        if self.eat_keyword("if") {
            self.expect_keyword("not")?;
            self.expect_keyword("exists")?;
        }
        Ok(())
    }

    fn cql_type(&mut self) -> Result<CqlType, SchemaError> {
        let at = self.offset();
        let name = self.identifier()?;
        let ty = match name.as_str() {
            "list" | "set" | "frozen" => {
                self.expect_sym('<')?;
                let inner = Box::new(self.cql_type()?);
                self.expect_sym('>')?;
                match name.as_str() {
                    "list" => CqlType::List(inner),
                    "set" => CqlType::Set(inner),
                    _ => CqlType::Frozen(inner),
                }
            }
            "map" => {
                self.expect_sym('<')?;
                let k = self.cql_type()?;
                self.expect_sym(',')?;
                let v = self.cql_type()?;
                self.expect_sym('>')?;
                CqlType::Map(Box::new(k), Box::new(v))
            }
            "tuple" => {
                self.expect_sym('<')?;
                let mut items = vec![self.cql_type()?];
                while self.eat_sym(',') {
                    items.push(self.cql_type()?);
                }
                self.expect_sym('>')?;
                CqlType::Tuple(items)
            }
            other => CqlType::simple(other)
                .ok_or_else(|| SchemaError::parse(at, format!("unsupported type {}", other)))?,
        };
        Ok(ty)
    }

    fn create_table(&mut self, default_keyspace: Option<&str>) -> Result<TableSchema, SchemaError> {
        self.expect_keyword("create")?;
        if !self.eat_keyword("table") {
            self.expect_keyword("columnfamily")?;
        }
        self.if_not_exists()?;

        let name_at = self.offset();
        let first = self.identifier()?;
        let (keyspace, table) = if self.eat_sym('.') {
            (first, self.identifier()?)
        } else {
            let ks = default_keyspace
                .ok_or_else(|| SchemaError::parse(name_at, format!("table {} is not qualified with a keyspace", first)))?;
            (ks.to_string(), first)
        };

        let mut defs: Vec<(String, CqlType, bool)> = Vec::new();
        let mut partition_key: Vec<String> = Vec::new();
        let mut clustering: Vec<String> = Vec::new();

        self.expect_sym('(')?;
        loop {
            if self.peek_keyword("primary") && self.peek_keyword_at(1) == Some("key") {
                self.pos += 2;
                if !partition_key.is_empty() {
                    return Err(self.error("multiple PRIMARY KEY declarations"));
                }
                self.primary_key(&mut partition_key, &mut clustering)?;
            } else {
                let name = self.identifier()?;
                let ty = self.cql_type()?;
                let is_static = self.eat_keyword("static");
                if self.eat_keyword("primary") {
                    self.expect_keyword("key")?;
                    if !partition_key.is_empty() {
                        return Err(self.error("multiple PRIMARY KEY declarations"));
                    }
                    partition_key.push(name.clone());
                }
                defs.push((name, ty, is_static));
            }
            if self.eat_sym(')') {
                break;
            }
            self.expect_sym(',')?;
        }

        let mut orders: Vec<(String, ClusteringOrder)> = Vec::new();
        let mut default_ttl = None;
        if self.eat_keyword("with") {
            loop {
                self.table_option(&mut orders, &mut default_ttl)?;
                if !self.eat_keyword("and") {
                    break;
                }
            }
        }
        self.eat_sym(';');
        self.expect_end()?;

        let qualified = format!("{}.{}", keyspace, table);
        let mut columns = Vec::with_capacity(defs.len());
        for (name, cql_type, is_static) in defs {
            let kind = if let Some(p) = partition_key.iter().position(|k| *k == name) {
                ColumnKind::PartitionKey(p)
            } else if let Some(p) = clustering.iter().position(|k| *k == name) {
                ColumnKind::Clustering(p)
            } else if is_static {
                ColumnKind::Static
            } else {
                ColumnKind::Regular
            };
            let mut def = ColumnDef::new(name, cql_type, kind);
            if let Some((_, order)) = orders.iter().find(|(n, _)| *n == def.name) {
                def.order = *order;
            }
            columns.push(def);
        }
        for key in partition_key.iter().chain(clustering.iter()) {
            if !columns.iter().any(|c| c.name == *key) {
                return Err(SchemaError::invalid(&qualified, format!("unknown primary key column {}", key)));
            }
        }
        for (name, _) in &orders {
            if !clustering.contains(name) {
                return Err(SchemaError::invalid(
                    &qualified,
                    format!("CLUSTERING ORDER names non-clustering column {}", name),
                ));
            }
        }

        let mut schema = TableSchema::new(keyspace, table, columns, Partitioner::default())?;
        schema.default_ttl = default_ttl;
        Ok(schema)
    }

    /// After `PRIMARY KEY`: `(pk, c1, c2)` or `((pk1, pk2), c1)`.
    fn primary_key(&mut self, partition_key: &mut Vec<String>, clustering: &mut Vec<String>) -> Result<(), SchemaError> {
        self.expect_sym('(')?;
        if self.eat_sym('(') {
            partition_key.push(self.identifier()?);
            while self.eat_sym(',') {
                partition_key.push(self.identifier()?);
            }
            self.expect_sym(')')?;
        } else {
            partition_key.push(self.identifier()?);
        }
        while self.eat_sym(',') {
            clustering.push(self.identifier()?);
        }
        self.expect_sym(')')
    }

    fn table_option(
        &mut self,
        orders: &mut Vec<(String, ClusteringOrder)>,
        default_ttl: &mut Option<i32>,
    ) -> Result<(), SchemaError> {
        if self.eat_keyword("clustering") {
            self.expect_keyword("order")?;
            self.expect_keyword("by")?;
            self.expect_sym('(')?;
            loop {
                let column = self.identifier()?;
                let order = if self.eat_keyword("desc") {
                    ClusteringOrder::Desc
                } else {
                    self.eat_keyword("asc");
                    ClusteringOrder::Asc
                };
                orders.push((column, order));
                if self.eat_sym(')') {
                    return Ok(());
                }
                self.expect_sym(',')?;
            }
        }
        if self.eat_keyword("compact") {
            return self.expect_keyword("storage");
        }

        let name = self.identifier()?;
        self.expect_sym('=')?;
        let at = self.offset();
        match self.next() {
            Some(Tok::Number(n)) if name == "default_time_to_live" => {
                let ttl: i32 = n
                    .parse()
                    .map_err(|_| SchemaError::parse(at, format!("invalid default_time_to_live {}", n)))?;
                *default_ttl = (ttl > 0).then_some(ttl);
                Ok(())
            }
            Some(Tok::Sym('{')) => self.skip_balanced('{', '}'),
            Some(Tok::Sym('[')) => self.skip_balanced('[', ']'),
            Some(Tok::Str(_)) | Some(Tok::Number(_)) | Some(Tok::Ident { .. }) => Ok(()),
            _ => Err(SchemaError::parse(at, format!("expected a value for option {}", name))),
        }
    }

    /// Skips to the closer matching an already consumed opener.
    fn skip_balanced(&mut self, open: char, close: char) -> Result<(), SchemaError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next() {
                Some(Tok::Sym(c)) if *c == open => depth += 1,
                Some(Tok::Sym(c)) if *c == close => depth -= 1,
                Some(_) => {}
                None => return Err(self.error(format!("unbalanced '{}'", open))),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESERIES: &str = "CREATE TABLE my_keyspace.timeseries (
        id uuid,
        ts timestamp,
        owner text STATIC,
        value int,
        tags set<text>,
        PRIMARY KEY ((id), ts)
    ) WITH CLUSTERING ORDER BY (ts DESC)
      AND compaction = {'class': 'SizeTieredCompactionStrategy', 'min_threshold': '4'}
      AND comment = 'it''s a test'
      AND default_time_to_live = 3600;";

    #[test]
    fn parses_full_create_table() {
        let t = parse_create_table(TIMESERIES, None).unwrap();
        assert_eq!(t.keyspace, "my_keyspace");
        assert_eq!(t.name, "timeseries");
        assert_eq!(t.default_ttl, Some(3600));
        assert_eq!(t.partition_key_columns()[0].name, "id");
        let ts = t.clustering_columns()[0];
        assert_eq!(ts.name, "ts");
        assert_eq!(ts.order, ClusteringOrder::Desc);
        assert_eq!(t.column("owner").unwrap().kind, ColumnKind::Static);
        assert!(t.is_complex("tags"));
    }

    #[test]
    fn inline_primary_key_and_default_keyspace() {
        let t = parse_create_table("create table IF NOT EXISTS users (name text PRIMARY KEY, age int)", Some("ks")).unwrap();
        assert_eq!(t.qualified_name(), "ks.users");
        assert_eq!(t.column("name").unwrap().kind, ColumnKind::PartitionKey(0));
        assert_eq!(t.clustering_size(), 0);
    }

    #[test]
    fn composite_partition_key() {
        let t = parse_create_table(
            "CREATE COLUMNFAMILY ks.events (a int, b text, c bigint, v blob, PRIMARY KEY ((a, b), c)) WITH COMPACT STORAGE",
            None,
        )
        .unwrap();
        assert_eq!(t.column("b").unwrap().kind, ColumnKind::PartitionKey(1));
        assert_eq!(t.column("c").unwrap().kind, ColumnKind::Clustering(0));
    }

    #[test]
    fn quoted_identifiers_keep_case() {
        let t = parse_create_table("CREATE TABLE ks.\"Mixed\" (\"Key\" int PRIMARY KEY)", None).unwrap();
        assert_eq!(t.name, "Mixed");
        assert!(t.column("Key").is_some());
    }

    #[test]
    fn unqualified_without_default_is_an_error() {
        let err = parse_create_table("CREATE TABLE t (k int PRIMARY KEY)", None).unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }

    #[test]
    fn unknown_primary_key_column_is_invalid() {
        let err = parse_create_table("CREATE TABLE ks.t (k int, PRIMARY KEY (k, missing))", None).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid { .. }));
    }

    #[test]
    fn parse_errors_carry_offsets() {
        let err = parse_create_table("CREATE TABLE ks.t (k int PRIMARY KEY", None).unwrap_err();
        match err {
            SchemaError::Parse { offset, .. } => assert_eq!(offset, 36),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn splits_scripts() {
        let script = "USE ks; -- comment; with semicolon\nCREATE TABLE t (k text PRIMARY KEY, v text) WITH comment = 'a;b';\n/* ; */ ;";
        let stmts = split_statements(script);
        assert_eq!(stmts.len(), 2);
        assert!(matches!(parse_statement(stmts[0], None).unwrap(), Statement::Use(ks) if ks == "ks"));
        match parse_statement(stmts[1], Some("ks")).unwrap() {
            Statement::CreateTable(t) => assert_eq!(t.qualified_name(), "ks.t"),
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn other_statements_are_skipped() {
        assert!(matches!(
            parse_statement("CREATE INDEX ON ks.t (v)", None).unwrap(),
            Statement::Other
        ));
        assert!(matches!(
            parse_statement("CREATE KEYSPACE IF NOT EXISTS ks WITH replication = {'class': 'SimpleStrategy'}", None).unwrap(),
            Statement::CreateKeyspace(ks) if ks == "ks"
        ));
    }

    #[test]
    fn type_expressions() {
        assert_eq!(parse_type("int").unwrap(), CqlType::Int);
        assert_eq!(
            parse_type("tuple<int, text>").unwrap(),
            CqlType::Tuple(vec![CqlType::Int, CqlType::Text])
        );
        assert!(parse_type("my_udt").is_err());
        assert!(parse_type("list<int").is_err());
    }
}
