// crates/studybank-core/src/statement.rs
// ============================================================================
// Module: Statement Classification
// Description: Lexical classifier for SQL statement text.
// Purpose: Decide cacheability and drive the simulated backend.
// Dependencies: crate::result
// ============================================================================

//! ## Overview
//! Statements are classified once into a tagged [`StatementKind`]. The
//! classifier is purely lexical: it tokenizes the text, looks at the leading
//! verb, and pulls table names from the `FROM` / `INTO` / `UPDATE` / `TABLE`
//! keywords. It is not a parser. Anything it cannot recognize becomes
//! [`StatementKind::Unknown`], which the simulated backend treats as a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::result::SqlValue;

// ============================================================================
// SECTION: Read-Only Detection
// ============================================================================

/// Leading verbs that never mutate state.
const READ_VERBS: [&str; 4] = ["SELECT", "WITH", "EXPLAIN", "VALUES"];

/// Keywords that turn a `WITH` statement into a write.
const WRITE_KEYWORDS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Returns true when the statement is read-only by lexical inspection.
///
/// The trimmed, upper-cased statement must begin with a read verb. A `WITH`
/// prefix only counts when no write keyword follows it.
#[must_use]
pub fn is_read_only(statement: &str) -> bool {
    let tokens = tokenize(statement);
    let Some(verb) = tokens.first().and_then(Token::keyword) else {
        return false;
    };
    if !READ_VERBS.contains(&verb) {
        return false;
    }
    if verb == "WITH" {
        return !tokens
            .iter()
            .filter_map(Token::keyword)
            .any(|keyword| WRITE_KEYWORDS.contains(&keyword));
    }
    true
}

// ============================================================================
// SECTION: Statement Kinds
// ============================================================================

/// Shape of a recognized `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    /// Lower-cased table named after `FROM`, when any.
    pub table: Option<String>,
    /// Output column for a `COUNT(*)` aggregate, when the select list is one.
    pub count_alias: Option<String>,
}

/// Value slot in an `INSERT ... VALUES (...)` tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    /// Positional parameter placeholder.
    Placeholder,
    /// Literal written into the statement.
    Literal(SqlValue),
    /// Expression such as `lower(?)`; consumes its placeholders and binds
    /// the first one.
    Expression {
        /// Placeholders inside the expression.
        placeholders: usize,
    },
}

impl InsertValue {
    /// Number of positional placeholders the slot consumes.
    #[must_use]
    pub const fn placeholder_count(&self) -> usize {
        match self {
            Self::Placeholder => 1,
            Self::Literal(_) => 0,
            Self::Expression {
                placeholders,
            } => *placeholders,
        }
    }
}

/// Shape of a recognized `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Lower-cased target table.
    pub table: String,
    /// Column list as written (may be empty).
    pub columns: Vec<String>,
    /// One tuple per `VALUES` row; empty for `DEFAULT VALUES`.
    pub rows: Vec<Vec<InsertValue>>,
    /// Placeholders after the last tuple, such as in an upsert clause.
    pub trailing_placeholders: usize,
}

impl InsertStatement {
    /// Number of positional placeholders in the whole statement.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .map(InsertValue::placeholder_count)
            .sum::<usize>()
            .saturating_add(self.trailing_placeholders)
    }
}

/// Tagged classification of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Read statement.
    Select(SelectStatement),
    /// Row insert.
    Insert(InsertStatement),
    /// Row update on the named table.
    Update {
        /// Lower-cased table name.
        table: String,
    },
    /// Row delete on the named table.
    Delete {
        /// Lower-cased table name.
        table: String,
    },
    /// Engine configuration (`PRAGMA`).
    Pragma {
        /// True when the pragma assigns a value.
        assignment: bool,
    },
    /// `CREATE TABLE`.
    CreateTable {
        /// Lower-cased table name.
        table: String,
    },
    /// `DROP TABLE`.
    DropTable {
        /// Lower-cased table name.
        table: String,
    },
    /// Other schema definition (indexes, views, triggers, `ALTER`).
    Ddl,
    /// Transaction control (`BEGIN`, `COMMIT`, `ROLLBACK`, savepoints).
    Transaction,
    /// Maintenance statements (`ANALYZE`, `VACUUM`, `REINDEX`).
    Maintenance,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl StatementKind {
    /// Classifies statement text.
    #[must_use]
    pub fn classify(statement: &str) -> Self {
        let tokens = tokenize(statement);
        let Some(verb) = tokens.first().and_then(Token::keyword) else {
            return Self::Unknown;
        };
        match verb {
            "SELECT" | "WITH" | "VALUES" | "EXPLAIN" if is_read_only(statement) => {
                Self::Select(classify_select(&tokens))
            }
            "INSERT" | "REPLACE" => classify_insert(&tokens).map_or(Self::Unknown, Self::Insert),
            "UPDATE" => table_after(&tokens, "UPDATE")
                .map_or(Self::Unknown, |table| Self::Update {
                    table,
                }),
            "DELETE" => table_after(&tokens, "FROM")
                .map_or(Self::Unknown, |table| Self::Delete {
                    table,
                }),
            "PRAGMA" => Self::Pragma {
                assignment: tokens.iter().any(|token| token.is_symbol('=')),
            },
            "CREATE" => classify_create(&tokens),
            "DROP" => {
                if tokens.get(1).and_then(Token::keyword) == Some("TABLE") {
                    table_after(&tokens, "TABLE").map_or(Self::Ddl, |table| Self::DropTable {
                        table,
                    })
                } else {
                    Self::Ddl
                }
            }
            "ALTER" => Self::Ddl,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => Self::Transaction,
            "ANALYZE" | "VACUUM" | "REINDEX" => Self::Maintenance,
            _ => Self::Unknown,
        }
    }

    /// Returns true for read statements.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Select(_))
    }

    /// Returns the table the statement targets, when known.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Select(select) => select.table.as_deref(),
            Self::Insert(insert) => Some(&insert.table),
            Self::Update {
                table,
            }
            | Self::Delete {
                table,
            }
            | Self::CreateTable {
                table,
            }
            | Self::DropTable {
                table,
            } => Some(table),
            Self::Pragma {
                ..
            }
            | Self::Ddl
            | Self::Transaction
            | Self::Maintenance
            | Self::Unknown => None,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update {
                ..
            } => "update",
            Self::Delete {
                ..
            } => "delete",
            Self::Pragma {
                ..
            } => "pragma",
            Self::CreateTable {
                ..
            } => "create_table",
            Self::DropTable {
                ..
            } => "drop_table",
            Self::Ddl => "ddl",
            Self::Transaction => "transaction",
            Self::Maintenance => "maintenance",
            Self::Unknown => "unknown",
        }
    }
}

// ============================================================================
// SECTION: Classifier Helpers
// ============================================================================

/// Builds the select shape from tokens.
fn classify_select(tokens: &[Token]) -> SelectStatement {
    SelectStatement {
        table: table_after(tokens, "FROM"),
        count_alias: count_alias(tokens),
    }
}

/// Detects `SELECT COUNT(*) [AS alias]` and returns the output column name.
fn count_alias(tokens: &[Token]) -> Option<String> {
    if tokens.first().and_then(Token::keyword) != Some("SELECT") {
        return None;
    }
    let is_count = tokens.get(1).and_then(Token::keyword) == Some("COUNT")
        && tokens.get(2).is_some_and(|token| token.is_symbol('('))
        && tokens.get(3).is_some_and(|token| token.is_symbol('*'))
        && tokens.get(4).is_some_and(|token| token.is_symbol(')'));
    if !is_count {
        return None;
    }
    let alias = match tokens.get(5) {
        Some(token) if token.keyword() == Some("AS") => tokens.get(6).and_then(Token::identifier),
        Some(token) if token.keyword() != Some("FROM") => token.identifier(),
        _ => None,
    };
    Some(alias.map_or_else(|| "count".to_string(), str::to_string))
}

/// Parses the target, column list, and values tuples of an insert.
fn classify_insert(tokens: &[Token]) -> Option<InsertStatement> {
    let table = table_after(tokens, "INTO")?;
    let into_index = tokens.iter().position(|token| token.keyword() == Some("INTO"))?;
    let mut cursor = into_index + 2;
    if tokens.get(cursor).is_some_and(|token| token.is_symbol('.')) {
        cursor += 2;
    }
    let mut columns = Vec::new();
    if tokens.get(cursor).is_some_and(|token| token.is_symbol('(')) {
        cursor += 1;
        while let Some(token) = tokens.get(cursor) {
            cursor += 1;
            if token.is_symbol(')') {
                break;
            }
            if let Some(name) = token.identifier() {
                columns.push(name.to_string());
            }
        }
    }
    let values_index = tokens.iter().position(|token| token.keyword() == Some("VALUES"))?;
    let mut rows = Vec::new();
    cursor = values_index + 1;
    while tokens.get(cursor).is_some_and(|token| token.is_symbol('(')) {
        let (row, next) = read_tuple(tokens, cursor + 1);
        rows.push(row);
        cursor = next;
        if !tokens.get(cursor).is_some_and(|token| token.is_symbol(',')) {
            break;
        }
        cursor += 1;
    }
    let trailing_placeholders =
        tokens.iter().skip(cursor).filter(|token| matches!(token, Token::Param)).count();
    Some(InsertStatement {
        table,
        columns,
        rows,
        trailing_placeholders,
    })
}

/// Reads one values tuple starting after its opening parenthesis.
///
/// Returns the slots and the index just past the closing parenthesis.
fn read_tuple(tokens: &[Token], start: usize) -> (Vec<InsertValue>, usize) {
    let mut values = Vec::new();
    let mut slot: Vec<&Token> = Vec::new();
    let mut depth = 0usize;
    let mut cursor = start;
    while let Some(token) = tokens.get(cursor) {
        cursor += 1;
        if depth == 0 && (token.is_symbol(',') || token.is_symbol(')')) {
            if !slot.is_empty() {
                values.push(slot_value(&slot));
                slot.clear();
            }
            if token.is_symbol(')') {
                return (values, cursor);
            }
            continue;
        }
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        }
        slot.push(token);
    }
    if !slot.is_empty() {
        values.push(slot_value(&slot));
    }
    (values, cursor)
}

/// Converts the tokens of one slot into an insert value.
fn slot_value(slot: &[&Token]) -> InsertValue {
    match slot {
        [token] => token.insert_value(),
        _ => InsertValue::Expression {
            placeholders: slot.iter().filter(|token| matches!(token, Token::Param)).count(),
        },
    }
}

/// Classifies `CREATE` statements.
fn classify_create(tokens: &[Token]) -> StatementKind {
    let is_table = tokens
        .iter()
        .skip(1)
        .take(3)
        .filter_map(Token::keyword)
        .any(|keyword| keyword == "TABLE");
    if !is_table {
        return StatementKind::Ddl;
    }
    table_after(tokens, "TABLE").map_or(StatementKind::Ddl, |table| StatementKind::CreateTable {
        table,
    })
}

/// Returns the lower-cased identifier following `keyword`.
///
/// Skips `IF [NOT] EXISTS` and `OR <conflict>` and resolves
/// `schema.table` to the table part.
fn table_after(tokens: &[Token], keyword: &str) -> Option<String> {
    let index = tokens.iter().position(|token| token.keyword() == Some(keyword))?;
    let mut rest = tokens.iter().skip(index + 1).peekable();
    while let Some(token) = rest.peek() {
        match token.keyword() {
            Some("IF" | "NOT" | "EXISTS" | "ONLY") => {
                rest.next();
            }
            _ => break,
        }
    }
    let first = rest.next()?.identifier()?;
    if rest.peek().is_some_and(|token| token.is_symbol('.')) {
        rest.next();
        return rest.next().and_then(Token::identifier).map(str::to_ascii_lowercase);
    }
    Some(first.to_ascii_lowercase())
}

// ============================================================================
// SECTION: Tokenizer
// ============================================================================

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare word; `upper` is the normalized keyword form.
    Word {
        /// Text as written.
        raw: String,
        /// Upper-cased text.
        upper: String,
    },
    /// Quoted identifier (`"x"`, `` `x` ``, `[x]`).
    Quoted(String),
    /// String literal.
    Text(String),
    /// Numeric literal.
    Number(String),
    /// Parameter placeholder (`?`, `?1`, `:name`, `@name`, `$name`).
    Param,
    /// Any other single character.
    Symbol(char),
}

impl Token {
    /// Returns the keyword form of a bare word.
    fn keyword(&self) -> Option<&str> {
        match self {
            Self::Word {
                upper, ..
            } => Some(upper),
            _ => None,
        }
    }

    /// Returns identifier text for bare words and quoted identifiers.
    fn identifier(&self) -> Option<&str> {
        match self {
            Self::Word {
                raw, ..
            } => Some(raw),
            Self::Quoted(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true for the given symbol.
    fn is_symbol(&self, symbol: char) -> bool {
        matches!(self, Self::Symbol(value) if *value == symbol)
    }

    /// Converts a values-list token into an insert slot.
    fn insert_value(&self) -> InsertValue {
        match self {
            Self::Param => InsertValue::Placeholder,
            Self::Text(text) => InsertValue::Literal(SqlValue::Text(text.clone())),
            Self::Number(number) => InsertValue::Literal(parse_number(number)),
            Self::Word {
                upper, ..
            } => match upper.as_str() {
                "TRUE" => InsertValue::Literal(SqlValue::Integer(1)),
                "FALSE" => InsertValue::Literal(SqlValue::Integer(0)),
                _ => InsertValue::Literal(SqlValue::Null),
            },
            Self::Quoted(_) | Self::Symbol(_) => InsertValue::Literal(SqlValue::Null),
        }
    }
}

/// Parses a numeric literal into an integer or real value.
fn parse_number(number: &str) -> SqlValue {
    number.parse::<i64>().map_or_else(
        |_| number.parse::<f64>().map_or(SqlValue::Null, SqlValue::Real),
        SqlValue::Integer,
    )
}

/// Splits statement text into tokens, dropping whitespace and comments.
fn tokenize(statement: &str) -> Vec<Token> {
    let chars: Vec<char> = statement.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let ch = chars[index];
        if ch.is_whitespace() {
            index += 1;
        } else if ch == '-' && chars.get(index + 1) == Some(&'-') {
            while index < chars.len() && chars[index] != '\n' {
                index += 1;
            }
        } else if ch == '/' && chars.get(index + 1) == Some(&'*') {
            index += 2;
            while index < chars.len() && !(chars[index] == '*' && chars.get(index + 1) == Some(&'/'))
            {
                index += 1;
            }
            index += 2;
        } else if ch == '\'' {
            let (text, next) = read_quoted(&chars, index, '\'');
            tokens.push(Token::Text(text));
            index = next;
        } else if ch == '"' || ch == '`' {
            let (text, next) = read_quoted(&chars, index, ch);
            tokens.push(Token::Quoted(text));
            index = next;
        } else if ch == '[' {
            let (text, next) = read_quoted(&chars, index, ']');
            tokens.push(Token::Quoted(text));
            index = next;
        } else if ch == '?' || ((ch == ':' || ch == '@' || ch == '$') && next_is_word(&chars, index))
        {
            index += 1;
            while index < chars.len() && is_word_char(chars[index]) {
                index += 1;
            }
            tokens.push(Token::Param);
        } else if ch.is_ascii_digit()
            || (ch == '-' && chars.get(index + 1).is_some_and(char::is_ascii_digit))
        {
            let start = index;
            index += 1;
            while index < chars.len() && (chars[index].is_ascii_alphanumeric() || chars[index] == '.')
            {
                index += 1;
            }
            tokens.push(Token::Number(chars[start .. index].iter().collect()));
        } else if is_word_char(ch) {
            let start = index;
            while index < chars.len() && is_word_char(chars[index]) {
                index += 1;
            }
            let raw: String = chars[start .. index].iter().collect();
            let upper = raw.to_ascii_uppercase();
            tokens.push(Token::Word {
                raw,
                upper,
            });
        } else {
            tokens.push(Token::Symbol(ch));
            index += 1;
        }
    }
    tokens
}

/// Reads a quoted run starting at `start`, handling doubled closing quotes.
fn read_quoted(chars: &[char], start: usize, close: char) -> (String, usize) {
    let mut text = String::new();
    let mut index = start + 1;
    while index < chars.len() {
        if chars[index] == close {
            if chars.get(index + 1) == Some(&close) && close != ']' {
                text.push(close);
                index += 2;
                continue;
            }
            return (text, index + 1);
        }
        text.push(chars[index]);
        index += 1;
    }
    (text, index)
}

/// Returns true when the character after `index` starts a word.
fn next_is_word(chars: &[char], index: usize) -> bool {
    chars.get(index + 1).is_some_and(|ch| is_word_char(*ch))
}

/// Returns true for identifier characters.
fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::InsertValue;
    use super::StatementKind;
    use super::is_read_only;
    use crate::result::SqlValue;

    #[test]
    fn read_only_detection_is_case_and_whitespace_insensitive() {
        assert!(is_read_only("  select * from questions"));
        assert!(is_read_only("\n\tWITH recent AS (SELECT 1) SELECT * FROM recent"));
        assert!(!is_read_only("INSERT INTO questions (id) VALUES (?)"));
        assert!(!is_read_only("WITH x AS (SELECT 1) DELETE FROM questions"));
        assert!(!is_read_only(""));
    }

    #[test]
    fn classifies_count_with_alias() {
        let kind = StatementKind::classify("SELECT COUNT(*) AS count FROM questions");
        let StatementKind::Select(select) = kind else {
            unreachable!("expected select");
        };
        assert_eq!(select.table.as_deref(), Some("questions"));
        assert_eq!(select.count_alias.as_deref(), Some("count"));
    }

    #[test]
    fn count_without_alias_defaults_to_count() {
        let kind = StatementKind::classify("select count(*) from Answers where ok = 1");
        let StatementKind::Select(select) = kind else {
            unreachable!("expected select");
        };
        assert_eq!(select.table.as_deref(), Some("answers"));
        assert_eq!(select.count_alias.as_deref(), Some("count"));
    }

    #[test]
    fn classifies_insert_columns_and_values() {
        let kind = StatementKind::classify(
            "INSERT OR REPLACE INTO main.progress (question_id, box, note) VALUES (?, 2, 'it''s')",
        );
        let StatementKind::Insert(insert) = kind else {
            unreachable!("expected insert");
        };
        assert_eq!(insert.table, "progress");
        assert_eq!(insert.columns, vec!["question_id", "box", "note"]);
        assert_eq!(
            insert.rows,
            vec![vec![
                InsertValue::Placeholder,
                InsertValue::Literal(SqlValue::Integer(2)),
                InsertValue::Literal(SqlValue::Text("it's".to_string())),
            ]]
        );
        assert_eq!(insert.placeholder_count(), 1);
    }

    #[test]
    fn insert_expressions_and_extra_tuples_count_their_placeholders() {
        let kind = StatementKind::classify(
            "INSERT INTO answers (id, note) VALUES (?, lower(?)), ('A2', coalesce(?, ?))",
        );
        let StatementKind::Insert(insert) = kind else {
            unreachable!("expected insert");
        };
        assert_eq!(
            insert.rows,
            vec![
                vec![
                    InsertValue::Placeholder,
                    InsertValue::Expression {
                        placeholders: 1
                    },
                ],
                vec![
                    InsertValue::Literal(SqlValue::Text("A2".to_string())),
                    InsertValue::Expression {
                        placeholders: 2
                    },
                ],
            ]
        );
        assert_eq!(insert.placeholder_count(), 4);
    }

    #[test]
    fn upsert_clause_placeholders_are_trailing() {
        let kind = StatementKind::classify(
            "INSERT INTO progress (id, box) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET box = ?",
        );
        let StatementKind::Insert(insert) = kind else {
            unreachable!("expected insert");
        };
        assert_eq!(insert.rows.len(), 1);
        assert_eq!(insert.trailing_placeholders, 1);
        assert_eq!(insert.placeholder_count(), 3);
    }

    #[test]
    fn classifies_writes_and_schema_statements() {
        assert_eq!(
            StatementKind::classify("UPDATE questions SET seen = 1"),
            StatementKind::Update {
                table: "questions".to_string()
            }
        );
        assert_eq!(
            StatementKind::classify("DELETE FROM answers WHERE id = ?"),
            StatementKind::Delete {
                table: "answers".to_string()
            }
        );
        assert_eq!(
            StatementKind::classify("CREATE TABLE IF NOT EXISTS \"Exams\" (id INTEGER)"),
            StatementKind::CreateTable {
                table: "exams".to_string()
            }
        );
        assert_eq!(
            StatementKind::classify("CREATE INDEX idx ON exams(id)"),
            StatementKind::Ddl
        );
        assert_eq!(
            StatementKind::classify("PRAGMA foreign_keys = ON"),
            StatementKind::Pragma {
                assignment: true
            }
        );
        assert_eq!(StatementKind::classify("BEGIN IMMEDIATE"), StatementKind::Transaction);
        assert_eq!(StatementKind::classify("ANALYZE"), StatementKind::Maintenance);
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        assert_eq!(StatementKind::classify("ATTACH 'x' AS y"), StatementKind::Unknown);
        assert_eq!(StatementKind::classify("-- only a comment"), StatementKind::Unknown);
        assert_eq!(StatementKind::classify("UPDATE"), StatementKind::Unknown);
    }
}
