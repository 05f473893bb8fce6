//! SQL front end.
//!
//! Parsing SQL text is delegated to the `sqlparser` crate; this module
//! wraps it with the engine's error type and restricts input to a single
//! query statement. The resulting [`Statement`] AST is the input of the
//! logical plan builder.
//!
//! # Usage
//!
//! ```
//! use tessera_sql::parser::Parser;
//!
//! let statement = Parser::parse_query("SELECT id FROM users WHERE age > 18").unwrap();
//! ```

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use thiserror::Error;

pub use sqlparser::ast::{Expr as SqlExpr, Statement};

/// Errors that can occur during SQL parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Error from the underlying sqlparser crate.
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    /// Unsupported statement kind.
    #[error("Unsupported SQL feature: {0}")]
    Unsupported(String),

    /// Empty query.
    #[error("Empty query")]
    EmptyQuery,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(err.to_string())
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// SQL parser.
///
/// Uses the PostgreSQL dialect.
pub struct Parser;

impl Parser {
    /// Parses a SQL string into a list of statements.
    pub fn parse(sql: &str) -> ParseResult<Vec<Statement>> {
        if sql.trim().is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        let dialect = PostgreSqlDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;
        if statements.is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        Ok(statements)
    }

    /// Parses exactly one query statement.
    pub fn parse_query(sql: &str) -> ParseResult<Statement> {
        let mut statements = Self::parse(sql)?;
        if statements.len() != 1 {
            return Err(ParseError::Syntax(format!(
                "Expected 1 statement, got {}",
                statements.len()
            )));
        }
        let statement = statements.remove(0);
        match statement {
            Statement::Query(_) => Ok(statement),
            other => Err(ParseError::Unsupported(format!(
                "only queries can be executed, got: {}",
                other
            ))),
        }
    }

    /// Parses a standalone SQL expression.
    pub fn parse_expr(sql: &str) -> ParseResult<SqlExpr> {
        let dialect = PostgreSqlDialect {};
        let mut parser = SqlParser::new(&dialect).try_with_sql(sql)?;
        Ok(parser.parse_expr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let statement = Parser::parse_query("SELECT a FROM t WHERE a > 1").unwrap();
        assert!(matches!(statement, Statement::Query(_)));
    }

    #[test]
    fn test_empty_query() {
        assert!(matches!(Parser::parse("   "), Err(ParseError::EmptyQuery)));
    }

    #[test]
    fn test_rejects_non_query() {
        let err = Parser::parse_query("DROP TABLE t").unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(Parser::parse_query("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            Parser::parse_query("SELEC a FROM t"),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_parse_expr() {
        let expr = Parser::parse_expr("a + 1").unwrap();
        assert!(matches!(expr, SqlExpr::BinaryOp { .. }));
    }
}
