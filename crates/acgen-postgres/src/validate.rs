//! SQL validation.

use crate::error::PolicyError;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Checks hand-written policy clauses and generated statements with the Postgres dialect.
pub struct SqlValidator {
    dialect: PostgreSqlDialect,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlValidator {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Parse `sql` as a single boolean-valued expression.
    pub fn check_expression(&self, sql: &str) -> Result<(), String> {
        let mut parser = Parser::new(&self.dialect)
            .try_with_sql(sql)
            .map_err(|e| e.to_string())?;
        parser.parse_expr().map_err(|e| e.to_string())?;

        match parser.peek_token().token {
            Token::EOF => Ok(()),
            other => Err(format!("unexpected trailing input at {other}")),
        }
    }

    /// Parse a script of statements.
    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>, PolicyError> {
        Parser::parse_sql(&self.dialect, sql).map_err(|e| PolicyError::ParseError(e.to_string()))
    }
}
