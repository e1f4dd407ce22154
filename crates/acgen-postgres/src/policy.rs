//! Policy statements and their SQL rendering.

use acgen_core::PolicyCommand;

/// Prefix shared by every generated policy name.
pub const POLICY_PREFIX: &str = "rls_";

/// One permissive policy on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub name: String,
    pub table: String,
    pub command: PolicyCommand,
    pub using: Option<String>,
    pub with_check: Option<String>,
}

impl PolicyStatement {
    pub fn new(name: impl Into<String>, table: impl Into<String>, command: PolicyCommand) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            command,
            using: None,
            with_check: None,
        }
    }

    pub fn using(mut self, expr: impl Into<String>) -> Self {
        self.using = Some(expr.into());
        self
    }

    pub fn with_check(mut self, expr: impl Into<String>) -> Self {
        self.with_check = Some(expr.into());
        self
    }

    /// `CREATE POLICY` statement for this policy.
    pub fn create_sql(&self) -> String {
        let mut sql = format!(
            "CREATE POLICY {} ON \"{}\" AS PERMISSIVE FOR {} TO PUBLIC",
            self.name, self.table, self.command
        );
        if let Some(using) = &self.using {
            sql.push_str(&format!("\nusing (\n{}\n)", using.trim()));
        }
        if let Some(check) = &self.with_check {
            sql.push_str(&format!("\nwith check (\n{}\n)", check.trim()));
        }
        sql.push(';');
        sql
    }

    pub fn drop_sql(&self) -> String {
        drop_policy_sql(&self.name, &self.table)
    }
}

pub fn drop_policy_sql(name: &str, table: &str) -> String {
    format!("DROP POLICY IF EXISTS {name} on \"{table}\";")
}

/// Policy name used before per-template names existed.
pub fn legacy_policy_name(table: &str) -> String {
    format!("{POLICY_PREFIX}{table}")
}

/// Statements keeping RLS on for `table`, emitted after its policies.
pub fn enable_rls_sql(table: &str) -> String {
    format!(
        "ALTER TABLE \"{table}\" ENABLE ROW LEVEL SECURITY;\nALTER TABLE \"{table}\" FORCE ROW LEVEL SECURITY;"
    )
}
