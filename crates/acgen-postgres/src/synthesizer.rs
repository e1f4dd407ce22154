//! Postgres policy synthesis.
//!
//! Each template version maps to a fixed policy shape:
//!
//! - `1`: one `ALL` policy, read permission in `using`, write permission in `with check`
//! - `1.1`: one policy per listed command; inserts are unconditionally allowed
//! - `3`: one `ALL` policy checking the permission is held anywhere
//! - `4`: one `ALL` policy comparing the owner column to the current user

use acgen_core::{
    CustomPostgresPolicy, GRANTED_TABLE, Operation, PolicyCommand, PostgresConfig,
    TemplateContext, TemplateVersion,
};

use crate::error::PolicyError;
use crate::policy::{
    POLICY_PREFIX, PolicyStatement, drop_policy_sql, enable_rls_sql, legacy_policy_name,
};
use crate::validate::SqlValidator;

const INDENT: &str = "    ";
const ALLOW_ALL: &str = "1 = 1";

/// Alias of the access-path table inside generated subselects.
const ACCESS_PATH_ALIAS: &str = "usp";

/// Policies generated for one template of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySynthesis {
    pub table: String,
    pub policies: Vec<PolicyStatement>,
}

impl PolicySynthesis {
    pub fn names(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.name.clone()).collect()
    }

    /// Migration text: drop of the legacy policy, then drop and create for every policy.
    pub fn sql(&self) -> String {
        let legacy = legacy_policy_name(&self.table);
        let mut parts = Vec::new();
        if !self.policies.iter().any(|p| p.name == legacy) {
            parts.push(drop_policy_sql(&legacy, &self.table));
        }
        for policy in &self.policies {
            parts.push(format!("{}\n{}", policy.drop_sql(), policy.create_sql()));
        }
        if !self.policies.is_empty() {
            parts.push(enable_rls_sql(&self.table));
        }
        let mut sql = parts.join("\n\n");
        sql.push('\n');
        sql
    }
}

/// Builds the RLS policies of a template.
pub struct PolicySynthesizer {
    user_id_setting: String,
    validator: SqlValidator,
}

impl PolicySynthesizer {
    pub fn new(config: &PostgresConfig) -> Self {
        Self {
            user_id_setting: config.user_id_setting.clone(),
            validator: SqlValidator::new(),
        }
    }

    pub fn synthesize(&self, ctx: &TemplateContext<'_>) -> Result<PolicySynthesis, PolicyError> {
        let template = ctx.template;
        let policies = if template.use_custom_policy && !template.postgres_policies.is_empty() {
            template
                .postgres_policies
                .iter()
                .map(|custom| self.custom_policy(ctx.table, custom))
                .collect::<Result<Vec<_>, _>>()?
        } else if template.permissions.postgres.is_empty() {
            Vec::new()
        } else {
            self.template_policies(ctx)
        };

        tracing::debug!(
            table = ctx.table,
            template = %ctx.version(),
            policies = policies.len(),
            "synthesized postgres policies"
        );
        Ok(PolicySynthesis {
            table: ctx.table.to_string(),
            policies,
        })
    }

    fn template_policies(&self, ctx: &TemplateContext<'_>) -> Vec<PolicyStatement> {
        let table = ctx.table;
        match ctx.version() {
            TemplateVersion::Location => {
                vec![
                    PolicyStatement::new(format!("{POLICY_PREFIX}{table}_location"), table, PolicyCommand::All)
                        .using(self.location_check(ctx, &ctx.read_permission()))
                        .with_check(self.location_check(ctx, &ctx.write_permission())),
                ]
            }
            TemplateVersion::LocationPerCommand => Operation::ALL
                .into_iter()
                .filter(|op| ctx.template.permissions.postgres.contains(op))
                .map(|op| {
                    let name = format!(
                        "{POLICY_PREFIX}{table}_{}_location",
                        op.as_str().to_lowercase()
                    );
                    let policy = PolicyStatement::new(name, table, op.into());
                    let write = self.location_check(ctx, &ctx.write_permission());
                    match op {
                        Operation::Select => {
                            policy.using(self.location_check(ctx, &ctx.read_permission()))
                        }
                        Operation::Insert => policy.with_check(ALLOW_ALL),
                        Operation::Update => policy.using(write.clone()).with_check(write),
                        Operation::Delete => policy.using(write),
                    }
                })
                .collect(),
            TemplateVersion::Permission => {
                vec![
                    PolicyStatement::new(format!("{POLICY_PREFIX}{table}_permission_v3"), table, PolicyCommand::All)
                        .using(self.permission_check(&ctx.read_permission()))
                        .with_check(self.permission_check(&ctx.write_permission())),
                ]
            }
            TemplateVersion::Owner => {
                let owner = self.owner_check(ctx.owner_col().unwrap_or_default());
                vec![
                    PolicyStatement::new(format!("{POLICY_PREFIX}{table}_permission_v4"), table, PolicyCommand::All)
                        .using(owner.clone())
                        .with_check(owner),
                ]
            }
        }
    }

    fn custom_policy(
        &self,
        table: &str,
        custom: &CustomPostgresPolicy,
    ) -> Result<PolicyStatement, PolicyError> {
        if custom.using.is_none() && custom.with_check.is_none() {
            return Err(PolicyError::EmptyPolicy {
                policy: custom.name.clone(),
            });
        }

        let mut policy = PolicyStatement::new(&custom.name, table, custom.command);
        if let Some(using) = &custom.using {
            self.check_clause(&custom.name, "using", using)?;
            policy = policy.using(using.as_str());
        }
        if let Some(check) = &custom.with_check {
            self.check_clause(&custom.name, "with_check", check)?;
            policy = policy.with_check(check.as_str());
        }
        Ok(policy)
    }

    fn check_clause(&self, policy: &str, clause: &'static str, expr: &str) -> Result<(), PolicyError> {
        self.validator
            .check_expression(expr)
            .map_err(|reason| PolicyError::InvalidExpression {
                policy: policy.to_string(),
                clause,
                reason,
            })
    }

    /// `permission` held at the location of the row, through the access-path table when set.
    fn location_check(&self, ctx: &TemplateContext<'_>, permission: &str) -> String {
        let table = ctx.table;
        let mut from = vec![format!("{GRANTED_TABLE} p")];
        let mut conditions = self.grant_conditions(permission);

        match ctx.access_path() {
            Some(ap) => {
                from.push(format!("join {} {ACCESS_PATH_ALIAS} on", ap.name));
                from.push(format!(
                    "{INDENT}{ACCESS_PATH_ALIAS}.{} = p.location_id",
                    ctx.location_col()
                ));
                for (local, remote) in ctx.column_mapping() {
                    conditions.push(format!("and {ACCESS_PATH_ALIAS}.\"{remote}\" = {table}.{local}"));
                }
            }
            None => {
                conditions.push(format!("and p.location_id = {table}.{}", ctx.location_col()));
            }
        }
        subselect(&from, &conditions)
    }

    /// `permission` held anywhere.
    fn permission_check(&self, permission: &str) -> String {
        subselect(&[format!("{GRANTED_TABLE} p")], &self.grant_conditions(permission))
    }

    fn owner_check(&self, owner_col: &str) -> String {
        format!("current_setting('{}') = {owner_col}", self.user_id_setting)
    }

    fn grant_conditions(&self, permission: &str) -> Vec<String> {
        vec![
            format!("p.user_id = current_setting('{}')", self.user_id_setting),
            format!("and p.permission_name = '{permission}'"),
        ]
    }
}

fn subselect(from: &[String], conditions: &[String]) -> String {
    let mut lines = vec![
        "true <= (".to_string(),
        format!("{INDENT}select"),
        format!("{INDENT}{INDENT}true"),
        format!("{INDENT}from"),
    ];
    lines.extend(from.iter().map(|l| format!("{INDENT}{INDENT}{l}")));
    lines.push(format!("{INDENT}where"));
    lines.extend(conditions.iter().map(|c| format!("{INDENT}{INDENT}{c}")));
    lines.push(format!("{INDENT}limit 1"));
    lines.push(")".to_string());
    lines.join("\n")
}

/// Fallback policy left in place when a table's generated policies are rolled back.
pub fn baseline_policy(table: &str) -> PolicyStatement {
    let check = format!("permission_check(resource_path, '{table}')");
    PolicyStatement::new(legacy_policy_name(table), table, PolicyCommand::All)
        .using(check.clone())
        .with_check(check)
}

/// Drops for `names` on `table`, one statement per line.
pub fn drop_policies_sql<S: AsRef<str>>(table: &str, names: &[S]) -> String {
    names
        .iter()
        .map(|name| drop_policy_sql(name.as_ref(), table))
        .collect::<Vec<_>>()
        .join("\n")
}
