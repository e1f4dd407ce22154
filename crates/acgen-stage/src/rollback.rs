//! Rollback of generated artifacts from stage history alone.
//!
//! Every recorded policy is dropped and replaced by a single baseline
//! policy per table; every recorded relationship and condition is removed
//! from the metadata; the stage records go away.

use std::collections::BTreeMap;
use std::path::PathBuf;

use acgen_core::{FileAccess, FileStage};
use acgen_hasura::{MetadataDrop, MetadataStore};
use acgen_postgres::{baseline_policy, drop_policies_sql};

use crate::compiler::{Compiler, join_sql};
use crate::error::StageError;
use crate::migration::write_migration;
use crate::store::StageStore;

/// What rolling back one service takes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceRollback {
    pub sql: String,
    pub drops: Vec<MetadataDrop>,
    /// Stage keys removed.
    pub keys: Vec<String>,
}

/// Rollback plan keyed by service.
pub type RollbackPlan = BTreeMap<String, ServiceRollback>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub plan: RollbackPlan,
    pub written: Vec<PathBuf>,
}

/// Plan the rollback of every stage record matching the filters.
pub fn plan_rollback(
    store: &StageStore,
    service: Option<&str>,
    table: Option<&str>,
) -> RollbackPlan {
    let mut plan = RollbackPlan::new();
    for stage in store.iter() {
        if service.is_some_and(|s| s != stage.service)
            || table.is_some_and(|t| t != stage.table_name)
        {
            continue;
        }
        let entry = plan.entry(stage.service.clone()).or_default();
        let mut sql = rollback_sql(stage);
        if !entry.sql.is_empty() {
            sql.insert(0, '\n');
        }
        entry.sql.push_str(&sql);
        entry.drops.extend(
            stage
                .stages
                .iter()
                .filter_map(|s| MetadataDrop::for_entry(&stage.table_name, s)),
        );
        entry.keys.push(stage.key());
    }
    plan
}

/// Drops for every policy of `stage`, followed by the baseline policy.
fn rollback_sql(stage: &FileStage) -> String {
    let table = stage.table_name.as_str();
    let mut parts: Vec<String> = stage
        .stages
        .iter()
        .map(|s| s.policy_names())
        .filter(|names| !names.is_empty())
        .map(|names| drop_policies_sql(table, &names))
        .collect();
    let baseline = baseline_policy(table);
    parts.push(format!("{}\n{}", baseline.drop_sql(), baseline.create_sql()));
    join_sql(&parts).unwrap_or_default()
}

impl<'a, F: FileAccess + ?Sized> Compiler<'a, F> {
    /// Roll back the selected tables and persist the result unless `dry_run`.
    pub fn rollback(
        &self,
        service: Option<&str>,
        table: Option<&str>,
        dry_run: bool,
    ) -> Result<RollbackReport, StageError> {
        let stage_path = self.config.stage_path();
        let mut store = StageStore::load(self.files, &stage_path)?;
        let plan = plan_rollback(&store, service, table);
        let mut written = Vec::new();

        if dry_run || plan.is_empty() {
            return Ok(RollbackReport { plan, written });
        }

        let metadata = MetadataStore::new(self.files, &self.config.hasura);
        for (service, rollback) in &plan {
            tracing::warn!(service, tables = rollback.keys.len(), "rolling back");

            let dir = self.config.service_migrations_dir(service);
            written.push(write_migration(self.files, &dir, &rollback.sql)?);

            let baseline = metadata.load(service)?;
            let mut graph = baseline.clone();
            for drop in &rollback.drops {
                drop.apply(&mut graph);
            }
            written.extend(metadata.save(service, &graph, &baseline)?);

            for key in &rollback.keys {
                store.remove(key);
            }
        }

        store.save(self.files, &stage_path)?;
        written.push(stage_path);
        Ok(RollbackReport { plan, written })
    }
}
