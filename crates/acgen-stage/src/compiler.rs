//! Batch compilation of table specs into migrations, metadata and stage records.
//!
//! Each (service, table) unit is classified against its stage record,
//! synthesized on a private copy of the service's metadata graph, and only
//! merged back when it succeeds. Per service, artifacts are written in the
//! order migration, metadata, stage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use acgen_core::{
    AcgenConfig, FileAccess, FileStage, HasuraStage, MetadataGraph, PolicyStage, PostgresStage,
    TableSpec, TemplateContext, TemplateStage, TemplateVersion,
};
use acgen_hasura::{HasuraSynthesizer, MetadataDrop, MetadataStore};
use acgen_postgres::{PolicySynthesizer, drop_policies_sql};
use chrono::{DateTime, FixedOffset};

use crate::classify::{ChangeCode, classify};
use crate::error::{ErrorCategory, StageError};
use crate::migration::write_migration;
use crate::store::StageStore;

/// Which units a run covers and whether it writes anything.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub service: Option<String>,
    pub table: Option<String>,
    pub dry_run: bool,
    /// Timestamp recorded in updated stage records.
    pub now: DateTime<FixedOffset>,
}

impl CompileOptions {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            service: None,
            table: None,
            dry_run: false,
            now,
        }
    }

    fn includes_service(&self, service: &str) -> bool {
        self.service.as_deref().is_none_or(|s| s == service)
    }

    fn includes_table(&self, table: &str) -> bool {
        self.table.as_deref().is_none_or(|t| t == table)
    }
}

/// Classification of one template version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryChange {
    pub template: TemplateVersion,
    pub code: ChangeCode,
}

/// Result of compiling one table.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub service: String,
    pub table: String,
    pub changes: Vec<EntryChange>,
    /// Versions present in the stage record but no longer in the spec.
    pub deleted: Vec<TemplateVersion>,
    /// Stage revision after the run; unchanged units keep theirs.
    pub revision: u64,
}

impl UnitReport {
    pub fn is_unchanged(&self) -> bool {
        self.deleted.is_empty() && self.changes.iter().all(|c| c.code.is_none())
    }

    /// Code of `template`, if the spec still declares it.
    pub fn code(&self, template: TemplateVersion) -> Option<ChangeCode> {
        self.changes
            .iter()
            .find(|c| c.template == template)
            .map(|c| c.code)
    }
}

/// A spec file or table left out of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedUnit {
    pub service: String,
    pub file: String,
    pub category: ErrorCategory,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileReport {
    pub units: Vec<UnitReport>,
    pub skipped: Vec<SkippedUnit>,
    /// Files written, in write order.
    pub written: Vec<PathBuf>,
}

#[derive(Debug)]
enum StageUpdate {
    Keep,
    Put(FileStage),
    Remove,
}

#[derive(Debug)]
struct UnitOutcome {
    report: UnitReport,
    /// Replacement graph when the unit changed metadata.
    graph: Option<MetadataGraph>,
    sql: Option<String>,
    stage: StageUpdate,
}

/// Compiles the specs under the control root.
pub struct Compiler<'a, F: FileAccess + ?Sized> {
    pub(crate) files: &'a F,
    pub(crate) config: &'a AcgenConfig,
}

impl<'a, F: FileAccess + ?Sized> Compiler<'a, F> {
    pub fn new(files: &'a F, config: &'a AcgenConfig) -> Self {
        Self { files, config }
    }

    /// Compile every selected unit and persist what changed.
    pub fn run(&self, options: &CompileOptions) -> Result<CompileReport, StageError> {
        let stage_path = self.config.stage_path();
        let mut store = StageStore::load(self.files, &stage_path)?;
        let mut report = CompileReport::default();

        for service in self.services(&store)? {
            if !options.includes_service(&service) {
                continue;
            }
            self.compile_service(&service, options, &mut store, &mut report)?;
        }

        tracing::info!(
            units = report.units.len(),
            skipped = report.skipped.len(),
            written = report.written.len(),
            dry_run = options.dry_run,
            "compilation finished"
        );
        Ok(report)
    }

    /// Classify and synthesize without writing anything.
    pub fn plan(&self, options: &CompileOptions) -> Result<CompileReport, StageError> {
        let options = CompileOptions {
            dry_run: true,
            ..options.clone()
        };
        self.run(&options)
    }

    /// Service directories under the control root, plus services only the stage still knows.
    fn services(&self, store: &StageStore) -> Result<Vec<String>, StageError> {
        let mut services: BTreeSet<String> = match self.files.list_directories(&self.config.control_root) {
            Ok(dirs) => dirs.into_iter().collect(),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    control_root = %self.config.control_root.display(),
                    "control root not found"
                );
                BTreeSet::new()
            }
            Err(e) => return Err(e.into()),
        };
        services.extend(store.services());
        Ok(services.into_iter().collect())
    }

    fn compile_service(
        &self,
        service: &str,
        options: &CompileOptions,
        store: &mut StageStore,
        report: &mut CompileReport,
    ) -> Result<(), StageError> {
        let (specs, present) = self.load_specs(service, report)?;
        let metadata = MetadataStore::new(self.files, &self.config.hasura);
        let baseline = metadata.load(service)?;
        let mut graph = baseline.clone();
        let mut sql = Vec::new();
        let mut updates = Vec::new();

        let mut outcomes = Vec::new();
        for spec in specs.iter().filter(|s| options.includes_table(&s.table_name)) {
            match self.compile_unit(spec, store.get(&spec.key()), &graph, options.now) {
                Ok(outcome) => outcomes.push((spec.key(), outcome)),
                Err(e) if e.is_skippable() => {
                    tracing::warn!(
                        service,
                        table = spec.table_name,
                        category = %e.category(),
                        error = %e,
                        "skipping table"
                    );
                    report.skipped.push(SkippedUnit {
                        service: service.to_string(),
                        file: spec.filename.clone(),
                        category: e.category(),
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            }
            if let Some((_, outcome)) = outcomes.last_mut() {
                if let Some(next) = outcome.graph.take() {
                    graph = next;
                }
            }
        }

        // A record is stale when its file is gone or now declares another table.
        let declared: BTreeMap<&str, String> = specs
            .iter()
            .map(|s| (s.filename.as_str(), s.key()))
            .collect();
        let removed: Vec<FileStage> = store
            .for_service(service)
            .filter(|s| match declared.get(s.filename.as_str()) {
                Some(key) => *key != s.key(),
                None => !present.contains(&s.filename),
            })
            .filter(|s| options.includes_table(&s.table_name))
            .cloned()
            .collect();
        for stage in &removed {
            let mut outcome = self.remove_unit(stage, &graph);
            if let Some(next) = outcome.graph.take() {
                graph = next;
            }
            outcomes.push((stage.key(), outcome));
        }

        for (key, outcome) in outcomes {
            if let Some(unit_sql) = outcome.sql {
                sql.push(unit_sql);
            }
            updates.push((key, outcome.stage));
            report.units.push(outcome.report);
        }

        if options.dry_run {
            return Ok(());
        }

        if !sql.is_empty() {
            let dir = self.config.service_migrations_dir(service);
            report.written.push(write_migration(self.files, &dir, &sql.join("\n"))?);
        }
        report.written.extend(metadata.save(service, &graph, &baseline)?);

        let mut stage_changed = false;
        for (key, update) in updates {
            match update {
                StageUpdate::Keep => {}
                StageUpdate::Put(stage) => {
                    store.insert(stage);
                    stage_changed = true;
                }
                StageUpdate::Remove => {
                    store.remove(&key);
                    stage_changed = true;
                }
            }
        }
        if stage_changed {
            let path = self.config.stage_path();
            store.save(self.files, &path)?;
            report.written.push(path);
        }
        Ok(())
    }

    /// Parse the spec files of `service`; returns the specs and the names of every spec file seen.
    fn load_specs(
        &self,
        service: &str,
        report: &mut CompileReport,
    ) -> Result<(Vec<TableSpec>, BTreeSet<String>), StageError> {
        let dir = self.config.service_dir(service);
        let names = match self.files.list_files(&dir) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut specs = Vec::new();
        let mut present = BTreeSet::new();
        for name in names {
            if !(name.ends_with(".yaml") || name.ends_with(".yml")) {
                continue;
            }
            present.insert(name.clone());
            let content = self.files.read_to_string(&dir.join(&name))?;
            match TableSpec::from_yaml(service, name.as_str(), &content) {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    tracing::warn!(service, file = name, error = %e, "skipping unreadable spec");
                    report.skipped.push(SkippedUnit {
                        service: service.to_string(),
                        file: name,
                        category: ErrorCategory::InputValidation,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok((specs, present))
    }

    /// Classify and synthesize one table against a copy of `graph`.
    fn compile_unit(
        &self,
        spec: &TableSpec,
        old: Option<&FileStage>,
        graph: &MetadataGraph,
        now: DateTime<FixedOffset>,
    ) -> Result<UnitOutcome, StageError> {
        spec.validate()?;
        let table = spec.table_name.as_str();

        let changes: Vec<EntryChange> = spec
            .templates
            .iter()
            .map(|t| EntryChange {
                template: t.template,
                code: classify(old.and_then(|o| o.entry(t.template)), t),
            })
            .collect();
        let deleted: Vec<&TemplateStage> = old
            .map(|o| {
                o.stages
                    .iter()
                    .filter(|s| spec.template(s.template).is_none())
                    .collect()
            })
            .unwrap_or_default();

        for change in &changes {
            tracing::debug!(
                service = spec.service,
                table,
                template = %change.template,
                code = change.code.code(),
                "classified template"
            );
        }

        let metadata_changed = changes.iter().any(|c| c.code.has_metadata())
            || deleted.iter().any(|s| s.hasura.is_some());
        let sql_changed = changes.iter().any(|c| c.code.has_sql())
            || deleted.iter().any(|s| !s.policy_names().is_empty());

        let mut report = UnitReport {
            service: spec.service.clone(),
            table: table.to_string(),
            changes: changes.clone(),
            deleted: deleted.iter().map(|s| s.template).collect(),
            revision: old.map(|o| o.revision).unwrap_or_default(),
        };
        if !metadata_changed && !sql_changed {
            return Ok(UnitOutcome {
                report,
                graph: None,
                sql: None,
                stage: StageUpdate::Keep,
            });
        }

        let (hasura, graph) = if metadata_changed {
            let mut graph = graph.clone();
            let hasura = self.synthesize_metadata(spec, old, &mut graph)?;
            (hasura, Some(graph))
        } else {
            let hasura = spec
                .templates
                .iter()
                .map(|t| old.and_then(|o| o.entry(t.template)).and_then(|e| e.hasura.clone()))
                .collect();
            (hasura, None)
        };

        let mut sql = Vec::new();
        for entry in &deleted {
            let names = entry.policy_names();
            if !names.is_empty() {
                tracing::warn!(table, template = %entry.template, "dropping policies of removed template");
                sql.push(drop_policies_sql(table, &names));
            }
        }

        let synthesizer = PolicySynthesizer::new(&self.config.postgres);
        let mut postgres = Vec::new();
        for (template, change) in spec.templates.iter().zip(&changes) {
            let old_entry = old.and_then(|o| o.entry(template.template));
            if !change.code.has_sql() {
                postgres.push(old_entry.and_then(|e| e.postgres.clone()));
                continue;
            }

            let ctx = TemplateContext::new(spec, template)?;
            let synthesis = synthesizer.synthesize(&ctx)?;
            let names = synthesis.names();
            let stale: Vec<String> = old_entry
                .map(|e| e.policy_names())
                .unwrap_or_default()
                .into_iter()
                .filter(|n| !names.contains(n))
                .collect();
            if !stale.is_empty() {
                sql.push(drop_policies_sql(table, &stale));
            }

            if synthesis.policies.is_empty() {
                postgres.push(None);
            } else {
                sql.push(synthesis.sql());
                postgres.push(Some(PostgresStage {
                    policies: synthesis
                        .policies
                        .iter()
                        .map(|p| PolicyStage {
                            name: p.name.clone(),
                            content: p.create_sql(),
                        })
                        .collect(),
                }));
            }
        }

        let mut stage = old.cloned().unwrap_or_else(|| FileStage::new(spec, now));
        stage.filename = spec.filename.clone();
        stage.stages = spec
            .templates
            .iter()
            .zip(hasura)
            .zip(postgres)
            .map(|((template, hasura), postgres)| TemplateStage::record(template, hasura, postgres))
            .collect();
        stage.revision += 1;
        stage.updated_at = now;
        report.revision = stage.revision;

        Ok(UnitOutcome {
            report,
            graph,
            sql: join_sql(&sql),
            stage: StageUpdate::Put(stage),
        })
    }

    /// Drop everything `old` generated, then re-apply every metadata-enabled template in order.
    fn synthesize_metadata(
        &self,
        spec: &TableSpec,
        old: Option<&FileStage>,
        graph: &mut MetadataGraph,
    ) -> Result<Vec<Option<HasuraStage>>, StageError> {
        if let Some(old) = old {
            for entry in old.hasura_entries() {
                if let Some(drop) = MetadataDrop::for_entry(&old.table_name, entry) {
                    drop.apply(graph);
                }
            }
        }

        let metadata = MetadataStore::new(self.files, &self.config.hasura);
        let stage_dir = metadata.location(&spec.service).display().to_string();
        let synthesizer = HasuraSynthesizer::new(&self.config.hasura);
        let mut earlier_keys = Vec::new();
        let mut stages = Vec::new();

        for template in &spec.templates {
            if !template.hasura_enabled() {
                stages.push(None);
                continue;
            }
            let ctx = TemplateContext::new(spec, template)?;
            let outcome = synthesizer.synthesize(&ctx, graph, &earlier_keys)?;
            earlier_keys.push(outcome.first_level_query.clone());
            stages.push(Some(HasuraStage {
                stage_dir: stage_dir.clone(),
                permissions: template.permissions.hasura.clone(),
                relationship: outcome.relationship,
                first_level_query: outcome.first_level_query,
                extra_relationships: outcome.extra_relationships,
            }));
        }
        Ok(stages)
    }

    /// Tear down a table whose spec file is gone.
    fn remove_unit(&self, stage: &FileStage, graph: &MetadataGraph) -> UnitOutcome {
        tracing::warn!(
            service = stage.service,
            table = stage.table_name,
            "spec removed, dropping generated artifacts"
        );

        let mut sql = Vec::new();
        let mut next = None;
        for entry in &stage.stages {
            let names = entry.policy_names();
            if !names.is_empty() {
                sql.push(drop_policies_sql(&stage.table_name, &names));
            }
            if let Some(drop) = MetadataDrop::for_entry(&stage.table_name, entry) {
                drop.apply(next.get_or_insert_with(|| graph.clone()));
            }
        }

        UnitOutcome {
            report: UnitReport {
                service: stage.service.clone(),
                table: stage.table_name.clone(),
                changes: Vec::new(),
                deleted: stage.stages.iter().map(|s| s.template).collect(),
                revision: stage.revision,
            },
            graph: next,
            sql: join_sql(&sql),
            stage: StageUpdate::Remove,
        }
    }
}

/// Join statement blocks with a blank line; `None` when there are none.
pub(crate) fn join_sql(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        return None;
    }
    let mut sql = parts
        .iter()
        .map(|p| p.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n");
    sql.push('\n');
    Some(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_sql() {
        assert_eq!(join_sql(&[]), None);
        assert_eq!(
            join_sql(&["a;".to_string(), "b;\n".to_string()]).as_deref(),
            Some("a;\n\nb;\n")
        );
    }

    #[test]
    fn test_options_filters() {
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let mut options = CompileOptions::new(now);
        assert!(options.includes_service("bob") && options.includes_table("students"));

        options.service = Some("bob".to_string());
        options.table = Some("students".to_string());
        assert!(options.includes_service("bob"));
        assert!(!options.includes_service("eureka"));
        assert!(!options.includes_table("lessons"));
    }
}
