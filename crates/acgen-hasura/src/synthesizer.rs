//! Hasura permission and relationship synthesis.
//!
//! Given one template and the metadata graph of its service, the
//! synthesizer rewrites the permissions of the table for the default role
//! (or every role), links the location table to `granted_permissions`,
//! and applies any custom overrides. The graph is mutated in place.

use std::collections::{BTreeMap, BTreeSet};

use acgen_core::metadata::PUBLIC_SCHEMA;
use acgen_core::{
    Condition, CustomHasuraPolicies, CustomRelationship, DeletePermission, GRANTED_TABLE,
    HasuraConfig, HasuraTable, InsertPermission, MetadataGraph, Operation, Relationship,
    RelationshipKind, RolePermission, SelectPermission, TableName, TemplateContext,
    TemplateVersion, UpdatePermission,
};

use crate::error::HasuraError;
use crate::filter::{CheckBuilder, combine_with_earlier, merge, push_unique};
use crate::resolver::{RelationshipPath, RelationshipResolver};

/// Columns exposed by the `granted_permissions` view.
pub const GRANTED_COLUMNS: [&str; 4] = ["user_id", "permission_name", "location_id", "resource_path"];

/// What one synthesis added to the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct HasuraOutcome {
    /// Location relationship added, empty when the template does not scope by location.
    pub relationship: String,
    /// Top-level key of the generated condition.
    pub first_level_query: String,
    pub path: RelationshipPath,
    /// Relationships added besides the location relationship.
    pub extra_relationships: Vec<CustomRelationship>,
    /// Whether the `granted_permissions` node had to be created.
    pub granted_view_added: bool,
}

/// Column sets granted to existing roles, per operation.
#[derive(Debug, Default)]
struct ColumnSets {
    select: Vec<String>,
    insert: Vec<String>,
    update: Vec<String>,
}

impl ColumnSets {
    /// Sorted union of the roles' columns; the owner column always comes last.
    fn collect(table: &HasuraTable, owner: Option<&str>) -> Self {
        let union = |columns: Vec<&Vec<String>>| -> Vec<String> {
            let mut set: Vec<String> = columns
                .into_iter()
                .flatten()
                .filter(|c| owner != Some(c.as_str()))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            set.extend(owner.map(str::to_string));
            set
        };

        Self {
            select: union(table.select_permissions.iter().map(|p| &p.permission.columns).collect()),
            insert: union(table.insert_permissions.iter().map(|p| &p.permission.columns).collect()),
            update: union(table.update_permissions.iter().map(|p| &p.permission.columns).collect()),
        }
    }
}

/// Synthesizes Hasura metadata for templates.
pub struct HasuraSynthesizer<'a> {
    config: &'a HasuraConfig,
}

impl<'a> HasuraSynthesizer<'a> {
    pub fn new(config: &'a HasuraConfig) -> Self {
        Self { config }
    }

    /// Apply one template to `graph`.
    ///
    /// `earlier_keys` are the first-level keys generated by templates of
    /// the same table that ran before this one in the same unit; their
    /// conditions are or-ed with this template's check.
    pub fn synthesize(
        &self,
        ctx: &TemplateContext<'_>,
        graph: &mut MetadataGraph,
        earlier_keys: &[String],
    ) -> Result<HasuraOutcome, HasuraError> {
        let granted_view_added = self.ensure_granted_view(graph);

        for name in [ctx.table, ctx.location_table()] {
            if !graph.contains(name) {
                return Err(HasuraError::TableNotFound {
                    table: name.to_string(),
                    referenced_by: format!("{}:{}", ctx.service, ctx.table),
                });
            }
        }

        let path = self.access_path(ctx, graph)?;
        let builder = CheckBuilder::new(ctx, self.config);
        let read = ctx.read_permission();
        let write = ctx.write_permission();
        let first_level_query = builder.permission_check(&path, &read).key().to_string();

        tracing::debug!(
            table = ctx.table,
            template = %ctx.version(),
            path = %path,
            first_level_query,
            "synthesizing hasura permissions"
        );

        let table = graph
            .table_mut(ctx.table)
            .ok_or_else(|| HasuraError::TableNotFound {
                table: ctx.table.to_string(),
                referenced_by: format!("{}:{}", ctx.service, ctx.table),
            })?;
        let owner = match ctx.version() {
            TemplateVersion::Owner => ctx.owner_col(),
            _ => None,
        };
        let columns = ColumnSets::collect(table, owner);

        for op in Operation::ALL {
            if !ctx.template.permissions.hasura.contains(&op) {
                continue;
            }
            let permission = if op.is_read() { &read } else { &write };
            let check = builder.permission_check(&path, permission);
            self.apply(table, op, check, &columns, earlier_keys, ctx.template.all_roles);
        }

        if let Some(custom) = ctx.template.custom_hasura() {
            self.overlay(table, custom, &columns);
        }

        let relationship = if ctx.version().is_location_scoped() {
            self.link_location(ctx, graph)?;
            ctx.location_relationship()
        } else {
            String::new()
        };

        let mut extra_relationships = self.link_directly(ctx, graph)?;
        if let Some(custom) = ctx.template.custom_hasura() {
            extra_relationships.extend(self.add_custom_relationships(custom, graph)?);
        }

        Ok(HasuraOutcome {
            relationship,
            first_level_query,
            path,
            extra_relationships,
            granted_view_added,
        })
    }

    /// Insert the `granted_permissions` view node if it is missing.
    pub fn ensure_granted_view(&self, graph: &mut MetadataGraph) -> bool {
        if graph.contains(GRANTED_TABLE) {
            return false;
        }

        let mut view = HasuraTable::new(TableName::public(GRANTED_TABLE));
        view.select_permissions.push(RolePermission::new(
            self.config.default_role.clone(),
            SelectPermission {
                columns: GRANTED_COLUMNS.iter().map(|c| c.to_string()).collect(),
                filter: Condition::And(vec![
                    Condition::eq("user_id", self.config.user_id_session_variable.as_str()),
                    Condition::eq(
                        "resource_path",
                        self.config.resource_path_session_variable.as_str(),
                    ),
                ]),
                allow_aggregations: false,
                limit: None,
            },
        ));
        graph.push(view);
        tracing::info!("added {GRANTED_TABLE} to hasura metadata");
        true
    }

    fn access_path(
        &self,
        ctx: &TemplateContext<'_>,
        graph: &MetadataGraph,
    ) -> Result<RelationshipPath, HasuraError> {
        if !ctx.version().is_location_scoped() {
            return Ok(RelationshipPath::default());
        }
        let target = ctx.location_table();
        if ctx.template.map_directly && ctx.access_path().is_some() {
            return Ok(RelationshipPath::direct(target, target));
        }
        if target == ctx.table {
            return Ok(RelationshipPath::default());
        }
        RelationshipResolver::new(graph).resolve(ctx.table, target)
    }

    fn apply(
        &self,
        table: &mut HasuraTable,
        op: Operation,
        check: Condition,
        columns: &ColumnSets,
        earlier_keys: &[String],
        all_roles: bool,
    ) {
        let role = self.config.default_role.as_str();
        match op {
            Operation::Select => {
                if all_roles {
                    for p in &mut table.select_permissions {
                        p.permission.filter =
                            merge_into(Some(&p.permission.filter), check.clone(), earlier_keys);
                    }
                    return;
                }
                let existing = find_role(&table.select_permissions, role).map(|p| &p.filter);
                let permission = SelectPermission {
                    columns: columns.select.clone(),
                    filter: merge_into(existing, check, earlier_keys),
                    allow_aggregations: true,
                    limit: None,
                };
                upsert_role(&mut table.select_permissions, role, permission);
            }
            Operation::Insert => {
                if all_roles {
                    for p in &mut table.insert_permissions {
                        p.permission.check =
                            merge_into(Some(&p.permission.check), check.clone(), earlier_keys);
                    }
                    return;
                }
                let set: BTreeMap<_, _> = table
                    .insert_permissions
                    .iter()
                    .flat_map(|p| p.permission.set.clone())
                    .collect();
                let existing = find_role(&table.insert_permissions, role);
                let permission = InsertPermission {
                    check: merge_into(existing.map(|p| &p.check), check, earlier_keys),
                    set,
                    columns: columns.insert.clone(),
                    backend_only: existing.and_then(|p| p.backend_only),
                };
                upsert_role(&mut table.insert_permissions, role, permission);
            }
            Operation::Update => {
                if all_roles {
                    for p in &mut table.update_permissions {
                        let merged = merge_into(Some(&p.permission.filter), check.clone(), earlier_keys);
                        if p.permission.check.is_some() {
                            p.permission.check = Some(merged.clone());
                        }
                        p.permission.filter = merged;
                    }
                    return;
                }
                let existing = find_role(&table.update_permissions, role);
                let merged = merge_into(existing.map(|p| &p.filter), check, earlier_keys);
                let permission = UpdatePermission {
                    columns: columns.update.clone(),
                    filter: merged.clone(),
                    check: Some(merged),
                    set: existing.map(|p| p.set.clone()).unwrap_or_default(),
                };
                upsert_role(&mut table.update_permissions, role, permission);
            }
            Operation::Delete => {
                if all_roles {
                    for p in &mut table.delete_permissions {
                        p.permission.filter =
                            merge_into(Some(&p.permission.filter), check.clone(), earlier_keys);
                    }
                    return;
                }
                let existing = find_role(&table.delete_permissions, role);
                let permission = DeletePermission {
                    filter: merge_into(existing.map(|p| &p.filter), check, earlier_keys),
                    backend_only: existing.and_then(|p| p.backend_only),
                };
                upsert_role(&mut table.delete_permissions, role, permission);
            }
        }
    }

    /// Merge hand-written role conditions into the table's permissions.
    fn overlay(&self, table: &mut HasuraTable, custom: &CustomHasuraPolicies, columns: &ColumnSets) {
        for c in &custom.select_permission {
            let Some(filter) = &c.filter else { continue };
            match table.select_permissions.iter_mut().find(|p| p.role == c.name) {
                Some(p) => p.permission.filter = overlay_onto(&p.permission.filter, filter),
                None => table.select_permissions.push(RolePermission::new(
                    c.name.clone(),
                    SelectPermission {
                        columns: columns.select.clone(),
                        filter: overlay_onto(&Condition::default(), filter),
                        allow_aggregations: true,
                        limit: None,
                    },
                )),
            }
        }

        for c in &custom.insert_permission {
            let Some(check) = &c.check else { continue };
            match table.insert_permissions.iter_mut().find(|p| p.role == c.name) {
                Some(p) => p.permission.check = overlay_onto(&p.permission.check, check),
                None => table.insert_permissions.push(RolePermission::new(
                    c.name.clone(),
                    InsertPermission {
                        check: overlay_onto(&Condition::default(), check),
                        columns: columns.insert.clone(),
                        ..InsertPermission::default()
                    },
                )),
            }
        }

        for c in &custom.update_permission {
            if c.filter.is_none() && c.check.is_none() {
                continue;
            }
            let position = table.update_permissions.iter().position(|p| p.role == c.name);
            let p = match position {
                Some(index) => &mut table.update_permissions[index].permission,
                None => {
                    table.update_permissions.push(RolePermission::new(
                        c.name.clone(),
                        UpdatePermission {
                            columns: columns.update.clone(),
                            ..UpdatePermission::default()
                        },
                    ));
                    let last = table.update_permissions.len() - 1;
                    &mut table.update_permissions[last].permission
                }
            };
            if let Some(filter) = &c.filter {
                p.filter = overlay_onto(&p.filter, filter);
            }
            if let Some(check) = &c.check {
                let base = p.check.clone().unwrap_or_default();
                p.check = Some(overlay_onto(&base, check));
            }
        }

        for c in &custom.delete_permission {
            let Some(filter) = &c.filter else { continue };
            match table.delete_permissions.iter_mut().find(|p| p.role == c.name) {
                Some(p) => p.permission.filter = overlay_onto(&p.permission.filter, filter),
                None => table.delete_permissions.push(RolePermission::new(
                    c.name.clone(),
                    DeletePermission {
                        filter: overlay_onto(&Condition::default(), filter),
                        backend_only: None,
                    },
                )),
            }
        }
    }

    /// Link the location table and `granted_permissions` both ways.
    fn link_location(
        &self,
        ctx: &TemplateContext<'_>,
        graph: &mut MetadataGraph,
    ) -> Result<(), HasuraError> {
        let name = ctx.location_relationship();
        let location_table = ctx.location_table();
        let location_col = ctx.location_col();

        table_mut(graph, location_table, ctx)?.upsert_relationship(
            RelationshipKind::Object,
            Relationship::manual(
                name.clone(),
                GRANTED_TABLE,
                BTreeMap::from([(location_col.to_string(), "location_id".to_string())]),
            ),
        );
        table_mut(graph, GRANTED_TABLE, ctx)?.upsert_relationship(
            RelationshipKind::Object,
            Relationship::manual(
                name,
                location_table,
                BTreeMap::from([("location_id".to_string(), location_col.to_string())]),
            ),
        );
        Ok(())
    }

    /// Manual relationships between the table and its access path, for map-directly templates.
    fn link_directly(
        &self,
        ctx: &TemplateContext<'_>,
        graph: &mut MetadataGraph,
    ) -> Result<Vec<CustomRelationship>, HasuraError> {
        let Some(access_path) = ctx.access_path() else {
            return Ok(Vec::new());
        };
        if !ctx.template.map_directly || ctx.version() == TemplateVersion::Permission {
            return Ok(Vec::new());
        }

        let mapping = ctx.column_mapping();
        let mut added = vec![CustomRelationship {
            table_name: ctx.table.to_string(),
            name: access_path.name.clone(),
            remote_table: access_path.name.clone(),
            column_mapping: mapping.clone(),
        }];
        table_mut(graph, ctx.table, ctx)?.upsert_relationship(
            RelationshipKind::Array,
            Relationship::manual(access_path.name.clone(), &access_path.name, mapping.clone()),
        );

        if ctx.version().is_location_scoped() {
            let reverse: BTreeMap<String, String> =
                mapping.into_iter().map(|(local, remote)| (remote, local)).collect();
            added.push(CustomRelationship {
                table_name: access_path.name.clone(),
                name: ctx.table.to_string(),
                remote_table: ctx.table.to_string(),
                column_mapping: reverse.clone(),
            });
            table_mut(graph, &access_path.name, ctx)?.upsert_relationship(
                RelationshipKind::Object,
                Relationship::manual(ctx.table, ctx.table, reverse),
            );
        }
        Ok(added)
    }

    fn add_custom_relationships(
        &self,
        custom: &CustomHasuraPolicies,
        graph: &mut MetadataGraph,
    ) -> Result<Vec<CustomRelationship>, HasuraError> {
        let mut added = Vec::new();
        let kinds = [
            (RelationshipKind::Object, &custom.object_relationships),
            (RelationshipKind::Array, &custom.array_relationships),
        ];
        for (kind, relationships) in kinds {
            for r in relationships {
                let table = graph
                    .table_mut(&r.table_name)
                    .ok_or_else(|| HasuraError::TableNotFound {
                        table: r.table_name.clone(),
                        referenced_by: format!("custom relationship {}", r.name),
                    })?;
                table.upsert_relationship(
                    kind,
                    Relationship::manual(r.name.clone(), &r.remote_table, r.column_mapping.clone()),
                );
                added.push(r.clone());
            }
        }
        Ok(added)
    }
}

fn table_mut<'g>(
    graph: &'g mut MetadataGraph,
    name: &str,
    ctx: &TemplateContext<'_>,
) -> Result<&'g mut HasuraTable, HasuraError> {
    graph
        .table_mut(name)
        .ok_or_else(|| HasuraError::TableNotFound {
            table: name.to_string(),
            referenced_by: format!("{}:{}", ctx.service, ctx.table),
        })
}

fn find_role<'t, P>(list: &'t [RolePermission<P>], role: &str) -> Option<&'t P> {
    list.iter().find(|p| p.role == role).map(|p| &p.permission)
}

fn upsert_role<P>(list: &mut Vec<RolePermission<P>>, role: &str, permission: P) {
    match list.iter_mut().find(|p| p.role == role) {
        Some(existing) => existing.permission = permission,
        None => list.push(RolePermission::new(role, permission)),
    }
}

/// `_and` of `check` merged with the conjuncts of `existing`.
fn merge_into(existing: Option<&Condition>, check: Condition, earlier_keys: &[String]) -> Condition {
    let mut conjuncts = existing.map(Condition::conjuncts).unwrap_or_default();
    let check = combine_with_earlier(&mut conjuncts, check, earlier_keys);
    Condition::And(merge(conjuncts, check))
}

fn overlay_onto(existing: &Condition, custom: &Condition) -> Condition {
    let mut conjuncts = existing.conjuncts();
    for condition in custom.conjuncts() {
        push_unique(&mut conjuncts, condition);
    }
    Condition::And(conjuncts)
}

/// File name of a table in the per-table metadata layout.
pub fn table_file_name(table: &TableName) -> String {
    let schema = if table.schema.is_empty() {
        PUBLIC_SCHEMA
    } else {
        table.schema.as_str()
    };
    format!("{schema}_{}.yaml", table.name)
}
