//! Relationship path search.
//!
//! Finds how a table reaches its access-path table through object and
//! array relationships of the metadata graph.

use std::collections::HashMap;
use std::fmt;

use acgen_core::{HasuraTable, MetadataGraph, RelationshipKind};

use crate::error::HasuraError;

/// Longest path, in hops, the search will follow.
pub const MAX_DEPTH: usize = 6;

/// One relationship traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub kind: RelationshipKind,
    pub name: String,
    pub remote_table: String,
}

/// An ordered list of traversals from a table towards a target table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipPath {
    pub hops: Vec<Hop>,
}

impl RelationshipPath {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn first(&self) -> Option<&Hop> {
        self.hops.first()
    }

    /// A single array hop, for tables linked directly to their access path.
    pub fn direct(name: &str, remote_table: &str) -> Self {
        Self {
            hops: vec![Hop {
                kind: RelationshipKind::Array,
                name: name.to_string(),
                remote_table: remote_table.to_string(),
            }],
        }
    }
}

impl fmt::Display for RelationshipPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .hops
            .iter()
            .map(|hop| format!("{}:{}", hop.kind.tag(), hop.name))
            .collect();
        f.write_str(&parts.join("/"))
    }
}

/// Depth-limited search over a metadata graph.
///
/// Relationships are explored object-first, then array, each in
/// declaration order. Paths are reported in the order they are found.
pub struct RelationshipResolver<'g> {
    graph: &'g MetadataGraph,
    index: HashMap<&'g str, &'g HasuraTable>,
}

impl<'g> RelationshipResolver<'g> {
    pub fn new(graph: &'g MetadataGraph) -> Self {
        let mut index = HashMap::new();
        for table in &graph.tables {
            // First declaration wins, like a linear scan would.
            index.entry(table.table.name.as_str()).or_insert(table);
        }
        Self { graph, index }
    }

    pub fn graph(&self) -> &'g MetadataGraph {
        self.graph
    }

    /// Every path from `start` to `target` of at most [`MAX_DEPTH`] hops.
    pub fn find_paths(&self, start: &str, target: &str) -> Result<Vec<RelationshipPath>, HasuraError> {
        let table = self
            .index
            .get(start)
            .copied()
            .ok_or_else(|| HasuraError::TableNotFound {
                table: start.to_string(),
                referenced_by: format!("path search to {target}"),
            })?;

        let mut found = Vec::new();
        let mut hops = Vec::new();
        let mut visited = vec![table.table.name.as_str()];
        self.walk(table, target, &mut hops, &mut visited, &mut found);

        tracing::debug!(
            start,
            target,
            paths = found.len(),
            "relationship search finished"
        );
        Ok(found)
    }

    /// The shortest path from `start` to `target`.
    pub fn resolve(&self, start: &str, target: &str) -> Result<RelationshipPath, HasuraError> {
        let paths = self.find_paths(start, target)?;
        shortest(&paths)
            .cloned()
            .ok_or_else(|| HasuraError::NoAccessPath {
                table: start.to_string(),
                target: target.to_string(),
                max_depth: MAX_DEPTH,
            })
    }

    fn walk(
        &self,
        table: &'g HasuraTable,
        target: &str,
        hops: &mut Vec<Hop>,
        visited: &mut Vec<&'g str>,
        found: &mut Vec<RelationshipPath>,
    ) {
        if hops.len() >= MAX_DEPTH {
            return;
        }

        for kind in [RelationshipKind::Object, RelationshipKind::Array] {
            for relationship in table.relationships(kind) {
                let Some(remote) = relationship.remote_table(kind) else {
                    continue;
                };

                hops.push(Hop {
                    kind,
                    name: relationship.name.clone(),
                    remote_table: remote.clone(),
                });

                if remote == target {
                    found.push(RelationshipPath { hops: hops.clone() });
                } else if let Some(next) = self.index.get(remote.as_str()).copied() {
                    let name = next.table.name.as_str();
                    if !visited.contains(&name) {
                        visited.push(name);
                        self.walk(next, target, hops, visited, found);
                        visited.pop();
                    }
                }

                hops.pop();
            }
        }
    }
}

/// The path with the fewest hops; the first one found wins ties.
pub fn shortest(paths: &[RelationshipPath]) -> Option<&RelationshipPath> {
    paths.iter().reduce(|best, candidate| {
        if candidate.len() < best.len() {
            candidate
        } else {
            best
        }
    })
}
