//! Hasura boolean expressions.
//!
//! Permission filters and checks in Hasura metadata are nested maps of
//! `_and` / `_or` / `_not` / `_exists` operators, column comparisons and
//! relationship traversals. [`Condition`] gives that shape a closed set of
//! variants so callers can match on it instead of probing untyped maps.
//!
//! Serialization goes through [`serde_json::Value`], which keeps the type
//! usable from both the YAML metadata files and the JSON stage file. A plain
//! map with zero or several entries stays a map when written back, so
//! filters of roles acgen does not manage keep their shape.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::metadata::TableName;

pub const AND: &str = "_and";
pub const OR: &str = "_or";
pub const NOT: &str = "_not";
pub const EXISTS: &str = "_exists";

const EXISTS_TABLE: &str = "_table";
const EXISTS_WHERE: &str = "_where";

/// A node of a Hasura boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `{column: {_eq: value, ...}}`
    Compare {
        column: String,
        ops: BTreeMap<String, Value>,
    },
    /// `{relationship: <predicate>}`
    Relation {
        name: String,
        predicate: Box<Condition>,
    },
    And(Vec<Condition>),
    /// Implicit conjunction written as one map: `{}` or `{a: ..., b: ...}`.
    Fields(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// `{_exists: {_table: ..., _where: ...}}`
    Exists {
        table: TableName,
        predicate: Box<Condition>,
    },
}

impl Default for Condition {
    fn default() -> Self {
        Condition::And(Vec::new())
    }
}

impl Condition {
    /// `{field: {_eq: value}}`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut ops = BTreeMap::new();
        ops.insert("_eq".to_string(), value.into());
        Condition::Compare {
            column: field.into(),
            ops,
        }
    }

    /// `{field: {_is_null: true}}`
    pub fn is_null(field: impl Into<String>) -> Self {
        let mut ops = BTreeMap::new();
        ops.insert("_is_null".to_string(), Value::Bool(true));
        Condition::Compare {
            column: field.into(),
            ops,
        }
    }

    pub fn relation(name: impl Into<String>, predicate: Condition) -> Self {
        Condition::Relation {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn exists(table: TableName, predicate: Condition) -> Self {
        Condition::Exists {
            table,
            predicate: Box::new(predicate),
        }
    }

    /// The top-level key this node serializes under.
    pub fn key(&self) -> &str {
        match self {
            Condition::Compare { column, .. } => column,
            Condition::Relation { name, .. } => name,
            Condition::And(_) | Condition::Fields(_) => AND,
            Condition::Or(_) => OR,
            Condition::Not(_) => NOT,
            Condition::Exists { .. } => EXISTS,
        }
    }

    /// Identity used for de-duplication.
    ///
    /// Leaves are identified by their field name. Groups are identified by
    /// their operator plus the sorted identities of their children, so two
    /// `_or` groups over the same fields collide while `_or` groups over
    /// different fields do not.
    pub fn identity(&self) -> String {
        match self {
            Condition::Compare { column, .. } => column.clone(),
            Condition::Relation { name, .. } => name.clone(),
            Condition::Exists { table, .. } => format!("{EXISTS}:{}", table.name),
            Condition::Not(inner) => format!("{NOT}[{}]", inner.identity()),
            Condition::And(children) | Condition::Fields(children) | Condition::Or(children) => {
                let mut ids: Vec<String> = children.iter().map(Condition::identity).collect();
                ids.sort();
                format!("{}[{}]", self.key(), ids.join(","))
            }
        }
    }

    /// Number of characters in the keys and scalar values of this tree.
    ///
    /// Used as the "more qualified" measure when two conditions collide.
    pub fn text_weight(&self) -> usize {
        let mut text = String::new();
        self.collect_text(&mut text);
        text.len()
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(self.key());
        match self {
            Condition::Compare { ops, .. } => {
                for (op, value) in ops {
                    out.push_str(op);
                    collect_value_text(value, out);
                }
            }
            Condition::Relation { predicate, .. } | Condition::Not(predicate) => {
                predicate.collect_text(out)
            }
            Condition::And(children) | Condition::Fields(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_text(out);
                }
            }
            Condition::Exists { table, predicate } => {
                out.push_str(&table.schema);
                out.push_str(&table.name);
                predicate.collect_text(out);
            }
        }
    }

    /// Split a top-level `_and` or plain map into its members; anything else is a single member.
    pub fn into_conjuncts(self) -> Vec<Condition> {
        match self {
            Condition::And(children) | Condition::Fields(children) => children,
            other => vec![other],
        }
    }

    pub fn conjuncts(&self) -> Vec<Condition> {
        self.clone().into_conjuncts()
    }

    /// Remove every top-level `_and` / `_or` / plain map member keyed by `key`.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove_keyed(&mut self, key: &str) -> bool {
        match self {
            Condition::And(children) | Condition::Fields(children) | Condition::Or(children) => {
                let before = children.len();
                children.retain(|c| c.key() != key);
                before != children.len()
            }
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            Condition::Compare { column, ops } => {
                let ops: Map<String, Value> =
                    ops.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                map.insert(column.clone(), Value::Object(ops));
            }
            Condition::Relation { name, predicate } => {
                map.insert(name.clone(), predicate.to_value());
            }
            Condition::And(children) => {
                map.insert(AND.to_string(), children_value(children));
            }
            Condition::Fields(children) => {
                for child in children {
                    if let Value::Object(entries) = child.to_value() {
                        map.extend(entries);
                    }
                }
            }
            Condition::Or(children) => {
                map.insert(OR.to_string(), children_value(children));
            }
            Condition::Not(inner) => {
                map.insert(NOT.to_string(), inner.to_value());
            }
            Condition::Exists { table, predicate } => {
                let mut exists = Map::new();
                let mut table_value = Map::new();
                table_value.insert("name".to_string(), Value::String(table.name.clone()));
                table_value.insert("schema".to_string(), Value::String(table.schema.clone()));
                exists.insert(EXISTS_TABLE.to_string(), Value::Object(table_value));
                exists.insert(EXISTS_WHERE.to_string(), predicate.to_value());
                map.insert(EXISTS.to_string(), Value::Object(exists));
            }
        }
        Value::Object(map)
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("expected a boolean expression object, found {value}"));
        };

        if map.len() != 1 {
            // `{}` is "true"; several keys are an implicit conjunction.
            let children = map
                .iter()
                .map(|(k, v)| Self::from_entry(k, v))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Condition::Fields(children));
        }

        let (key, inner) = map.iter().next().ok_or("empty boolean expression")?;
        Self::from_entry(key, inner)
    }

    fn from_entry(key: &str, value: &Value) -> Result<Self, String> {
        match key {
            AND | OR => {
                let children = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(Self::from_value)
                        .collect::<Result<Vec<_>, _>>()?,
                    Value::Object(_) => vec![Self::from_value(value)?],
                    other => return Err(format!("`{key}` expects a list, found {other}")),
                };
                Ok(if key == AND {
                    Condition::And(children)
                } else {
                    Condition::Or(children)
                })
            }
            NOT => Ok(Condition::Not(Box::new(Self::from_value(value)?))),
            EXISTS => {
                let table = value
                    .get(EXISTS_TABLE)
                    .ok_or("`_exists` is missing `_table`")?;
                let table: TableName =
                    serde_json::from_value(table.clone()).map_err(|e| e.to_string())?;
                let predicate = match value.get(EXISTS_WHERE) {
                    Some(w) => Self::from_value(w)?,
                    None => Condition::default(),
                };
                Ok(Condition::exists(table, predicate))
            }
            _ if is_comparison(value) => {
                let ops = value
                    .as_object()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                Ok(Condition::Compare {
                    column: key.to_string(),
                    ops,
                })
            }
            _ => Ok(Condition::relation(key, Self::from_value(value)?)),
        }
    }
}

fn children_value(children: &[Condition]) -> Value {
    Value::Array(children.iter().map(Condition::to_value).collect())
}

/// A column comparison is a non-empty map of `_op` keys that are not
/// boolean combinators.
fn is_comparison(value: &Value) -> bool {
    match value {
        Value::Object(map) if !map.is_empty() => map
            .keys()
            .all(|k| k.starts_with('_') && ![AND, OR, NOT, EXISTS].contains(&k.as_str())),
        _ => false,
    }
}

fn collect_value_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_value_text(v, out)),
        Value::Object(map) => {
            for (k, v) in map {
                out.push_str(k);
                collect_value_text(v, out);
            }
        }
        Value::Null => {}
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Condition::from_value(&value).map_err(D::Error::custom)
    }
}
