//! Per-template synthesis context.
//!
//! Everything the synthesizers need to know about the table being
//! generated is resolved once here and passed down by reference.

use std::collections::BTreeMap;

use crate::error::SpecError;
use crate::template::{AccessPathTable, TableSpec, Template, TemplateVersion};

/// Name of the view listing which user holds which permission at which location.
pub const GRANTED_TABLE: &str = "granted_permissions";

const READ_SUFFIX: &str = ".read";
const WRITE_SUFFIX: &str = ".write";

/// Immutable inputs for synthesizing one template of one table.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub service: &'a str,
    pub table: &'a str,
    pub pkey: Option<&'a str>,
    pub template: &'a Template,
}

impl<'a> TemplateContext<'a> {
    /// Build a context, failing if the template lacks required inputs.
    pub fn new(spec: &'a TableSpec, template: &'a Template) -> Result<Self, SpecError> {
        spec.validate_template(template)?;
        Ok(Self {
            service: &spec.service,
            table: &spec.table_name,
            pkey: spec.pkey_for(template),
            template,
        })
    }

    pub fn version(&self) -> TemplateVersion {
        self.template.template
    }

    pub fn location_col(&self) -> &'a str {
        self.template.location_col()
    }

    pub fn access_path(&self) -> Option<&'a AccessPathTable> {
        self.template.access_path_table.as_ref()
    }

    /// Table holding the location column: the access-path table, or the table itself.
    pub fn location_table(&self) -> &'a str {
        self.template.access_path_name().unwrap_or(self.table)
    }

    /// Local column -> access-path column pairs; the primary key maps to itself by default.
    pub fn column_mapping(&self) -> BTreeMap<String, String> {
        match self.access_path() {
            Some(ap) if !ap.column_mapping.is_empty() => ap.column_mapping.clone(),
            _ => self
                .pkey
                .map(|pk| BTreeMap::from([(pk.to_string(), pk.to_string())]))
                .unwrap_or_default(),
        }
    }

    pub fn read_permission(&self) -> String {
        format!("{}{READ_SUFFIX}", self.permission_prefix())
    }

    pub fn write_permission(&self) -> String {
        format!("{}{WRITE_SUFFIX}", self.permission_prefix())
    }

    fn permission_prefix(&self) -> &'a str {
        self.template.permission_prefix.as_deref().unwrap_or_default()
    }

    pub fn owner_col(&self) -> Option<&'a str> {
        self.template.owner_col.as_deref()
    }

    /// Object relationship from the location table to [`GRANTED_TABLE`].
    pub fn location_relationship(&self) -> String {
        location_relationship_name(self.table)
    }
}

pub fn location_relationship_name(table: &str) -> String {
    format!("{table}_location_permission")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> TableSpec {
        TableSpec::from_yaml("bob", "t.yaml", yaml).unwrap()
    }

    #[test]
    fn test_context_defaults() {
        let spec = spec(
            "table_name: lessons\npkey: lesson_id\ntemplates:\n  - permissionPrefix: lesson.lesson\n",
        );
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();

        assert_eq!(ctx.version(), TemplateVersion::Location);
        assert_eq!(ctx.location_table(), "lessons");
        assert_eq!(ctx.location_col(), "location_id");
        assert_eq!(ctx.read_permission(), "lesson.lesson.read");
        assert_eq!(ctx.write_permission(), "lesson.lesson.write");
        assert_eq!(
            ctx.column_mapping(),
            BTreeMap::from([("lesson_id".to_string(), "lesson_id".to_string())])
        );
        assert_eq!(ctx.location_relationship(), "lessons_location_permission");
    }

    #[test]
    fn test_context_with_access_path() {
        let spec = spec(
            r#"
table_name: students
pkey: student_id
templates:
  - accessPathTable:
      name: user_access_paths
      columnMapping:
        student_id: user_id
    locationCol: loc
    permissionPrefix: user.student
"#,
        );
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();
        assert_eq!(ctx.location_table(), "user_access_paths");
        assert_eq!(ctx.location_col(), "loc");
        assert_eq!(ctx.column_mapping()["student_id"], "user_id");
    }

    #[test]
    fn test_context_rejects_incomplete_template() {
        let spec = spec("table_name: students\ntemplates:\n  - template: \"1\"\n");
        assert!(TemplateContext::new(&spec, &spec.templates[0]).is_err());
    }
}
