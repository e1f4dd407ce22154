//! Change classification of a template against its stage entry.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use acgen_core::{Template, TemplateStage};

/// Which artifacts a template change requires regenerating.
///
/// Bit 1 is Hasura metadata, bit 4 is Postgres SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChangeCode(u8);

impl ChangeCode {
    pub const NONE: ChangeCode = ChangeCode(0);
    pub const METADATA: ChangeCode = ChangeCode(1);
    pub const SQL: ChangeCode = ChangeCode(4);
    pub const BOTH: ChangeCode = ChangeCode(5);

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn has_metadata(self) -> bool {
        self.0 & Self::METADATA.0 != 0
    }

    pub fn has_sql(self) -> bool {
        self.0 & Self::SQL.0 != 0
    }
}

impl BitOr for ChangeCode {
    type Output = ChangeCode;

    fn bitor(self, rhs: ChangeCode) -> ChangeCode {
        ChangeCode(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeCode {
    fn bitor_assign(&mut self, rhs: ChangeCode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compare `new` with the stage entry recorded for its version.
///
/// A template with no entry is new and regenerates both sides.
pub fn classify(old: Option<&TemplateStage>, new: &Template) -> ChangeCode {
    let Some(old) = old else {
        return ChangeCode::BOTH;
    };

    let mut code = ChangeCode::NONE;

    if old.location_col != new.location_col
        || old.permission_prefix != new.permission_prefix
        || old.access_path_table != new.access_path_table
        || old.owner_col != new.owner_col
    {
        code |= ChangeCode::BOTH;
    }

    if old.hasura_permissions() != new.permissions.hasura.as_slice() {
        code |= ChangeCode::METADATA;
    }
    if old.postgres_permissions() != new.permissions.postgres.as_slice() {
        code |= ChangeCode::SQL;
    }

    if old.use_custom_hasura_policy != new.use_custom_hasura_policy
        || old.hasura_policies != new.hasura_policies
        || old.all_roles != new.all_roles
        || old.map_directly != new.map_directly
    {
        code |= ChangeCode::METADATA;
    }

    if new.postgres_policy_version > old.postgres_policy_version
        || old.use_custom_policy != new.use_custom_policy
        || old.custom_postgres_policies() != new.postgres_policies.as_slice()
    {
        code |= ChangeCode::SQL;
    }

    code
}
