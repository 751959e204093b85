//! Fixed generation profiles selected by object kind.

use crate::catalog::ObjectKind;

/// A bundle of generation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptingProfile {
    /// Tables: leave foreign keys unguarded (`true`) or guard them on the
    /// referenced table existing (`false`). Drops: also remove foreign keys
    /// of other tables that reference the dropped table.
    pub include_dependencies: bool,
    pub script_schema: bool,
    pub script_data: bool,
    pub script_drops: bool,
    /// Wrap statements in existence guards.
    pub include_if_not_exists: bool,
    /// Emit non-constraint indexes of tables.
    pub include_indexes: bool,
    /// Allow assemblies to be scripted.
    pub include_assemblies: bool,
}

impl ScriptingProfile {
    /// Tables: schema and indexes, guarded, no assemblies.
    pub const TABLE: Self = Self {
        include_dependencies: false,
        script_schema: true,
        script_data: false,
        script_drops: false,
        include_if_not_exists: true,
        include_indexes: true,
        include_assemblies: false,
    };

    /// Views, procedures, functions and other modules.
    pub const PROGRAMMABILITY: Self = Self {
        include_dependencies: true,
        script_schema: true,
        script_data: false,
        script_drops: false,
        include_if_not_exists: true,
        include_indexes: false,
        include_assemblies: false,
    };

    /// CLR assemblies.
    pub const ASSEMBLY: Self = Self {
        include_dependencies: true,
        script_schema: true,
        script_data: false,
        script_drops: false,
        include_if_not_exists: true,
        include_indexes: false,
        include_assemblies: true,
    };

    /// Delete mode for every kind.
    pub const DROP: Self = Self {
        include_dependencies: true,
        script_schema: true,
        script_data: false,
        script_drops: true,
        include_if_not_exists: true,
        include_indexes: false,
        include_assemblies: true,
    };

    /// Data-only removal ahead of a table copy.
    pub const CLEAR_DATA: Self = Self {
        include_dependencies: false,
        script_schema: false,
        script_data: true,
        script_drops: true,
        include_if_not_exists: false,
        include_indexes: false,
        include_assemblies: false,
    };

    /// Copy-mode profile for an object kind.
    pub fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Table => Self::TABLE,
            ObjectKind::SqlAssembly => Self::ASSEMBLY,
            _ => Self::PROGRAMMABILITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_selection() {
        assert_eq!(ScriptingProfile::for_kind(ObjectKind::Table), ScriptingProfile::TABLE);
        assert_eq!(
            ScriptingProfile::for_kind(ObjectKind::SqlAssembly),
            ScriptingProfile::ASSEMBLY
        );
        for kind in [
            ObjectKind::View,
            ObjectKind::StoredProcedure,
            ObjectKind::UserDefinedFunction,
            ObjectKind::Other,
        ] {
            assert_eq!(ScriptingProfile::for_kind(kind), ScriptingProfile::PROGRAMMABILITY);
        }
    }

    #[test]
    fn test_table_profile_flags() {
        let p = ScriptingProfile::TABLE;
        assert!(!p.include_dependencies);
        assert!(p.include_indexes);
        assert!(p.include_if_not_exists);
        assert!(!p.include_assemblies);
    }

    #[test]
    fn test_only_assembly_and_drop_profiles_include_assemblies() {
        assert!(ScriptingProfile::ASSEMBLY.include_assemblies);
        assert!(ScriptingProfile::DROP.include_assemblies);
        assert!(!ScriptingProfile::PROGRAMMABILITY.include_assemblies);
    }

    #[test]
    fn test_drop_profiles() {
        assert!(ScriptingProfile::DROP.script_drops);
        assert!(!ScriptingProfile::DROP.script_data);
        assert!(ScriptingProfile::CLEAR_DATA.script_data);
        assert!(!ScriptingProfile::CLEAR_DATA.script_schema);
    }
}
