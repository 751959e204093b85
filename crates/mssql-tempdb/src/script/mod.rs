//! Scripting engine: turns walked dependency nodes into executed statements.

pub mod generator;
mod profile;

pub use profile::ScriptingProfile;

use tracing::{debug, info};

use crate::catalog::{ObjectKind, ObjectRef};
use crate::copy::DataCopier;
use crate::error::{HarnessError, Result};
use crate::source::{DefinitionSource, RowSource};
use crate::target::TargetDatabase;
use crate::walker::DependencyNode;

/// Create every node on the target in order, copying table data once per
/// session.
///
/// Unresolved nodes are skipped. Tables already in the copier's set are
/// still scripted (the guards make that a no-op) but their data is not
/// copied again.
pub async fn apply_copy<S, T>(
    nodes: &[DependencyNode],
    source: &mut S,
    target: &mut T,
    copier: &mut DataCopier,
) -> Result<()>
where
    S: DefinitionSource + RowSource + ?Sized,
    T: TargetDatabase + ?Sized,
{
    info!("Scripting dependencies:");

    for node in nodes {
        let object = &node.object;
        if object.is_unresolved() {
            debug!(" - Skipping unresolved {}", object.urn());
            continue;
        }

        info!(" - Generating scripts from {}", object.urn());
        let profile = ScriptingProfile::for_kind(object.kind);
        let statements = create_statements(&profile, object, source).await?;
        execute_all(target, &statements).await?;

        if object.kind == ObjectKind::Table {
            if copier.is_copied(object) {
                info!(" - Table already exists so skipping data copy");
            } else {
                copier.copy_table(source, target, object).await?;
            }
        }
    }

    Ok(())
}

/// Drop every node on the target in order.
pub async fn apply_drop<T>(nodes: &[DependencyNode], target: &mut T) -> Result<()>
where
    T: TargetDatabase + ?Sized,
{
    info!("Deleting dependencies:");

    for node in nodes {
        let object = &node.object;
        if object.is_unresolved() {
            debug!(" - Skipping unresolved {}", object.urn());
            continue;
        }

        info!(" - Generating scripts from {}", object.urn());
        let statements = generator::drop_object(&ScriptingProfile::DROP, object)?;
        execute_all(target, &statements).await?;
    }

    Ok(())
}

async fn create_statements<S>(
    profile: &ScriptingProfile,
    object: &ObjectRef,
    source: &mut S,
) -> Result<Vec<String>>
where
    S: DefinitionSource + ?Sized,
{
    let generated = match object.kind {
        ObjectKind::Unresolved => return Ok(Vec::new()),
        ObjectKind::Table => source
            .table_definition(object)
            .await
            .and_then(|definition| generator::create_table(profile, &definition)),
        ObjectKind::SqlAssembly => source
            .assembly_definition(object)
            .await
            .and_then(|definition| generator::create_assembly(profile, &definition)),
        ObjectKind::Other if object.type_code == "SO" => source
            .sequence_definition(object)
            .await
            .and_then(|definition| generator::create_sequence(profile, &definition)),
        ObjectKind::Other if object.type_code == "SN" => source
            .synonym_definition(object)
            .await
            .and_then(|definition| generator::create_synonym(profile, &definition)),
        ObjectKind::View
        | ObjectKind::StoredProcedure
        | ObjectKind::UserDefinedFunction
        | ObjectKind::Other => source
            .module_definition(object)
            .await
            .and_then(|definition| generator::create_module(profile, &definition)),
    };

    generated.map_err(|e| match e {
        e @ HarnessError::ScriptGeneration { .. } => e,
        other => HarnessError::script_generation(object.urn(), other.to_string()),
    })
}

async fn execute_all<T>(target: &mut T, statements: &[String]) -> Result<()>
where
    T: TargetDatabase + ?Sized,
{
    for statement in statements {
        info!(" - Executing script on {}", target.database());
        debug!("{}", statement);
        target.execute(statement).await?;
    }
    Ok(())
}
