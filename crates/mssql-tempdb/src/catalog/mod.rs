//! Schema catalog: object lookup and dependency edges.
//!
//! - [`Catalog`]: resolves names to [`ObjectRef`]s and lists the direct
//!   dependencies of an object in either direction
//! - [`definition`]: table, module and assembly definitions used for scripting

pub mod definition;
mod types;

pub use definition::*;
pub use types::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which way a dependency walk follows references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Objects the root depends on (copy).
    Source,
    /// Objects that depend on the root (delete).
    Target,
}

/// Read access to one database's catalog.
#[async_trait]
pub trait Catalog: Send {
    /// Database the catalog describes.
    fn database(&self) -> &str;

    /// Resolve a name of the given kind.
    ///
    /// Returns `Ok(None)` when no such object exists.
    async fn resolve(&mut self, kind: ObjectKind, name: &QualifiedName) -> Result<Option<ObjectRef>>;

    /// Direct dependencies of `object`.
    ///
    /// With [`Direction::Source`] these are the objects `object` references
    /// (tables named by its foreign keys, objects used by its module body,
    /// its assembly). With [`Direction::Target`] they are the objects that
    /// reference `object`. References the catalog cannot bind are returned as
    /// [`ObjectKind::Unresolved`].
    async fn dependencies(&mut self, object: &ObjectRef, direction: Direction)
        -> Result<Vec<ObjectRef>>;
}
