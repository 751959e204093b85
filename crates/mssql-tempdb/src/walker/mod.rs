//! Dependency walker: transitive discovery and apply ordering.

mod graph;

pub use graph::{DependencyGraph, NodeId, TopoSortResult};

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Direction, ObjectRef};
use crate::error::{HarnessError, Result};

/// One object of a walked dependency set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub object: ObjectRef,
    pub direction: Direction,
}

impl DependencyNode {
    pub fn is_unresolved(&self) -> bool {
        self.object.is_unresolved()
    }
}

/// Walks a catalog from a root object.
pub struct DependencyWalker;

impl DependencyWalker {
    /// Discover everything connected to `root` in `direction` and return it
    /// in apply order.
    ///
    /// For [`Direction::Source`] dependencies precede their dependents, which
    /// is a safe creation order. For [`Direction::Target`] dependents precede
    /// what they depend on, which is a safe drop order. The root is always
    /// part of the result. Unresolved references are included but never
    /// expanded.
    pub async fn discover<C>(
        catalog: &mut C,
        root: &ObjectRef,
        direction: Direction,
    ) -> Result<Vec<DependencyNode>>
    where
        C: Catalog + ?Sized,
    {
        info!("Gathering dependencies for {}", root.urn());

        match Self::build_graph(catalog, root, direction).await {
            Ok(graph) => Ok(Self::order(&graph, direction)),
            Err(e) => {
                warn!("Failed to get dependencies for {}", root.urn());
                Err(match e {
                    e @ HarnessError::DependencyDiscovery { .. } => e,
                    other => HarnessError::dependency_discovery(root.urn(), other),
                })
            }
        }
    }

    /// Breadth-first expansion from `root`.
    ///
    /// Each call to [`Catalog::dependencies`] yields objects that must be
    /// applied before the expanded node in both directions: what it
    /// references when copying, what references it when dropping.
    pub async fn build_graph<C>(
        catalog: &mut C,
        root: &ObjectRef,
        direction: Direction,
    ) -> Result<DependencyGraph>
    where
        C: Catalog + ?Sized,
    {
        let mut graph = DependencyGraph::new();
        let (root_id, _) = graph.add_node(root.clone());

        let mut queue = VecDeque::from([root_id]);
        while let Some(current) = queue.pop_front() {
            let object = graph.node(current).clone();
            if object.is_unresolved() {
                continue;
            }

            let edges = catalog.dependencies(&object, direction).await?;
            debug!("{} has {} direct dependencies", object.urn(), edges.len());

            for dependency in edges {
                let (id, is_new) = graph.add_node(dependency);
                graph.add_edge(id, current);
                if is_new {
                    queue.push_back(id);
                }
            }
        }

        Ok(graph)
    }

    fn order(graph: &DependencyGraph, direction: Direction) -> Vec<DependencyNode> {
        let result = graph.topo_sort();

        if !result.cyclic.is_empty() {
            let members: Vec<String> = result
                .cyclic
                .iter()
                .map(|&id| graph.node(id).urn())
                .collect();
            warn!(
                "Circular dependency detected, ordering broken at: {}",
                members.join(", ")
            );
        }

        result
            .order
            .into_iter()
            .map(|id| DependencyNode {
                object: graph.node(id).clone(),
                direction,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::{ObjectKind, QualifiedName};

    /// Catalog backed by a fixed edge list.
    #[derive(Default)]
    struct EdgeCatalog {
        edges: HashMap<String, Vec<ObjectRef>>,
        fail_on: Option<String>,
        calls: Vec<String>,
    }

    impl EdgeCatalog {
        fn edge(mut self, from: &ObjectRef, to: ObjectRef) -> Self {
            self.edges.entry(from.urn()).or_default().push(to);
            self
        }
    }

    #[async_trait]
    impl Catalog for EdgeCatalog {
        fn database(&self) -> &str {
            "Sales"
        }

        async fn resolve(
            &mut self,
            _kind: ObjectKind,
            _name: &QualifiedName,
        ) -> Result<Option<ObjectRef>> {
            Ok(None)
        }

        async fn dependencies(
            &mut self,
            object: &ObjectRef,
            _direction: Direction,
        ) -> Result<Vec<ObjectRef>> {
            self.calls.push(object.urn());
            if self.fail_on.as_deref() == Some(object.name.name.as_str()) {
                return Err(HarnessError::Config("catalog offline".into()));
            }
            Ok(self.edges.get(&object.urn()).cloned().unwrap_or_default())
        }
    }

    fn named(nodes: &[DependencyNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.object.name.name.as_str()).collect()
    }

    fn view(name: &str) -> ObjectRef {
        ObjectRef::new(ObjectKind::View, QualifiedName::new("dbo", name))
    }

    fn procedure(name: &str) -> ObjectRef {
        ObjectRef::new(ObjectKind::StoredProcedure, QualifiedName::new("dbo", name))
    }

    #[tokio::test]
    async fn test_source_walk_orders_dependencies_first() {
        let orders = ObjectRef::table("dbo", "Orders");
        let customers = ObjectRef::table("dbo", "Customers");
        let mut catalog = EdgeCatalog::default().edge(&orders, customers);

        let nodes = DependencyWalker::discover(&mut catalog, &orders, Direction::Source)
            .await
            .unwrap();

        assert_eq!(named(&nodes), vec!["Customers", "Orders"]);
        assert!(nodes.iter().all(|n| n.direction == Direction::Source));
    }

    #[tokio::test]
    async fn test_target_walk_orders_dependents_first() {
        let calc = procedure("CalcTotal");
        let summary = view("SalesSummary");
        let mut catalog = EdgeCatalog::default().edge(&calc, summary);

        let nodes = DependencyWalker::discover(&mut catalog, &calc, Direction::Target)
            .await
            .unwrap();

        assert_eq!(named(&nodes), vec!["SalesSummary", "CalcTotal"]);
    }

    #[tokio::test]
    async fn test_transitive_and_shared_dependencies() {
        let proc_ = procedure("GetOrders");
        let v = view("OrderTotals");
        let orders = ObjectRef::table("dbo", "Orders");
        let customers = ObjectRef::table("dbo", "Customers");
        let mut catalog = EdgeCatalog::default()
            .edge(&proc_, v.clone())
            .edge(&proc_, orders.clone())
            .edge(&v, orders.clone())
            .edge(&orders, customers);

        let nodes = DependencyWalker::discover(&mut catalog, &proc_, Direction::Source)
            .await
            .unwrap();

        assert_eq!(
            named(&nodes),
            vec!["Customers", "Orders", "OrderTotals", "GetOrders"]
        );
        // Orders expanded once even though reached twice
        let orders_calls = catalog.calls.iter().filter(|c| c.contains("'Orders'")).count();
        assert_eq!(orders_calls, 1);
    }

    #[tokio::test]
    async fn test_unresolved_nodes_are_not_expanded() {
        let proc_ = procedure("Report");
        let temp = ObjectRef::unresolved("dbo", "#staging");
        let mut catalog = EdgeCatalog::default().edge(&proc_, temp.clone());

        let nodes = DependencyWalker::discover(&mut catalog, &proc_, Direction::Source)
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_unresolved());
        assert!(!catalog.calls.contains(&temp.urn()));
    }

    #[tokio::test]
    async fn test_mutual_foreign_keys_terminate() {
        let a = ObjectRef::table("dbo", "A");
        let b = ObjectRef::table("dbo", "B");
        let mut catalog = EdgeCatalog::default()
            .edge(&a, b.clone())
            .edge(&b, a.clone());

        let nodes = DependencyWalker::discover(&mut catalog, &a, Direction::Source)
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_failure_becomes_discovery_error() {
        let orders = ObjectRef::table("dbo", "Orders");
        let customers = ObjectRef::table("dbo", "Customers");
        let mut catalog = EdgeCatalog {
            fail_on: Some("Customers".into()),
            ..EdgeCatalog::default()
        }
        .edge(&orders, customers);

        let err = DependencyWalker::discover(&mut catalog, &orders, Direction::Source)
            .await
            .unwrap_err();

        match err {
            HarnessError::DependencyDiscovery { object, .. } => {
                assert_eq!(object, orders.urn());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
