//! Routing of physical indices to the nodes of a search view.
//!
//! Index names follow `<prefix>-<base_type>-<suffix...>`: the second
//! `-`-separated token names the base type the index belongs to. A view
//! asks the resolver for every base type it reads, then hands each index
//! to every node that owns that base type.

use std::collections::BTreeMap;

use tracing::info;

use crate::backend::IndexResolver;
use crate::dsl::NodeRoutes;
use crate::error::{ViewError, ViewResult};
use crate::model::DataView;

/// Base types a view reads and the node IDs that own each one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseTypeRoutes {
    /// In first-seen order.
    pub base_types: Vec<String>,
    pub owners: BTreeMap<String, Vec<String>>,
}

impl BaseTypeRoutes {
    fn add(&mut self, base_type: &str, owner: &str) {
        if base_type.is_empty() {
            return;
        }
        let owners = self.owners.entry(base_type.to_string()).or_default();
        if owners.is_empty() {
            self.base_types.push(base_type.to_string());
        }
        if !owners.iter().any(|o| o == owner) {
            owners.push(owner.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base_types.is_empty()
    }
}

/// Indices selected for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRoutes {
    pub indices: Vec<String>,
    pub by_node: NodeRoutes,
}

impl IndexRoutes {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Collect base types: the technical name of an atomic view (owned by the
/// view itself) or of every view node's source view.
pub fn base_type_routes(view: &DataView) -> BaseTypeRoutes {
    let mut routes = BaseTypeRoutes::default();
    if view.is_atomic() {
        routes.add(&view.technical_name, &view.id);
        return routes;
    }
    for node in view.view_nodes() {
        if let Some(source) = node.source_view() {
            routes.add(&source.technical_name, &node.id);
        }
    }
    routes
}

/// The base type encoded in an index name, if it has one.
pub fn index_base_type(index: &str) -> Option<&str> {
    index.split('-').nth(1).filter(|t| !t.is_empty())
}

/// Assign each index to every node owning its base type.
pub fn route_indices(indices: &[String], routes: &BaseTypeRoutes) -> ViewResult<NodeRoutes> {
    let mut by_node = NodeRoutes::new();
    for index in indices {
        let Some(base_type) = index_base_type(index) else {
            continue;
        };
        let owners = routes.owners.get(base_type).ok_or_else(|| {
            ViewError::compile(format!(
                "index '{}' has base type '{}' which no node reads",
                index, base_type
            ))
        })?;
        for owner in owners {
            by_node.entry(owner.clone()).or_default().push(index.clone());
        }
    }
    Ok(by_node)
}

/// Ask the resolver for the view's indices in `[start, end]` and route them.
pub async fn resolve_view_indices(
    resolver: &dyn IndexResolver,
    view: &DataView,
    start: i64,
    end: i64,
) -> ViewResult<IndexRoutes> {
    let routes = base_type_routes(view);
    if routes.is_empty() {
        return Ok(IndexRoutes::default());
    }

    let resolved = resolver.resolve(&routes.base_types, start, end).await?;
    let by_node = route_indices(&resolved.indices, &routes)?;
    info!(
        view = %view.id,
        base_types = ?routes.base_types,
        indices = resolved.indices.len(),
        "resolved view indices"
    );
    Ok(IndexRoutes {
        indices: resolved.indices,
        by_node,
    })
}

/// Routes for the raw DSL backend, which addresses technical names directly.
pub fn static_routes(view: &DataView) -> IndexRoutes {
    let routes = base_type_routes(view);
    let by_node = routes
        .owners
        .iter()
        .flat_map(|(base_type, owners)| owners.iter().map(move |o| (o, base_type)))
        .fold(NodeRoutes::new(), |mut acc, (owner, base_type)| {
            acc.entry(owner.clone()).or_default().push(base_type.clone());
            acc
        });
    IndexRoutes {
        indices: routes.base_types,
        by_node,
    }
}
