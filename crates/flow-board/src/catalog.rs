//! Catalog of node templates
//!
//! The catalog maps node kind names (e.g. `control_branch`) to the template
//! nodes a user can place. Templates are instantiated with fresh ids when
//! placed on a board.

use std::collections::{BTreeMap, HashMap};

use crate::types::Node;

/// Node templates available for placement
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, Node>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its kind name, replacing any previous one
    pub fn register(&mut self, template: Node) {
        self.entries.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All templates sorted by friendly name
    pub fn list(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.entries.values().collect();
        nodes.sort_by(|a, b| {
            a.friendly_name
                .cmp(&b.friendly_name)
                .then_with(|| a.name.cmp(&b.name))
        });
        nodes
    }

    /// Templates grouped by category, each group sorted by friendly name
    pub fn by_category(&self) -> BTreeMap<String, Vec<&Node>> {
        let mut grouped: BTreeMap<String, Vec<&Node>> = BTreeMap::new();
        for node in self.list() {
            grouped.entry(node.category.clone()).or_default().push(node);
        }
        grouped
    }

    /// Templates whose name, friendly name or description contains the query
    pub fn search(&self, query: &str) -> Vec<&Node> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|node| {
                node.name.to_lowercase().contains(&query)
                    || node.friendly_name.to_lowercase().contains(&query)
                    || node.description.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Merge another catalog into this one
    ///
    /// Entries from `other` override entries in `self` with the same name.
    pub fn merge(&mut self, other: Catalog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Node> for Catalog {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for node in iter {
            catalog.register(node);
        }
        catalog
    }
}
