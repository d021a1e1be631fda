//! `base` reference resolution.
//!
//! Both roms (`<rom base="XMLID">`) and tables (`<table base="Name">`) can
//! inherit from another definition. The reference graph comes straight from
//! user-edited files and may contain cycles, so chains are walked
//! iteratively with a visited set instead of by recursion.

use crate::definition::Node;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Why a chain could not be followed to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainError {
    /// Identities along the chain, ending with the revisited one.
    Cycle(Vec<String>),
    MissingBase { from: String, base: String },
    TooDeep { limit: usize },
}

/// Follow `base` links from `start` until a definition without one.
///
/// Returns the chain ordered from `start` to the root-most ancestor.
pub(crate) fn walk_chain<'a, T>(
    start: &'a T,
    identity: impl Fn(&T) -> String,
    base: impl Fn(&T) -> Option<String>,
    lookup: impl Fn(&str) -> Option<&'a T>,
    max_depth: usize,
) -> Result<Vec<&'a T>, ChainError> {
    let mut chain = vec![start];
    let mut names = vec![identity(start)];
    let mut seen: HashSet<String> = names.iter().cloned().collect();
    let mut current = start;

    while let Some(base_name) = base(current) {
        if seen.contains(&base_name) {
            names.push(base_name);
            return Err(ChainError::Cycle(names));
        }
        if chain.len() > max_depth {
            return Err(ChainError::TooDeep { limit: max_depth });
        }
        let next = lookup(&base_name).ok_or_else(|| ChainError::MissingBase {
            from: names.last().cloned().unwrap_or_default(),
            base: base_name.clone(),
        })?;
        seen.insert(base_name.clone());
        names.push(base_name);
        chain.push(next);
        current = next;
    }

    Ok(chain)
}

/// An owned, mergeable table definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TableDef {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// `(name, data)` pairs of switch states.
    pub states: Vec<(String, String)>,
    pub axes: Vec<TableDef>,
}

impl TableDef {
    pub fn from_node(node: &Node) -> Self {
        let mut attributes = node.attributes.clone();
        let name = attributes.remove("name").unwrap_or_default();
        let states = node
            .children_named("state")
            .map(|s| {
                (
                    s.attr("name").unwrap_or_default().to_string(),
                    s.attr("data").unwrap_or_default().to_string(),
                )
            })
            .collect();
        let axes = node.children_named("table").map(TableDef::from_node).collect();
        Self {
            name,
            attributes,
            states,
            axes,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn base(&self) -> Option<String> {
        self.attr("base")
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
    }

    /// Axes are keyed by type (`X Axis`, `Y Axis`), falling back to name.
    fn axis_key(&self) -> &str {
        self.attr("type").unwrap_or(&self.name)
    }

    /// Overlay `child` onto `self`; whatever `child` declares wins.
    pub fn merge_from(&mut self, child: &TableDef) {
        if !child.name.is_empty() {
            self.name = child.name.clone();
        }
        for (key, value) in &child.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
        if !child.states.is_empty() {
            self.states = child.states.clone();
        }
        for axis in &child.axes {
            match self
                .axes
                .iter_mut()
                .find(|existing| existing.axis_key() == axis.axis_key())
            {
                Some(existing) => existing.merge_from(axis),
                None => self.axes.push(axis.clone()),
            }
        }
    }
}

/// Tables keyed by name, in first-declaration order.
#[derive(Debug, Default)]
pub(crate) struct TableSet {
    tables: Vec<TableDef>,
    index: HashMap<String, usize>,
}

impl TableSet {
    /// Merge a table into the set, overriding an existing one of that name.
    pub fn merge(&mut self, table: TableDef) {
        match self.index.get(&table.name) {
            Some(&i) => self.tables[i].merge_from(&table),
            None => {
                self.index.insert(table.name.clone(), self.tables.len());
                self.tables.push(table);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

/// Flatten a table's own `base` chain: root-most first, the table last.
pub(crate) fn flatten_table(
    table: &TableDef,
    set: &TableSet,
    max_depth: usize,
) -> Result<TableDef, ChainError> {
    let chain = walk_chain(
        table,
        |t| t.name.clone(),
        TableDef::base,
        |name| set.get(name),
        max_depth,
    )?;

    let mut iter = chain.iter().rev();
    let mut resolved = iter.next().map(|t| (*t).clone()).unwrap_or_default();
    for t in iter {
        resolved.merge_from(t);
    }
    resolved.attributes.remove("base");
    Ok(resolved)
}
