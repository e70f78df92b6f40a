use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}
pub(crate) use regex;

/// Formats items as a dash-prefixed list for multi-line error messages.
pub(crate) fn dashlist<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    items
        .into_iter()
        .map(|item| format!("\n  - {item}"))
        .collect()
}

/// Topological sort of a dependency graph. Nodes with no remaining
/// dependencies are released a level at a time, each level in alphabetical
/// order. Edges to nodes outside the graph are ignored, as are self edges.
/// A cycle releases its smallest member so the sort stays total.
pub(crate) fn toposort(mut digraph: BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let known: BTreeSet<String> = digraph.keys().cloned().collect();
    for (name, deps) in digraph.iter_mut() {
        let name = name.clone();
        deps.remove(&name);
        deps.retain(|dep| known.contains(dep));
    }

    let mut result = Vec::with_capacity(digraph.len());
    while !digraph.is_empty() {
        let mut ready: Vec<String> = digraph
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            match digraph.keys().next() {
                Some(name) => ready.push(name.clone()),
                None => break,
            }
        }
        for name in &ready {
            digraph.remove(name);
        }
        for deps in digraph.values_mut() {
            for name in &ready {
                deps.remove(name);
            }
        }
        result.extend(ready);
    }
    result
}
