//! Dependency ordering for deployment.

use std::collections::HashMap;

use crate::error::{PromoteError, Result};
use crate::package::DatabaseData;

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

/// Topologically order tables so every table is emitted after the tables
/// it references.
///
/// `edges` are (source, target) pairs meaning "source has a FK referencing
/// target". Edges whose endpoints are not both in `tables` are ignored;
/// cross-package dependencies are out of scope. A cycle aborts with
/// [`PromoteError::DependencyCycle`] - there is no partial ordering.
pub fn dependency_order(tables: &[String], edges: &[(String, String)]) -> Result<Vec<String>> {
    let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
    for (source, target) in edges {
        if tables.contains(source) && tables.contains(target) {
            deps.entry(source.as_str()).or_default().push(target.as_str());
        }
    }

    let mut state: HashMap<&str, Visit> = HashMap::new();
    let mut order: Vec<String> = Vec::with_capacity(tables.len());

    fn visit<'a>(
        table: &'a str,
        deps: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, Visit>,
        order: &mut Vec<String>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        match state.get(table) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                // Back-edge: we are revisiting a node on the current path.
                let mut cycle = path.clone();
                cycle.push(table.to_string());
                return Err(PromoteError::DependencyCycle { path: cycle });
            }
            None => {}
        }

        state.insert(table, Visit::InProgress);
        path.push(table.to_string());
        if let Some(targets) = deps.get(table) {
            for target in targets {
                visit(target, deps, state, order, path)?;
            }
        }
        path.pop();
        state.insert(table, Visit::Done);
        order.push(table.to_string());
        Ok(())
    }

    let mut path = Vec::new();
    for table in tables {
        visit(table, &deps, &mut state, &mut order, &mut path)?;
    }
    Ok(order)
}

/// Order a relational payload's tables by their FK dependencies.
pub fn table_deploy_order(data: &DatabaseData) -> Result<Vec<String>> {
    let tables: Vec<String> = data.tables.iter().map(|t| t.name.clone()).collect();
    let edges: Vec<(String, String)> = data
        .relationships
        .iter()
        .filter(|r| r.source_table != r.target_table)
        .map(|r| (r.source_table.clone(), r.target_table.clone()))
        .collect();
    dependency_order(&tables, &edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = dependency_order(
            &names(&["order_items", "orders", "customers"]),
            &[edge("order_items", "orders"), edge("orders", "customers")],
        )
        .unwrap();
        assert_eq!(order, names(&["customers", "orders", "order_items"]));
    }

    #[test]
    fn test_diamond_graph() {
        // a -> b, a -> c, b -> d, c -> d
        let order = dependency_order(
            &names(&["a", "b", "c", "d"]),
            &[edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        )
        .unwrap();

        let pos = |t: &str| order.iter().position(|x| x == t).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = dependency_order(
            &names(&["a", "b"]),
            &[edge("a", "b"), edge("b", "a")],
        )
        .unwrap_err();
        assert!(matches!(err, PromoteError::DependencyCycle { .. }));
    }

    #[test]
    fn test_edges_outside_set_are_ignored() {
        let order = dependency_order(
            &names(&["orders"]),
            &[edge("orders", "customers")],
        )
        .unwrap();
        assert_eq!(order, names(&["orders"]));
    }

    #[test]
    fn test_each_table_emitted_once() {
        let order = dependency_order(
            &names(&["a", "b", "c"]),
            &[edge("a", "c"), edge("b", "c")],
        )
        .unwrap();
        assert_eq!(order.len(), 3);
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }
}
