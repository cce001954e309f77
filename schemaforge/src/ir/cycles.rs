//! Reference cycle detection over owning-side relationships

use super::{EntityGraph, RelationKind, RelationSide};
use std::collections::BTreeSet;

/// Groups of entities (by index) whose foreign keys reference each other in a cycle.
///
/// Each group is sorted and reported once; a self-referencing entity forms a
/// group of one. Walks use an explicit stack and a visited set, so every
/// entity is expanded at most once per start node.
pub(crate) fn reference_cycles(graph: &EntityGraph) -> Vec<Vec<usize>> {
    let n = graph.len();
    let edges: Vec<Vec<usize>> = graph
        .iter()
        .map(|entity| {
            entity
                .relationships
                .iter()
                .filter(|r| r.side == RelationSide::Owning)
                .filter(|r| matches!(r.kind, RelationKind::ManyToOne | RelationKind::OneToOne))
                .map(|r| r.target.0)
                .collect()
        })
        .collect();

    let reachable: Vec<Vec<bool>> = (0..n).map(|start| reachable_from(start, &edges)).collect();

    let mut seen = vec![false; n];
    let mut groups = Vec::new();
    for start in 0..n {
        if seen[start] || !reachable[start][start] {
            continue;
        }
        let group: BTreeSet<usize> = (0..n)
            .filter(|&other| reachable[start][other] && reachable[other][start])
            .collect();
        for &member in &group {
            seen[member] = true;
        }
        groups.push(group.into_iter().collect());
    }
    groups
}

/// Nodes reachable from `start` through at least one edge
fn reachable_from(start: usize, edges: &[Vec<usize>]) -> Vec<bool> {
    let mut visited = vec![false; edges.len()];
    let mut stack: Vec<usize> = edges[start].clone();
    while let Some(node) = stack.pop() {
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.extend(edges[node].iter().copied().filter(|&next| !visited[next]));
    }
    visited
}
