use std::collections::{BTreeMap, BTreeSet};

use super::super::domain::CourseId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// First prerequisite cycle found by depth-first search, as the path that closes it.
///
/// The returned path starts and ends with the same course. Edges pointing at
/// courses absent from `edges` are treated as leaves.
pub(crate) fn find_cycle(edges: &BTreeMap<CourseId, BTreeSet<CourseId>>) -> Option<Vec<CourseId>> {
    let mut marks: BTreeMap<CourseId, Mark> = BTreeMap::new();
    let mut path = Vec::new();

    for &start in edges.keys() {
        if marks.contains_key(&start) {
            continue;
        }
        if let Some(cycle) = visit(start, edges, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    node: CourseId,
    edges: &BTreeMap<CourseId, BTreeSet<CourseId>>,
    marks: &mut BTreeMap<CourseId, Mark>,
    path: &mut Vec<CourseId>,
) -> Option<Vec<CourseId>> {
    marks.insert(node, Mark::Visiting);
    path.push(node);

    for &next in edges.get(&node).into_iter().flatten() {
        match marks.get(&next) {
            Some(Mark::Visiting) => {
                let start = path.iter().position(|id| *id == next).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(next, edges, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    None
}
