//! # Descriptor validation and stage assignment.
//!
//! ```text
//! resolve(descriptors)
//!   1. duplicate names            ──► RegistrationError::DuplicateName
//!   2. REQUIRED target missing    ──► RegistrationError::DependencyMissing
//!      OPTIONAL target missing    ──► warn, edge dropped
//!      RUNTIME target missing     ──► kept, checked lazily
//!   3. every elementary cycle over REQUIRED+OPTIONAL edges
//!                                 ──► RegistrationError::Cycle
//!   4. level(s) = 0 if no ordering deps, else 1 + max(level(dep))
//!   5. stages grouped by level, names sorted
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{DependencyMissingError, RegistrationError};
use crate::services::{DependencyKind, ServiceDescriptor};

use super::StagePlan;

/// Validates `descriptors` and computes their startup stages.
pub fn resolve(descriptors: &[ServiceDescriptor]) -> Result<StagePlan, RegistrationError> {
    let mut names: HashSet<&str> = HashSet::with_capacity(descriptors.len());
    for d in descriptors {
        if !names.insert(d.name()) {
            return Err(RegistrationError::DuplicateName {
                name: d.name().to_string(),
            });
        }
    }

    let mut plan = StagePlan {
        order: descriptors.iter().map(|d| d.name().to_string()).collect(),
        ..StagePlan::default()
    };

    for d in descriptors {
        let mut kept = Vec::with_capacity(d.dependencies().len());
        for edge in d.dependencies() {
            if names.contains(edge.target.as_str()) {
                plan.dependents
                    .entry(edge.target.clone())
                    .or_default()
                    .push((d.name().to_string(), edge.kind));
                kept.push(edge.clone());
                continue;
            }
            match edge.kind {
                DependencyKind::Required => {
                    let mut known: Vec<String> = names.iter().map(|n| n.to_string()).collect();
                    known.sort();
                    return Err(DependencyMissingError {
                        service: d.name().to_string(),
                        dependency: edge.target.clone(),
                        known,
                    }
                    .into());
                }
                DependencyKind::Optional => {
                    warn!(
                        service = d.name(),
                        dependency = %edge.target,
                        "optional dependency is not registered; edge ignored"
                    );
                    plan.dropped_optional
                        .push((d.name().to_string(), edge.target.clone()));
                }
                DependencyKind::Runtime => {
                    debug!(
                        service = d.name(),
                        dependency = %edge.target,
                        "runtime dependency is not registered; will be checked on use"
                    );
                    kept.push(edge.clone());
                }
            }
        }
        plan.edges.insert(d.name().to_string(), kept);
    }

    let graph: BTreeMap<&str, Vec<&str>> = plan
        .order
        .iter()
        .map(|name| {
            let mut targets: Vec<&str> = plan.edges[name]
                .iter()
                .filter(|e| e.kind.orders_startup())
                .map(|e| e.target.as_str())
                .collect();
            targets.sort_unstable();
            (name.as_str(), targets)
        })
        .collect();

    let cycles = find_cycles(&graph);
    if !cycles.is_empty() {
        return Err(RegistrationError::Cycle { cycles });
    }

    let mut levels: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
    for &name in graph.keys() {
        level_of(name, &graph, &mut levels);
    }

    let depth = levels.values().copied().max().map_or(0, |m| m + 1);
    let mut stages: Vec<Vec<String>> = vec![Vec::new(); depth];
    for (name, level) in &levels {
        stages[*level].push(name.to_string());
    }
    for stage in &mut stages {
        stage.sort();
    }

    plan.stage_of = levels
        .into_iter()
        .map(|(n, l)| (n.to_string(), l))
        .collect();
    plan.stages = stages;
    Ok(plan)
}

/// Longest-path level of `name`. The graph must be acyclic.
fn level_of<'a>(
    name: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    levels: &mut HashMap<&'a str, usize>,
) -> usize {
    if let Some(&l) = levels.get(name) {
        return l;
    }
    let deps = graph.get(name).map(Vec::as_slice).unwrap_or(&[]);
    let level = deps
        .iter()
        .map(|&dep| level_of(dep, graph, levels) + 1)
        .max()
        .unwrap_or(0);
    levels.insert(name, level);
    level
}

/// Every elementary cycle over the ordering edges.
///
/// For each start node, in name order, a depth-first search with a recursion
/// stack follows only nodes named after the start that can still reach it.
/// Each cycle is therefore found once, from its smallest name, and closed by
/// repeating that name, e.g. `[a, b, c, a]`.
pub(crate) fn find_cycles<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Vec<Vec<String>> {
    let mut reverse: HashMap<&'a str, Vec<&'a str>> = HashMap::with_capacity(graph.len());
    for (&from, targets) in graph {
        for &to in targets {
            reverse.entry(to).or_default().push(from);
        }
    }

    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();
    for &start in graph.keys() {
        let reach = reaching(start, &reverse);
        let mut path = vec![start];
        let mut on_path = HashSet::from([start]);
        walk(start, start, graph, &reach, &mut path, &mut on_path, &mut found);
    }
    found.into_iter().collect()
}

/// Nodes named after `start` that reach it through such nodes.
fn reaching<'a>(start: &'a str, reverse: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for &prev in reverse.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            if prev > start && seen.insert(prev) {
                stack.push(prev);
            }
        }
    }
    seen
}

fn walk<'a>(
    start: &'a str,
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    reach: &HashSet<&'a str>,
    path: &mut Vec<&'a str>,
    on_path: &mut HashSet<&'a str>,
    found: &mut BTreeSet<Vec<String>>,
) {
    for &next in graph.get(node).map(Vec::as_slice).unwrap_or(&[]) {
        if next == start {
            found.insert(canonical_cycle(path));
        } else if reach.contains(next) && on_path.insert(next) {
            path.push(next);
            walk(start, next, graph, reach, path, on_path, found);
            path.pop();
            on_path.remove(next);
        }
    }
}

fn canonical_cycle(members: &[&str]) -> Vec<String> {
    let start = members
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map_or(0, |(i, _)| i);
    let mut out: Vec<String> = members[start..]
        .iter()
        .chain(&members[..start])
        .map(|n| n.to_string())
        .collect();
    if let Some(first) = out.first().cloned() {
        out.push(first);
    }
    out
}
