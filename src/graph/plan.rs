use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::services::{DependencyEdge, DependencyKind};

/// Validated dependency graph with its startup stages.
///
/// Produced by [`resolve`](super::resolve); immutable afterwards.
/// Stage `n` contains every service whose longest chain of REQUIRED/OPTIONAL
/// dependencies has `n` edges. Names within a stage are sorted.
#[derive(Clone, Debug, Default)]
pub struct StagePlan {
    pub(super) stages: Vec<Vec<String>>,
    pub(super) stage_of: HashMap<String, usize>,
    pub(super) order: Vec<String>,
    pub(super) edges: HashMap<String, Vec<DependencyEdge>>,
    pub(super) dependents: HashMap<String, Vec<(String, DependencyKind)>>,
    pub(super) dropped_optional: Vec<(String, String)>,
}

impl StagePlan {
    /// Stages in startup order.
    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    /// Number of stages; equals the node count of the longest ordering chain.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage index of a service.
    pub fn stage_of(&self, service: &str) -> Option<usize> {
        self.stage_of.get(service).copied()
    }

    /// `true` if the service is part of the plan.
    pub fn contains(&self, service: &str) -> bool {
        self.stage_of.contains_key(service)
    }

    /// Service names in registration order.
    pub fn services(&self) -> &[String] {
        &self.order
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` when the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolved outgoing edges of a service.
    ///
    /// OPTIONAL edges to unregistered services have been removed; RUNTIME
    /// edges are kept as declared.
    pub fn dependencies_of(&self, service: &str) -> &[DependencyEdge] {
        self.edges.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets of the service's edges of one kind.
    pub fn dependencies_of_kind<'a>(
        &'a self,
        service: &str,
        kind: DependencyKind,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.dependencies_of(service)
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.target.as_str())
    }

    /// OPTIONAL edges dropped because their target was never registered, as `(service, target)`.
    pub fn dropped_optional(&self) -> &[(String, String)] {
        &self.dropped_optional
    }

    /// Services with an edge of one of `kinds` pointing at `service`. Sorted.
    pub fn direct_dependents(&self, service: &str, kinds: &[DependencyKind]) -> Vec<String> {
        let mut out: Vec<String> = self
            .dependents
            .get(service)
            .into_iter()
            .flatten()
            .filter(|(_, k)| kinds.contains(k))
            .map(|(n, _)| n.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Every service reachable backwards from `service` over `kinds`. Sorted, excludes `service`.
    pub fn transitive_dependents(&self, service: &str, kinds: &[DependencyKind]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([service.to_string()]);
        while let Some(current) = queue.pop_front() {
            for dep in self.direct_dependents(&current, kinds) {
                if dep != service && seen.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// `true` if some service depends on `service` through a REQUIRED edge.
    pub fn has_required_dependents(&self, service: &str) -> bool {
        self.dependents
            .get(service)
            .is_some_and(|d| d.iter().any(|(_, k)| *k == DependencyKind::Required))
    }

    /// One longest chain of ordering (REQUIRED/OPTIONAL) edges, root first.
    ///
    /// Its length is [`stage_count`](Self::stage_count).
    pub fn longest_chain(&self) -> Vec<String> {
        let Some(mut current) = self.stages.last().and_then(|s| s.first()).cloned() else {
            return Vec::new();
        };
        let mut chain = vec![current.clone()];
        while let Some(stage) = self.stage_of(&current).filter(|s| *s > 0) {
            let prev = self
                .dependencies_of(&current)
                .iter()
                .filter(|e| e.kind.orders_startup())
                .find(|e| self.stage_of(&e.target) == Some(stage - 1))
                .map(|e| e.target.clone());
            match prev {
                Some(prev) => {
                    chain.push(prev.clone());
                    current = prev;
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Shutdown order: stages in reverse, and within a stage the services that
    /// started in reverse start order (`start_log`), followed by the ones that
    /// never started.
    pub fn shutdown_order(&self, start_log: &[String]) -> Vec<String> {
        let position: HashMap<&str, usize> = start_log
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut out = Vec::with_capacity(self.order.len());
        for stage in self.stages.iter().rev() {
            let mut started: Vec<&String> = stage
                .iter()
                .filter(|n| position.contains_key(n.as_str()))
                .collect();
            started.sort_by_key(|n| std::cmp::Reverse(position[n.as_str()]));
            out.extend(started.into_iter().cloned());
            out.extend(
                stage
                    .iter()
                    .rev()
                    .filter(|n| !position.contains_key(n.as_str()))
                    .cloned(),
            );
        }
        out
    }
}
