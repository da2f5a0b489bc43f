//! Graph utilities for workflow analysis
//!
//! Reachability over places and cycle detection over the automatic
//! `next` chain. Inline chains that loop are only stopped by the dispatcher's
//! chain depth limit, so the compiler reports them up front.

use super::{PlaceName, TransitionName, WorkflowDefinition};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Analyzes workflow graph structure
pub struct WorkflowGraphAnalyzer<'a> {
    workflow: &'a WorkflowDefinition,
}

impl<'a> WorkflowGraphAnalyzer<'a> {
    /// Creates a new graph analyzer for the given workflow
    pub fn new(workflow: &'a WorkflowDefinition) -> Self {
        Self { workflow }
    }

    /// Finds all places reachable from the given starting places
    pub fn find_reachable_places<'p>(
        &self,
        from: impl IntoIterator<Item = &'p PlaceName>,
    ) -> HashSet<PlaceName> {
        let mut reachable = HashSet::new();
        let mut to_visit: VecDeque<PlaceName> = from.into_iter().cloned().collect();

        while let Some(place) = to_visit.pop_front() {
            if !reachable.insert(place.clone()) {
                continue;
            }
            for transition in &self.workflow.transitions {
                if transition.from.contains(&place) {
                    to_visit.extend(transition.to.iter().cloned());
                }
            }
        }

        reachable
    }

    /// Finds all places a fresh entity can never reach
    pub fn find_unreachable_places(&self) -> Vec<PlaceName> {
        let reachable = self.find_reachable_places(&self.workflow.initial_marking);

        self.workflow
            .places
            .iter()
            .map(|p| &p.name)
            .filter(|name| !reachable.contains(*name))
            .cloned()
            .collect()
    }

    /// `next` references that name no transition of this workflow
    pub fn find_dangling_next(&self) -> Vec<TransitionName> {
        let place_refs = self.workflow.places.iter().flat_map(|p| &p.metadata.next);
        let transition_refs = self
            .workflow
            .transitions
            .iter()
            .flat_map(|t| &t.metadata.next);

        let mut dangling = Vec::new();
        for name in place_refs.chain(transition_refs) {
            if self.workflow.transition(name).is_none() && !dangling.contains(name) {
                dangling.push(name.clone());
            }
        }
        dangling
    }

    /// Edges of the inline auto-advance graph.
    ///
    /// `a -> b` when `b` is a candidate right after `a` completes, either from
    /// `a`'s own `next` or from the `next` of a place `a` enters. Queue-backed
    /// transitions end an inline chain and carry no outgoing edges.
    pub fn build_chain_adjacency(&self) -> BTreeMap<TransitionName, Vec<TransitionName>> {
        let mut adjacency = BTreeMap::new();

        for transition in &self.workflow.transitions {
            let mut successors = Vec::new();
            if !transition.is_async() {
                let entered = transition
                    .to
                    .iter()
                    .filter_map(|p| self.workflow.place(p))
                    .flat_map(|p| &p.metadata.next);
                for name in entered.chain(&transition.metadata.next) {
                    if self.workflow.transition(name).is_some() && !successors.contains(name) {
                        successors.push(name.clone());
                    }
                }
            }
            adjacency.insert(transition.name.clone(), successors);
        }

        adjacency
    }

    /// Detects cycles in the inline auto-advance graph
    pub fn detect_chain_cycles(&self) -> Vec<Vec<TransitionName>> {
        let adjacency = self.build_chain_adjacency();
        let mut cycles = Vec::new();
        let mut finished = HashSet::new();

        for start in adjacency.keys() {
            let mut path = Vec::new();
            self.cycle_dfs(start, &adjacency, &mut path, &mut finished, &mut cycles);
        }

        cycles
    }

    fn cycle_dfs(
        &self,
        node: &TransitionName,
        adjacency: &BTreeMap<TransitionName, Vec<TransitionName>>,
        path: &mut Vec<TransitionName>,
        finished: &mut HashSet<TransitionName>,
        cycles: &mut Vec<Vec<TransitionName>>,
    ) {
        if finished.contains(node) {
            return;
        }
        if let Some(pos) = path.iter().position(|n| n == node) {
            cycles.push(path[pos..].to_vec());
            return;
        }

        path.push(node.clone());
        if let Some(successors) = adjacency.get(node) {
            for next in successors {
                self.cycle_dfs(next, adjacency, path, finished, cycles);
            }
        }
        path.pop();
        finished.insert(node.clone());
    }
}
