//! Reachability and convergence analysis over the edge table
//!
//! The adjacency used here contains static edges plus the declared targets
//! of conditional edges; the terminal is left out. Routers without declared
//! targets are handled by the compiler before this analysis runs.

use crate::graph::END;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub(crate) struct Topology {
    order: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: HashMap<String, Vec<String>>,
}

impl Topology {
    /// `order` is node registration order, used to break ties
    pub(crate) fn new(order: Vec<String>) -> Self {
        let index = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            order,
            index,
            adjacency: HashMap::new(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: &str, to: &str) {
        if to == END {
            return;
        }
        let targets = self.adjacency.entry(from.to_string()).or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_string());
        }
    }

    pub(crate) fn successors(&self, node: &str) -> &[String] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first distances from `start` (which is at distance 0)
    pub(crate) fn distances(&self, start: &str) -> HashMap<String, usize> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(start.to_string(), 0);
        queue.push_back(start.to_string());

        while let Some(node) = queue.pop_front() {
            let d = dist[&node];
            for next in self.successors(&node) {
                if !dist.contains_key(next) {
                    dist.insert(next.clone(), d + 1);
                    queue.push_back(next.clone());
                }
            }
        }
        dist
    }

    pub(crate) fn reachable_from(&self, start: &str) -> HashSet<String> {
        self.distances(start).into_keys().collect()
    }

    /// Whether `to` can be reached from `from` in zero or more steps
    pub(crate) fn reaches(&self, from: &str, to: &str) -> bool {
        from == to || self.distances(from).contains_key(to)
    }

    /// Nearest node every start can reach
    ///
    /// Candidates are ranked by their farthest distance from any start, then
    /// by total distance, then by registration order.
    pub(crate) fn find_join(&self, starts: &[String]) -> Option<String> {
        let starts: Vec<&String> = starts.iter().filter(|s| s.as_str() != END).collect();
        if starts.len() < 2 {
            return None;
        }

        let maps: Vec<HashMap<String, usize>> =
            starts.iter().map(|s| self.distances(s)).collect();

        self.order
            .iter()
            .filter_map(|candidate| {
                let mut max = 0;
                let mut sum = 0;
                for map in &maps {
                    let d = *map.get(candidate)?;
                    max = max.max(d);
                    sum += d;
                }
                Some((max, sum, self.index[candidate], candidate))
            })
            .min()
            .map(|(_, _, _, name)| name.clone())
    }
}
