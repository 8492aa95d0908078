use std::collections::{HashMap, HashSet};

use crate::log::Trid;

/// Tracks which transaction waits for which, keyed by `trid`.
///
/// Reallocated whenever the transaction table grows (spec §4.2): the
/// table and this graph are sized together since descriptor indices
/// and trids are both bounded by the same capacity.
pub struct WaitForGraph {
    graph: HashMap<Trid, HashSet<Trid>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self {
            graph: HashMap::new(),
        }
    }

    pub fn add_edge(&mut self, from: Trid, to: Trid) {
        self.graph.entry(from).or_insert_with(HashSet::new).insert(to);
    }

    pub fn remove_edge(&mut self, from: Trid, to: Trid) {
        if let Some(transactions) = self.graph.get_mut(&from) {
            transactions.remove(&to);
        }
    }

    pub fn get_waiting_transactions(&self, trid: Trid) -> Option<&HashSet<Trid>> {
        self.graph.get(&trid)
    }

    pub fn remove_transaction(&mut self, trid: Trid) {
        self.graph.remove(&trid);
        for waiters in self.graph.values_mut() {
            waiters.remove(&trid);
        }
    }

    /// Check if there is a cycle in the wait-for graph.
    pub fn exists_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for &trid in self.graph.keys() {
            if self.is_cyclic(trid, &mut visited, &mut rec_stack) {
                return true;
            }
        }

        false
    }

    fn is_cyclic(&self, trid: Trid, visited: &mut HashSet<Trid>, rec_stack: &mut HashSet<Trid>) -> bool {
        if !visited.contains(&trid) {
            visited.insert(trid);
            rec_stack.insert(trid);

            if let Some(transactions) = self.graph.get(&trid) {
                for &t in transactions {
                    if !visited.contains(&t) && self.is_cyclic(t, visited, rec_stack) {
                        return true;
                    } else if rec_stack.contains(&t) {
                        return true;
                    }
                }
            }
        }

        rec_stack.remove(&trid);
        false
    }
}

impl Default for WaitForGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_simple_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        assert!(graph.exists_cycle());
    }

    #[test]
    fn no_cycle_in_chain() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 3);
        assert!(!graph.exists_cycle());
    }

    #[test]
    fn remove_transaction_clears_incoming_edges() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(1, 2);
        graph.remove_transaction(2);
        assert!(graph.get_waiting_transactions(1).map_or(true, |s| s.is_empty()));
    }
}
