//! Foreign-key dependency graph between tables

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// `table` holds a foreign key referencing `references`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub references: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            references: references.into(),
        }
    }
}

/// Directed graph of table dependencies
///
/// Edges run from the referenced table to the referencing one, so a
/// topological walk yields parents before children.
#[derive(Debug)]
pub struct TableDag {
    graph: DiGraph<String, ()>,
    /// Position of each table in the caller's preferred order
    rank: HashMap<String, usize>,
}

impl TableDag {
    /// Build the graph for `tables`. Keys referencing tables outside the
    /// set, and self-references, are ignored.
    pub fn build(tables: &[String], foreign_keys: &[ForeignKey]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut rank = HashMap::new();

        for (i, table) in tables.iter().enumerate() {
            if node_map.contains_key(table) {
                continue;
            }
            let idx = graph.add_node(table.clone());
            node_map.insert(table.clone(), idx);
            rank.insert(table.clone(), i);
        }

        let mut seen = HashSet::new();
        for fk in foreign_keys {
            if fk.table == fk.references || !seen.insert(fk) {
                continue;
            }
            if let (Some(&child), Some(&parent)) =
                (node_map.get(&fk.table), node_map.get(&fk.references))
            {
                graph.add_edge(parent, child, ());
            }
        }

        let dag = Self { graph, rank };
        dag.validate()?;
        Ok(dag)
    }

    /// Fail with the offending path when the graph has a cycle
    pub fn validate(&self) -> Result<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(Error::DependencyCycle(self.find_cycle_path(cycle.node_id()))),
        }
    }

    /// Shortest cycle through `start`, searched only inside its strongly
    /// connected component
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let component: HashSet<NodeIndex> = kosaraju_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.contains(&start))
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut last = None;
        'search: while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if next == start {
                    last = Some(node);
                    break 'search;
                }
                if component.contains(&next) && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![start];
        let mut current = last;
        while let Some(node) = current.filter(|&n| n != start) {
            path.push(node);
            current = parent.get(&node).copied();
        }
        path[1..].reverse();
        path.push(start);

        path.iter()
            .map(|&idx| self.graph[idx].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Tables with parents first; among tables that are ready at the same
    /// time, the one listed first in the input wins
    pub fn ordered(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut ready: BTreeSet<(usize, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&idx, _)| (self.rank[&self.graph[idx]], idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(next) = ready.iter().next().copied() {
            ready.remove(&next);
            let (_, idx) = next;
            order.push(self.graph[idx].clone());

            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let child = edge.target();
                if let Some(deg) = in_degree.get_mut(&child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((self.rank[&self.graph[child]], child));
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            self.validate()?;
        }
        Ok(order)
    }

}
