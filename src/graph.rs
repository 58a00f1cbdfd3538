// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::collections::HashMap;
use std::sync::Arc;

/// A directed graph of named nodes.  Edges point from a dependent node to
/// the node it depends on.
pub struct Graph {
    nodes: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, name: &str) {
        self.ensure_node(name);
    }

    fn ensure_node(&mut self, name: &str) -> usize {
        match self.index.get(name) {
            Some(id) => *id,
            None => {
                let id = self.nodes.len();
                let name: Arc<str> = Arc::from(name);
                self.nodes.push(name.clone());
                self.index.insert(name, id);
                self.edges.push(Vec::new());
                id
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add an edge from a dependent to its dependency.  Missing endpoints
    /// are added as nodes.  Duplicate edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_id = self.ensure_node(from);
        let to_id = self.ensure_node(to);
        if !self.edges[from_id].contains(&to_id) {
            self.edges[from_id].push(to_id);
        }
    }

    /// Remove an edge.  Returns false if the edge was not present.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let (from_id, to_id) = match (self.index.get(from), self.index.get(to)) {
            (Some(f), Some(t)) => (*f, *t),
            _ => return false,
        };
        match self.edges[from_id].iter().position(|id| *id == to_id) {
            Some(pos) => {
                self.edges[from_id].remove(pos);
                true
            }
            None => false,
        }
    }

    /// Nodes in dependency-first order: every node appears after all of the
    /// nodes it has edges to.  When a root is given, the result is limited
    /// to nodes reachable from it.  Nodes that become ready at the same
    /// level are emitted in insertion order, so repeated runs produce the
    /// same order.
    ///
    /// Nodes on a cycle are never ready and are omitted; run `detect_cycle`
    /// first to reject cyclic graphs.
    pub fn topological_sort(&self, root: Option<&str>) -> Vec<Arc<str>> {
        let included = match root {
            Some(root) => match self.index.get(root) {
                Some(root_id) => self.reachable_from(*root_id),
                None => return Vec::new(),
            },
            None => vec![true; self.nodes.len()],
        };

        let mut emitted = vec![false; self.nodes.len()];
        let mut result = Vec::new();
        loop {
            let mut progressed = false;
            for id in 0..self.nodes.len() {
                if !included[id] || emitted[id] {
                    continue;
                }
                let ready = self.edges[id]
                    .iter()
                    .all(|dep| !included[*dep] || emitted[*dep]);
                if ready {
                    emitted[id] = true;
                    result.push(self.nodes[id].clone());
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        result
    }

    fn reachable_from(&self, root_id: usize) -> Vec<bool> {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![root_id];
        while let Some(id) = stack.pop() {
            if reachable[id] {
                continue;
            }
            reachable[id] = true;
            for dep in &self.edges[id] {
                stack.push(*dep);
            }
        }
        reachable
    }

    /// Depth-first cycle search.  Returns the back edge that closes a cycle,
    /// or None if the graph is acyclic.
    pub fn detect_cycle(&self) -> Option<(Arc<str>, Arc<str>)> {
        let mut marks = vec![Mark::White; self.nodes.len()];
        for id in 0..self.nodes.len() {
            if marks[id] == Mark::White {
                if let Some((from, to)) = self.find_back_edge(id, &mut marks) {
                    return Some((self.nodes[from].clone(), self.nodes[to].clone()));
                }
            }
        }
        None
    }

    fn find_back_edge(&self, id: usize, marks: &mut Vec<Mark>) -> Option<(usize, usize)> {
        marks[id] = Mark::Gray;
        for dep in &self.edges[id] {
            match marks[*dep] {
                Mark::Gray => return Some((id, *dep)),
                Mark::White => {
                    let back_edge = self.find_back_edge(*dep, marks);
                    if back_edge.is_some() {
                        return back_edge;
                    }
                }
                Mark::Black => {}
            }
        }
        marks[id] = Mark::Black;
        None
    }
}

impl Default for Graph {
    fn default() -> Graph {
        Graph::new()
    }
}
