// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! A transient graph over memory locations, built for one slicing query and then discarded.
//! An edge leads from a location to a location whose content it helped to compute. The
//! sinks of the graph are the locations on the current reduction frontier.

use crate::utils;
use crate::versioned_value::MemoryLocation;

use log_derive::logfn_inputs;
use mirai_annotations::*;
use petgraph::algo::is_cyclic_directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DefaultIx, NodeIndex};
use petgraph::{Direction, Graph};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

type NodeIdx = NodeIndex<DefaultIx>;

/// A location together with its distance from the sinks it supports.
#[derive(Clone, Debug)]
struct LocationNode {
    location: Rc<MemoryLocation>,
    level: i64,
}

/// Nodes are unique per location. Graph edges run from a node to its parents, i.e. from
/// the location that was computed to the locations it was computed from.
pub struct LocationGraph {
    graph: Graph<LocationNode, ()>,
    nodes: HashMap<Rc<MemoryLocation>, NodeIdx>,
    sinks: Vec<NodeIdx>,
}

impl Default for LocationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for LocationGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "LocationGraph({} nodes, {} sinks)",
            self.graph.node_count(),
            self.sinks.len()
        )
    }
}

impl LocationGraph {
    pub fn new() -> LocationGraph {
        LocationGraph {
            graph: Graph::<LocationNode, ()>::new(),
            nodes: HashMap::<Rc<MemoryLocation>, NodeIdx>::new(),
            sinks: Vec::new(),
        }
    }

    fn add_node(&mut self, location: &Rc<MemoryLocation>, level: i64) -> NodeIdx {
        let node_idx = self.graph.add_node(LocationNode {
            location: location.clone(),
            level,
        });
        self.nodes.insert(location.clone(), node_idx);
        node_idx
    }

    fn level(&self, node_idx: NodeIdx) -> i64 {
        self.graph[node_idx].level
    }

    /// Adds the location as a sink, unless it is already in the graph.
    #[logfn_inputs(TRACE)]
    pub fn add_new_sink(&mut self, candidate_sink: &Rc<MemoryLocation>) {
        if self.nodes.contains_key(candidate_sink) {
            return;
        }
        let node_idx = self.add_node(candidate_sink, 0);
        self.sinks.push(node_idx);
    }

    /// Records that the content of target depends on the content of source.
    /// A missing source is created one level above the target. A missing target is created
    /// as a sink one level below the source. An edge between two nodes that are both already
    /// in the graph is only added if the source is on a higher level than the target, so
    /// that the levels of the nodes are always a topological order of the graph.
    /// Returns true if the edge is in the graph afterwards.
    #[logfn_inputs(TRACE)]
    pub fn add_new_edge(
        &mut self,
        source: &Rc<MemoryLocation>,
        target: &Rc<MemoryLocation>,
    ) -> bool {
        if source == target {
            return false;
        }
        let existing_source = self.nodes.get(source).copied();
        let existing_target = self.nodes.get(target).copied();
        let (source_idx, target_idx) = match (existing_source, existing_target) {
            (Some(source_idx), Some(target_idx)) => {
                if self.level(target_idx) >= self.level(source_idx) {
                    debug!("rejecting edge {} -> {}", source, target);
                    return false;
                }
                (source_idx, target_idx)
            }
            (Some(source_idx), None) => {
                // Below the source rather than above the sinks, so levels stay a
                // topological order and the graph stays acyclic.
                let level = self.level(source_idx) - 1;
                let target_idx = self.add_node(target, level);
                self.sinks.push(target_idx);
                (source_idx, target_idx)
            }
            (None, Some(target_idx)) => {
                let level = self.level(target_idx) + 1;
                (self.add_node(source, level), target_idx)
            }
            (None, None) => {
                let target_idx = self.add_node(target, 0);
                self.sinks.push(target_idx);
                (self.add_node(source, 1), target_idx)
            }
        };
        verify!(self.level(source_idx) > self.level(target_idx));
        if !self.graph.contains_edge(target_idx, source_idx) {
            self.graph.add_edge(target_idx, source_idx, ());
        }
        true
    }

    fn parents(&self, node_idx: NodeIdx) -> Vec<NodeIdx> {
        let mut parents: Vec<NodeIdx> = self
            .graph
            .neighbors_directed(node_idx, Direction::Outgoing)
            .collect();
        // petgraph yields the most recently added edge first
        parents.reverse();
        parents
    }

    /// Removes the location from the sinks and makes its parents sinks instead.
    #[logfn_inputs(TRACE)]
    pub fn consume_sink_node(&mut self, location: &Rc<MemoryLocation>) {
        let Some(node_idx) = self.nodes.get(location).copied() else {
            return;
        };
        let Some(pos) = self.sinks.iter().position(|s| *s == node_idx) else {
            return;
        };
        self.sinks.remove(pos);
        for parent in self.parents(node_idx) {
            if !self.sinks.contains(&parent) {
                self.sinks.push(parent);
            }
        }
    }

    /// The sinks whose locations are in the given list.
    pub fn get_sinks_with_locations(
        &self,
        locations: &[Rc<MemoryLocation>],
    ) -> BTreeSet<Rc<MemoryLocation>> {
        let wanted: HashSet<&Rc<MemoryLocation>> = locations.iter().collect();
        self.sinks
            .iter()
            .map(|s| &self.graph[*s].location)
            .filter(|loc| wanted.contains(loc))
            .cloned()
            .collect()
    }

    /// Consumes sinks with the given locations until no sink has any of the locations.
    /// This terminates because a node is only promoted by one of its children, which are all
    /// on lower levels.
    #[logfn_inputs(TRACE)]
    pub fn consume_sinks_with_locations(&mut self, locations: &[Rc<MemoryLocation>]) {
        loop {
            let sink_locations = self.get_sinks_with_locations(locations);
            if sink_locations.is_empty() {
                return;
            }
            for location in sink_locations.iter() {
                self.consume_sink_node(location);
            }
        }
    }

    /// The locations on the current frontier.
    pub fn get_sink_locations(&self) -> BTreeSet<Rc<MemoryLocation>> {
        self.sinks
            .iter()
            .map(|s| self.graph[*s].location.clone())
            .collect()
    }

    pub fn contains(&self, location: &Rc<MemoryLocation>) -> bool {
        self.nodes.contains_key(location)
    }

    pub fn level_of(&self, location: &Rc<MemoryLocation>) -> Option<i64> {
        self.nodes.get(location).map(|n| self.level(*n))
    }

    /// The locations that location was computed from.
    pub fn parents_of(&self, location: &Rc<MemoryLocation>) -> Vec<Rc<MemoryLocation>> {
        match self.nodes.get(location) {
            Some(node_idx) => self
                .parents(*node_idx)
                .into_iter()
                .map(|p| self.graph[p].location.clone())
                .collect(),
            None => vec![],
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Renders the graph in Graphviz format.
    pub fn to_dot(&self) -> String {
        let labelled = self.graph.map(
            |_, node| format!("{} @{}", node.location, node.level),
            |_, _| (),
        );
        format!("{:?}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
    }
}

/// Prints every sink followed by the tree of locations it depends on. A location that has
/// been printed before is only named again.
impl Display for LocationGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut printed = HashSet::new();
        let mut stack: Vec<(NodeIdx, usize)> = self.sinks.iter().rev().map(|s| (*s, 0)).collect();
        while let Some((node_idx, depth)) = stack.pop() {
            write!(f, "{}{}", utils::make_tabs(depth), self.graph[node_idx].location)?;
            let parents = self.parents(node_idx);
            if printed.contains(&node_idx) {
                writeln!(f, " (printed)")?;
            } else if !parents.is_empty() {
                writeln!(f, " depends on")?;
                printed.insert(node_idx);
                stack.extend(parents.into_iter().rev().map(|p| (p, depth + 1)));
            } else {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
