use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::common::{Capacity, Excess, NodeId};
use crate::error::{MatchingError, Result};

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct FlowArc {
    pub capacity: Capacity,
    pub flow: Capacity,
    // units of flow that may not be cancelled, pinned <= flow
    pub pinned: Capacity,
}

impl FlowArc {
    pub fn residual(&self) -> Capacity {
        self.capacity - self.flow
    }
    pub fn cancellable(&self) -> Capacity {
        self.flow - self.pinned
    }
}

/// Directed graph with a capacity and a flow on every arc.
///
/// Arcs are created the first time their capacity is set and never removed.
/// Adjacency queries work on the residual graph: `y` is a successor of `x` when
/// more flow can be sent along `x -> y`, or when flow already sent along
/// `y -> x` can be cancelled.
#[derive(Clone, Debug)]
pub struct FlowNetwork<N: NodeId> {
    source: N,
    sink: N,
    arcs: HashMap<N, HashMap<N, FlowArc>>,
    incoming: HashMap<N, HashSet<N>>,
}

impl<N: NodeId> FlowNetwork<N> {
    pub fn new(source: N, sink: N) -> Result<Self> {
        if source == sink {
            return Err(MatchingError::InvalidArgument(format!(
                "source and sink are the same node {:?}",
                source
            )));
        }
        let mut incoming = HashMap::new();
        incoming.insert(source.clone(), HashSet::new());
        incoming.insert(sink.clone(), HashSet::new());
        let mut arcs = HashMap::new();
        arcs.insert(source.clone(), HashMap::new());
        arcs.insert(sink.clone(), HashMap::new());
        Ok(FlowNetwork {
            source,
            sink,
            arcs,
            incoming,
        })
    }
    pub fn source(&self) -> &N {
        &self.source
    }
    pub fn sink(&self) -> &N {
        &self.sink
    }
    pub fn is_terminal(&self, node: &N) -> bool {
        node == &self.source || node == &self.sink
    }
    pub fn nodes(&self) -> impl Iterator<Item = &N> + '_ {
        self.arcs.keys()
    }
    pub fn node_count(&self) -> usize {
        self.arcs.len()
    }
    pub fn arc(&self, origin: &N, destination: &N) -> Option<&FlowArc> {
        self.arcs.get(origin).and_then(|out| out.get(destination))
    }
    pub fn contains_arc(&self, origin: &N, destination: &N) -> bool {
        self.arc(origin, destination).is_some()
    }
    pub fn arcs(&self) -> impl Iterator<Item = (&N, &N, &FlowArc)> + '_ {
        self.arcs
            .iter()
            .flat_map(|(origin, out)| out.iter().map(move |(dest, arc)| (origin, dest, arc)))
    }
    pub fn out_arcs(&self, origin: &N) -> impl Iterator<Item = (&N, &FlowArc)> + '_ {
        self.arcs.get(origin).into_iter().flat_map(|out| out.iter())
    }
    pub(crate) fn arcs_mut(&mut self) -> impl Iterator<Item = (&N, &N, &mut FlowArc)> + '_ {
        self.arcs
            .iter_mut()
            .flat_map(|(origin, out)| out.iter_mut().map(move |(dest, arc)| (origin, dest, arc)))
    }
    /// Creates the arc if it does not exist yet, otherwise overwrites its capacity.
    pub fn set_arc_capacity(&mut self, capacity: Capacity, origin: &N, destination: &N) -> Result<()> {
        if origin == destination {
            return Err(MatchingError::InvalidArgument(format!(
                "self loop on {:?}",
                origin
            )));
        }
        let flow = self.arc_flow(origin, destination);
        if capacity < flow {
            return Err(MatchingError::InvalidArgument(format!(
                "capacity {} of {:?} -> {:?} is below its flow {}",
                capacity, origin, destination, flow
            )));
        }
        self.add_node(origin);
        self.add_node(destination);
        self.arcs
            .entry(origin.clone())
            .or_default()
            .entry(destination.clone())
            .or_default()
            .capacity = capacity;
        self.incoming
            .entry(destination.clone())
            .or_default()
            .insert(origin.clone());
        Ok(())
    }
    fn add_node(&mut self, node: &N) {
        if let Entry::Vacant(entry) = self.arcs.entry(node.clone()) {
            entry.insert(HashMap::new());
            self.incoming.insert(node.clone(), HashSet::new());
        }
    }
    pub fn arc_capacity(&self, origin: &N, destination: &N) -> Capacity {
        self.arc(origin, destination).map_or(0, |arc| arc.capacity)
    }
    pub fn arc_flow(&self, origin: &N, destination: &N) -> Capacity {
        self.arc(origin, destination).map_or(0, |arc| arc.flow)
    }
    pub fn pinned_flow(&self, origin: &N, destination: &N) -> Capacity {
        self.arc(origin, destination).map_or(0, |arc| arc.pinned)
    }
    /// Free capacity of `origin -> destination` plus the cancellable flow of
    /// `destination -> origin`.
    pub fn residual_capacity(&self, origin: &N, destination: &N) -> Capacity {
        let forward = self.arc(origin, destination).map_or(0, |arc| arc.residual());
        let backward = self
            .arc(destination, origin)
            .map_or(0, |arc| arc.cancellable());
        forward.saturating_add(backward)
    }
    pub fn successors(&self, node: &N) -> HashSet<N> {
        let mut out: HashSet<N> = self
            .out_arcs(node)
            .filter(|(_, arc)| arc.residual() > 0)
            .map(|(dest, _)| dest.clone())
            .collect();
        if let Some(origins) = self.incoming.get(node) {
            out.extend(
                origins
                    .iter()
                    .filter(|origin| self.arc(origin, node).map_or(false, |arc| arc.cancellable() > 0))
                    .cloned(),
            );
        }
        out
    }
    pub fn predecessors(&self, node: &N) -> HashSet<N> {
        let mut out: HashSet<N> = self
            .incoming
            .get(node)
            .into_iter()
            .flatten()
            .filter(|origin| self.arc(origin, node).map_or(false, |arc| arc.residual() > 0))
            .cloned()
            .collect();
        out.extend(
            self.out_arcs(node)
                .filter(|(_, arc)| arc.cancellable() > 0)
                .map(|(dest, _)| dest.clone()),
        );
        out
    }
    /// Sends `amount` from `origin` to `destination`, cancelling reverse flow
    /// before using forward capacity. Caller checks the residual capacity.
    pub(crate) fn augment(&mut self, amount: Capacity, origin: &N, destination: &N) {
        let mut rest = amount;
        if let Some(reverse) = self
            .arcs
            .get_mut(destination)
            .and_then(|out| out.get_mut(origin))
        {
            let cancelled = rest.min(reverse.cancellable());
            reverse.flow -= cancelled;
            rest -= cancelled;
        }
        if rest > 0 {
            if let Some(forward) = self
                .arcs
                .get_mut(origin)
                .and_then(|out| out.get_mut(destination))
            {
                debug_assert!(rest <= forward.residual());
                forward.flow += rest;
            }
        }
    }
    pub(crate) fn pin(&mut self, amount: Capacity, origin: &N, destination: &N) -> Result<()> {
        let Some(arc) = self
            .arcs
            .get_mut(origin)
            .and_then(|out| out.get_mut(destination)) else {
            return Err(MatchingError::InvalidArgument(format!(
                "no arc {:?} -> {:?}",
                origin, destination
            )));
        };
        if arc.cancellable() < amount {
            return Err(MatchingError::CapacityViolation {
                origin: format!("{:?}", origin),
                destination: format!("{:?}", destination),
                amount,
                residual: arc.cancellable(),
            });
        }
        arc.pinned += amount;
        Ok(())
    }
    /// Net flow leaving `node`.
    pub fn net_outflow(&self, node: &N) -> Excess {
        let out: Excess = self.out_arcs(node).map(|(_, arc)| Excess::from(arc.flow)).sum();
        let inflow: Excess = self
            .incoming
            .get(node)
            .into_iter()
            .flatten()
            .map(|origin| Excess::from(self.arc_flow(origin, node)))
            .sum();
        out - inflow
    }
}
