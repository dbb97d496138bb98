use log::{debug, trace, warn};
use pathfinding::prelude::{bfs, dijkstra_all};
use std::collections::HashMap;

use crate::active_nodes::{ActiveNodeOrder, ActiveNodes};
use crate::common::{Capacity, Excess, NodeId};
use crate::error::{MatchingError, Result};
use crate::flow_network::FlowNetwork;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverConfig {
    pub active_order: ActiveNodeOrder,
}

/// Snapshot of everything the solver changes: flow (and pinned flow) on every
/// arc, plus excess and height of every node. Capacities are not included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverState<N: NodeId> {
    flows: HashMap<(N, N), (Capacity, Capacity)>,
    excess: HashMap<N, Excess>,
    heights: HashMap<N, usize>,
}

impl<N: NodeId> SolverState<N> {
    pub(crate) fn flow(&self, origin: &N, destination: &N) -> Capacity {
        self.flows
            .get(&(origin.clone(), destination.clone()))
            .map_or(0, |(flow, _)| *flow)
    }
}

/// Preflow-push maximum flow over a [`FlowNetwork`].
///
/// The solver owns the network so that excesses and flows cannot drift apart.
/// Capacities are edited through [`PushRelabelMaxFlow::network_mut`]; raising a
/// capacity on an arc out of the source is picked up by the next
/// [`PushRelabelMaxFlow::preflow_push`].
#[derive(Clone, Debug)]
pub struct PushRelabelMaxFlow<N: NodeId> {
    network: FlowNetwork<N>,
    excess: HashMap<N, Excess>,
    heights: HashMap<N, usize>,
    config: SolverConfig,
}

impl<N: NodeId> PushRelabelMaxFlow<N> {
    pub fn new(network: FlowNetwork<N>) -> Self {
        Self::with_config(network, SolverConfig::default())
    }
    pub fn with_config(network: FlowNetwork<N>, config: SolverConfig) -> Self {
        PushRelabelMaxFlow {
            network,
            excess: HashMap::new(),
            heights: HashMap::new(),
            config,
        }
    }
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }
    pub fn network(&self) -> &FlowNetwork<N> {
        &self.network
    }
    pub fn network_mut(&mut self) -> &mut FlowNetwork<N> {
        &mut self.network
    }
    pub fn height(&self, node: &N) -> usize {
        *self.heights.get(node).unwrap_or(&0)
    }
    pub fn excess(&self, node: &N) -> Excess {
        *self.excess.get(node).unwrap_or(&0)
    }
    /// Net flow currently leaving the source.
    pub fn max_flow_value(&self) -> Excess {
        self.network.net_outflow(self.network.source())
    }
    fn is_active(&self, node: &N) -> bool {
        !self.network.is_terminal(node) && self.excess(node) > 0
    }
    fn sink_reachable(&self) -> bool {
        let sink = self.network.sink();
        bfs(
            self.network.source(),
            |node| self.network.successors(node),
            |node| node == sink,
        )
        .is_some()
    }
    /// Runs push-relabel until no node holds excess. Does nothing when no node
    /// is active and no augmenting path is left, so a second call in a row
    /// leaves the state untouched.
    pub fn preflow_push(&mut self) {
        if !self.excess.keys().any(|node| self.is_active(node)) && !self.sink_reachable() {
            debug!("flow is already maximum, value {}", self.max_flow_value());
            return;
        }
        self.saturate_source_arcs();
        let pending: Vec<N> = self
            .excess
            .keys()
            .filter(|node| self.is_active(node))
            .cloned()
            .collect();
        if pending.is_empty() {
            debug!("no active nodes, flow value {}", self.max_flow_value());
            return;
        }
        self.global_relabel();
        let mut active = ActiveNodes::new(self.config.active_order);
        for node in pending {
            let height = self.height(&node);
            active.push(node, height);
        }
        debug!(
            "preflow push on {} nodes, {} active",
            self.network.node_count(),
            active.len()
        );
        let mut discharges = 0usize;
        while let Some(node) = active.pop() {
            self.discharge(&node, &mut active);
            discharges += 1;
        }
        debug!(
            "preflow push done after {} discharges, flow value {}",
            discharges,
            self.max_flow_value()
        );
    }
    fn saturate_source_arcs(&mut self) {
        let source = self.network.source().clone();
        self.heights.insert(source.clone(), self.network.node_count());
        let targets: Vec<(N, Capacity)> = self
            .network
            .out_arcs(&source)
            .filter(|(_, arc)| arc.residual() > 0)
            .map(|(node, arc)| (node.clone(), arc.residual()))
            .collect();
        for (node, residual) in targets {
            self.push(residual, &source, &node);
        }
    }
    /// Sets every height to its exact residual distance: to the sink when the
    /// sink is reachable, otherwise `n` plus the distance to the source, and
    /// `2n` for nodes that reach neither.
    fn global_relabel(&mut self) {
        let n = self.network.node_count();
        let network = &self.network;
        let source = network.source();
        let sink = network.sink();
        let to_sink = dijkstra_all(sink, |node: &N| {
            if node == source {
                vec![]
            } else {
                network
                    .predecessors(node)
                    .into_iter()
                    .map(|prev| (prev, 1usize))
                    .collect::<Vec<_>>()
            }
        });
        let to_source = dijkstra_all(source, |node: &N| {
            if node == sink {
                vec![]
            } else {
                network
                    .predecessors(node)
                    .into_iter()
                    .map(|prev| (prev, 1usize))
                    .collect::<Vec<_>>()
            }
        });
        let heights: HashMap<N, usize> = network
            .nodes()
            .map(|node| {
                let height = if node == source {
                    n
                } else if node == sink {
                    0
                } else if let Some((_, dist)) = to_sink.get(node) {
                    *dist
                } else if let Some((_, dist)) = to_source.get(node) {
                    n + dist
                } else {
                    2 * n
                };
                (node.clone(), height)
            })
            .collect();
        trace!("global relabel: {:?}", heights);
        self.heights = heights;
    }
    fn discharge(&mut self, node: &N, active: &mut ActiveNodes<N>) {
        let max_height = 2 * self.network.node_count();
        while self.excess(node) > 0 {
            let height = self.height(node);
            let successors = self.network.successors(node);
            let admissible = successors
                .iter()
                .find(|next| self.height(next) + 1 == height);
            if let Some(next) = admissible {
                let amount = Capacity::try_from(self.excess(node))
                    .unwrap_or(Capacity::MAX)
                    .min(self.network.residual_capacity(node, next));
                self.push(amount, node, next);
                if self.is_active(next) {
                    active.push(next.clone(), self.height(next));
                }
                continue;
            }
            let lowest = successors.iter().map(|next| self.height(next)).min();
            match lowest {
                Some(lowest) if lowest < max_height => {
                    trace!("relabel {:?}: {} -> {}", node, height, lowest + 1);
                    self.heights.insert(node.clone(), lowest + 1);
                }
                _ => {
                    warn!(
                        "excess {} at {:?} cannot reach the source or the sink",
                        self.excess(node),
                        node
                    );
                    return;
                }
            }
        }
    }
    fn push(&mut self, amount: Capacity, origin: &N, destination: &N) {
        trace!("push {} from {:?} to {:?}", amount, origin, destination);
        self.network.augment(amount, origin, destination);
        *self.excess.entry(origin.clone()).or_insert(0) -= Excess::from(amount);
        *self.excess.entry(destination.clone()).or_insert(0) += Excess::from(amount);
    }
    /// Forces `amount` units from `origin` to `destination` regardless of
    /// heights. Any node but the source can only pass on flow it holds as
    /// excess, so `amount` is bounded by the residual capacity and, away from
    /// the source, by the excess of `origin`. Fails without changing anything
    /// when the bound is exceeded.
    pub fn push_flow(&mut self, amount: Capacity, origin: &N, destination: &N) -> Result<()> {
        let mut residual = self.network.residual_capacity(origin, destination);
        if origin != self.network.source() {
            let held = Capacity::try_from(self.excess(origin).max(0)).unwrap_or(Capacity::MAX);
            residual = residual.min(held);
        }
        if amount > residual {
            return Err(MatchingError::CapacityViolation {
                origin: format!("{:?}", origin),
                destination: format!("{:?}", destination),
                amount,
                residual,
            });
        }
        self.push(amount, origin, destination);
        Ok(())
    }
    /// Marks `amount` units already flowing along the arc as not cancellable.
    pub fn pin_flow(&mut self, amount: Capacity, origin: &N, destination: &N) -> Result<()> {
        self.network.pin(amount, origin, destination)
    }
    pub fn get_state(&self) -> SolverState<N> {
        SolverState {
            flows: self
                .network
                .arcs()
                .map(|(origin, dest, arc)| ((origin.clone(), dest.clone()), (arc.flow, arc.pinned)))
                .collect(),
            excess: self.excess.clone(),
            heights: self.heights.clone(),
        }
    }
    /// Puts back flows, excesses and heights from `state`. Arcs created after
    /// the snapshot get zero flow. Capacities are left as they are.
    pub fn restore(&mut self, state: &SolverState<N>) -> Result<()> {
        for ((origin, dest), (flow, pinned)) in state.flows.iter() {
            let capacity = self.network.arc_capacity(origin, dest);
            if !self.network.contains_arc(origin, dest) || *flow > capacity || pinned > flow {
                return Err(MatchingError::InvalidArgument(format!(
                    "state does not fit this network at {:?} -> {:?}",
                    origin, dest
                )));
            }
        }
        for (origin, dest, arc) in self.network.arcs_mut() {
            let key = (origin.clone(), dest.clone());
            let (flow, pinned) = state.flows.get(&key).copied().unwrap_or((0, 0));
            arc.flow = flow;
            arc.pinned = pinned;
        }
        self.excess = state.excess.clone();
        self.heights = state.heights.clone();
        debug!("restored flow value {}", self.max_flow_value());
        Ok(())
    }
}
