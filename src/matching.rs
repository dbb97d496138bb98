use log::debug;
use std::collections::{HashMap, HashSet};

use crate::common::{Capacity, Node, NodeId};
use crate::error::{MatchingError, Result};
use crate::flow_network::FlowNetwork;
use crate::matches::Matches;
use crate::push_relabel::{PushRelabelMaxFlow, SolverConfig, SolverState};

/// Snapshot of a [`Matching`]: the solver state plus the count of every
/// element of U, so that rolling back also undoes [`Matching::increase_u_count`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchingState<U: NodeId, V: NodeId> {
    flow: SolverState<Node<U, V>>,
    u_counts: HashMap<U, Capacity>,
}

/// Maximum matching of a bipartite graph UV, computed as a maximum flow.
///
/// The source is adjacent to every element of U and every element of V is
/// adjacent to the sink. An element `u` is adjacent to `v` only if the match
/// predicate accepts the pair. Arcs out of the source carry the count of `u`
/// (initially 1), arcs into the sink carry the count of `v`.
pub struct Matching<U: NodeId, V: NodeId> {
    max_flow: PushRelabelMaxFlow<Node<U, V>>,
}

impl<U: NodeId, V: NodeId> Matching<U, V> {
    /// Builds the network. `v_set_and_count` gives how many elements of U each
    /// `v` can take, e.g. a role that needs three people is `(role, 3)`.
    /// The predicate is called exactly once for every `(u, v)` pair.
    pub fn new<P>(
        mut match_predicate: P,
        u_set: HashSet<U>,
        v_set_and_count: HashMap<V, Capacity>,
    ) -> Result<Self>
    where
        P: FnMut(&U, &V) -> bool,
    {
        if let Some((v, _)) = v_set_and_count.iter().find(|(_, count)| **count == 0) {
            return Err(MatchingError::InvalidArgument(format!(
                "count of {:?} must be positive",
                v
            )));
        }
        let mut network = FlowNetwork::new(Node::Source, Node::Sink)?;
        for (v, count) in v_set_and_count.iter() {
            network.set_arc_capacity(*count, &Node::V(v.clone()), &Node::Sink)?;
        }
        let mut compatible = 0usize;
        for u in u_set.iter() {
            let u_node = Node::U(u.clone());
            network.set_arc_capacity(1, &Node::Source, &u_node)?;
            for v in v_set_and_count.keys() {
                if match_predicate(u, v) {
                    network.set_arc_capacity(1, &u_node, &Node::V(v.clone()))?;
                    compatible += 1;
                }
            }
        }
        debug!(
            "matching network: {} in U, {} in V, {} compatible pairs",
            u_set.len(),
            v_set_and_count.len(),
            compatible
        );
        Ok(Matching {
            max_flow: PushRelabelMaxFlow::new(network),
        })
    }
    /// Same as [`Matching::new`] with a count of 1 for every `v`.
    pub fn from_sets<P>(match_predicate: P, u_set: HashSet<U>, v_set: HashSet<V>) -> Result<Self>
    where
        P: FnMut(&U, &V) -> bool,
    {
        let v_set_and_count = v_set.into_iter().map(|v| (v, 1)).collect();
        Self::new(match_predicate, u_set, v_set_and_count)
    }
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.max_flow.set_config(config);
        self
    }
    pub fn network(&self) -> &FlowNetwork<Node<U, V>> {
        self.max_flow.network()
    }
    /// Pushes as much flow as possible from source to sink. Pairs set with
    /// [`Matching::set_match`] are kept.
    pub fn find_matching(&mut self) {
        self.max_flow.preflow_push();
    }
    pub fn get_matches(&self) -> Matches<U, V> {
        self.network()
            .arcs()
            .filter(|(_, _, arc)| arc.flow > 0)
            .filter_map(|(origin, dest, arc)| match (origin, dest) {
                (Node::U(u), Node::V(v)) => Some(((u.clone(), v.clone()), arc.flow)),
                _ => None,
            })
            .collect()
    }
    /// Raises the count of `u` by `increase`, together with the capacity of
    /// every arc from `u` to a compatible `v`.
    pub fn increase_u_count(&mut self, u: &U, increase: Capacity) -> Result<()> {
        if increase == 0 {
            return Err(MatchingError::InvalidArgument(format!(
                "increase of {:?} must be positive",
                u
            )));
        }
        let u_node = Node::U(u.clone());
        if !self.network().contains_arc(&Node::Source, &u_node) {
            return Err(MatchingError::UnknownEntity(format!("{:?}", u)));
        }
        let overflow = || {
            MatchingError::InvalidArgument(format!(
                "count of {:?} overflows when raised by {}",
                u, increase
            ))
        };
        let count = self
            .network()
            .arc_capacity(&Node::Source, &u_node)
            .checked_add(increase)
            .ok_or_else(overflow)?;
        let mut raised: Vec<(Node<U, V>, Node<U, V>, Capacity)> =
            vec![(Node::Source, u_node.clone(), count)];
        for (v_node, arc) in self.network().out_arcs(&u_node) {
            let capacity = arc.capacity.checked_add(increase).ok_or_else(overflow)?;
            raised.push((u_node.clone(), v_node.clone(), capacity));
        }
        let network = self.max_flow.network_mut();
        for (origin, dest, capacity) in raised.iter() {
            network.set_arc_capacity(*capacity, origin, dest)?;
        }
        debug!("count of {:?} raised by {}", u, increase);
        Ok(())
    }
    /// Matches `u` with `v` by hand. The pair stays matched through later
    /// calls of [`Matching::find_matching`]. Setting a pair that is already
    /// matched does nothing.
    pub fn set_match(&mut self, u: &U, v: &V) -> Result<()> {
        let u_node = Node::U(u.clone());
        let v_node = Node::V(v.clone());
        let network = self.network();
        if network.arc_flow(&u_node, &v_node) > 0 {
            if network.pinned_flow(&u_node, &v_node) == 0 {
                self.max_flow.pin_flow(1, &u_node, &v_node)?;
            }
            debug!("{:?} and {:?} are already matched", u, v);
            return Ok(());
        }
        if !network.contains_arc(&Node::Source, &u_node) {
            return Err(MatchingError::UnknownEntity(format!("{:?}", u)));
        }
        if network.residual_capacity(&Node::Source, &u_node) == 0 {
            return Err(MatchingError::AlreadyMatched(format!("{:?}", u)));
        }
        if !network.contains_arc(&v_node, &Node::Sink) {
            return Err(MatchingError::UnknownEntity(format!("{:?}", v)));
        }
        if network.residual_capacity(&v_node, &Node::Sink) == 0 {
            return Err(MatchingError::AlreadyMatched(format!("{:?}", v)));
        }
        if network.arc_capacity(&u_node, &v_node) == 0 {
            return Err(MatchingError::NoCompatiblePath {
                u: format!("{:?}", u),
                v: format!("{:?}", v),
            });
        }
        self.max_flow.push_flow(1, &Node::Source, &u_node)?;
        self.max_flow.push_flow(1, &u_node, &v_node)?;
        self.max_flow.push_flow(1, &v_node, &Node::Sink)?;
        self.max_flow.pin_flow(1, &u_node, &v_node)?;
        debug!("matched {:?} with {:?} by hand", u, v);
        Ok(())
    }
    pub fn get_state(&self) -> MatchingState<U, V> {
        let u_counts = self
            .network()
            .out_arcs(&Node::Source)
            .filter_map(|(node, arc)| match node {
                Node::U(u) => Some((u.clone(), arc.capacity)),
                _ => None,
            })
            .collect();
        MatchingState {
            flow: self.max_flow.get_state(),
            u_counts,
        }
    }
    /// Rolls back to `state`: flows, pinned pairs and counts of U.
    pub fn restore(&mut self, state: &MatchingState<U, V>) -> Result<()> {
        let mut capacities = Vec::new();
        for (u, count) in state.u_counts.iter() {
            let u_node = Node::U(u.clone());
            if !self.network().contains_arc(&Node::Source, &u_node) {
                return Err(MatchingError::UnknownEntity(format!("{:?}", u)));
            }
            let mut arcs = vec![(Node::Source, u_node.clone())];
            arcs.extend(
                self.network()
                    .out_arcs(&u_node)
                    .map(|(v_node, _)| (u_node.clone(), v_node.clone())),
            );
            for (origin, dest) in arcs {
                if state.flow.flow(&origin, &dest) > *count {
                    return Err(MatchingError::InvalidArgument(format!(
                        "count {} of {:?} is below its flow",
                        count, u
                    )));
                }
                capacities.push((origin, dest, *count));
            }
        }
        self.max_flow.restore(&state.flow)?;
        let network = self.max_flow.network_mut();
        for (origin, dest, capacity) in capacities {
            network.set_arc_capacity(capacity, &origin, &dest)?;
        }
        debug!("matching restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::active_nodes::ActiveNodeOrder;

    const U1: &str = "u1";
    const U2: &str = "u2";
    const U3: &str = "u3";
    const V1: &str = "v1";
    const V2: &str = "v2";
    const V3: &str = "v3";

    fn match_predicate(u: &&str, v: &&str) -> bool {
        matches!(
            (*u, *v),
            ("u1", "v1") | ("u2", "v1") | ("u2", "v2") | ("u3", "v2") | ("u3", "v3")
        )
    }

    fn u_set() -> HashSet<&'static str> {
        HashSet::from([U1, U2, U3])
    }

    fn team() -> Matching<&'static str, &'static str> {
        Matching::from_sets(match_predicate, u_set(), HashSet::from([V1, V2, V3])).unwrap()
    }

    fn u(value: &'static str) -> Node<&'static str, &'static str> {
        Node::U(value)
    }

    fn v(value: &'static str) -> Node<&'static str, &'static str> {
        Node::V(value)
    }

    #[test]
    fn test_build_team_network() {
        let matching = team();
        let network = matching.network();
        assert_eq!(network.source(), &Node::Source);
        assert_eq!(network.sink(), &Node::Sink);
        for u_value in [U1, U2, U3] {
            assert_eq!(network.arc_capacity(&Node::Source, &u(u_value)), 1);
            for v_value in [V1, V2, V3] {
                let expected = match_predicate(&u_value, &v_value) as Capacity;
                assert_eq!(network.arc_capacity(&u(u_value), &v(v_value)), expected);
            }
        }
        for v_value in [V1, V2, V3] {
            assert_eq!(network.arc_capacity(&v(v_value), &Node::Sink), 1);
        }
    }

    #[test]
    fn test_predicate_called_once_per_pair() {
        let mut calls = Vec::new();
        Matching::from_sets(
            |u: &&str, v: &&str| {
                calls.push((u.to_string(), v.to_string()));
                match_predicate(u, v)
            },
            u_set(),
            HashSet::from([V1, V2, V3]),
        )
        .unwrap();
        let distinct: HashSet<_> = calls.iter().collect();
        assert_eq!(calls.len(), 9);
        assert_eq!(distinct.len(), 9);
    }

    #[test]
    fn test_zero_count_is_rejected() {
        let result = Matching::new(match_predicate, u_set(), HashMap::from([(V1, 0), (V2, 1)]));
        assert!(matches!(result, Err(MatchingError::InvalidArgument(_))));
    }

    #[test]
    fn test_find_matching() {
        for active_order in [ActiveNodeOrder::HighestLabel, ActiveNodeOrder::Fifo] {
            let mut matching = team().with_config(SolverConfig { active_order });
            matching.find_matching();
            let matches = matching.get_matches();
            assert_eq!(matches.len(), 3);
            assert_eq!(matches.get(&U1, &V1), Some(1));
            assert_eq!(matches.get(&U2, &V2), Some(1));
            assert_eq!(matches.get(&U3, &V3), Some(1));
        }
    }

    #[test]
    fn test_find_matching_twice() {
        let mut matching = team();
        matching.find_matching();
        let matches = matching.get_matches();
        let state = matching.get_state();
        matching.find_matching();
        assert_eq!(matching.get_matches(), matches);
        assert_eq!(matching.get_state(), state);
    }

    #[test]
    fn test_find_matching_with_multiples_of_v() {
        // two people for v1 and one for v2
        let mut matching =
            Matching::new(match_predicate, u_set(), HashMap::from([(V1, 2), (V2, 1)])).unwrap();
        matching.find_matching();
        let matches = matching.get_matches();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches.get(&U1, &V1), Some(1));
        assert_eq!(matches.get(&U2, &V1), Some(1));
        assert_eq!(matches.get(&U3, &V2), Some(1));
    }

    #[test]
    fn test_find_matching_with_multiples_of_u_and_v() {
        let mut matching =
            Matching::new(match_predicate, u_set(), HashMap::from([(V1, 2), (V2, 2)])).unwrap();
        matching.increase_u_count(&U1, 1).unwrap();
        matching.find_matching();
        let matches = matching.get_matches();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches.get(&U1, &V1), Some(2));
        assert_eq!(matches.get(&U2, &V2), Some(1));
        assert_eq!(matches.get(&U3, &V2), Some(1));
        assert_eq!(matches.total(), 4);
    }

    #[test]
    fn test_increase_u_count() {
        let mut matching =
            Matching::new(match_predicate, u_set(), HashMap::from([(V1, 2), (V2, 1)])).unwrap();
        matching.increase_u_count(&U1, 2).unwrap();
        let network = matching.network();
        assert_eq!(network.arc_capacity(&Node::Source, &u(U1)), 3);
        assert_eq!(network.arc_capacity(&u(U1), &v(V1)), 3);
        assert_eq!(network.arc_capacity(&u(U1), &v(V2)), 0);
        assert_eq!(network.arc_capacity(&Node::Source, &u(U2)), 1);
        assert_eq!(network.arc_capacity(&Node::Source, &u(U3)), 1);
        assert_eq!(network.arc_capacity(&u(U2), &v(V1)), 1);
    }

    #[test]
    fn test_increase_u_count_errors() {
        let mut matching = team();
        assert!(matches!(
            matching.increase_u_count(&U1, 0),
            Err(MatchingError::InvalidArgument(_))
        ));
        assert!(matches!(
            matching.increase_u_count(&"u4", 1),
            Err(MatchingError::UnknownEntity(_))
        ));
        assert!(matches!(
            matching.increase_u_count(&V1, 1),
            Err(MatchingError::UnknownEntity(_))
        ));
        assert_eq!(matching.network().arc_capacity(&Node::Source, &u(U1)), 1);
    }

    #[test]
    fn test_increase_u_count_overflow() {
        let mut matching = team();
        matching.increase_u_count(&U1, 1).unwrap();
        assert!(matches!(
            matching.increase_u_count(&U1, Capacity::MAX),
            Err(MatchingError::InvalidArgument(_))
        ));
        let network = matching.network();
        assert_eq!(network.arc_capacity(&Node::Source, &u(U1)), 2);
        assert_eq!(network.arc_capacity(&u(U1), &v(V1)), 2);
    }

    #[test]
    fn test_huge_count_is_routed() {
        let mut matching = team();
        matching.increase_u_count(&U1, 1 << 63).unwrap();
        matching.find_matching();
        let matches = matching.get_matches();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches.get(&U1, &V1), Some(1));
        assert_eq!(matches.get(&U2, &V2), Some(1));
        assert_eq!(matches.get(&U3, &V3), Some(1));
        assert_eq!(matching.network().net_outflow(&u(U1)), 0);
    }

    #[test]
    fn test_set_match() {
        let mut matching = team();
        matching.set_match(&U1, &V1).unwrap();
        matching.set_match(&U3, &V3).unwrap();

        let matches = matching.get_matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches.get(&U1, &V1), Some(1));
        assert_eq!(matches.get(&U3, &V3), Some(1));

        matching.set_match(&U1, &V1).unwrap();
        assert_eq!(matching.get_matches(), matches);

        matching.find_matching();
        let matches = matching.get_matches();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches.get(&U1, &V1), Some(1));
        assert_eq!(matches.get(&U2, &V2), Some(1));
        assert_eq!(matches.get(&U3, &V3), Some(1));
    }

    #[test]
    fn test_set_match_errors() {
        let mut matching = team();
        assert!(matches!(
            matching.set_match(&U1, &V2),
            Err(MatchingError::NoCompatiblePath { .. })
        ));
        assert!(matches!(
            matching.set_match(&"u4", &V1),
            Err(MatchingError::UnknownEntity(_))
        ));
        assert!(matches!(
            matching.set_match(&U1, &"v4"),
            Err(MatchingError::UnknownEntity(_))
        ));
        assert!(matching.get_matches().is_empty());

        matching.set_match(&U2, &V1).unwrap();
        assert!(matches!(
            matching.set_match(&U2, &V2),
            Err(MatchingError::AlreadyMatched(_))
        ));
        assert!(matches!(
            matching.set_match(&U1, &V1),
            Err(MatchingError::AlreadyMatched(_))
        ));
        assert_eq!(matching.get_matches().len(), 1);
    }

    #[test]
    fn test_set_match_is_kept_by_find_matching() {
        // u2 -> v1 is not part of the unique maximum, the solver has to keep it anyway
        let mut matching = team();
        matching.set_match(&U2, &V1).unwrap();
        matching.find_matching();
        let matches = matching.get_matches();
        assert_eq!(matches.get(&U2, &V1), Some(1));
        assert_eq!(matches.get(&U3, &V2).or(matches.get(&U3, &V3)), Some(1));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_get_and_restore_flow_state() {
        let mut matching = team();
        matching.set_match(&U1, &V1).unwrap();

        let state = matching.get_state();
        matching.set_match(&U2, &V2).unwrap();
        matching.increase_u_count(&U3, 1).unwrap();
        matching.find_matching();
        matching.restore(&state).unwrap();

        let matches = matching.get_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches.get(&U1, &V1), Some(1));

        let network = matching.network();
        assert_eq!(network.residual_capacity(&Node::Source, &u(U1)), 0);
        assert_eq!(network.arc_capacity(&Node::Source, &u(U2)), 1);
        assert_eq!(network.arc_capacity(&Node::Source, &u(U3)), 1);
        assert_eq!(network.arc_capacity(&u(U3), &v(V3)), 1);
        assert_eq!(matching.get_state(), state);

        matching.find_matching();
        assert_eq!(matching.get_matches().len(), 3);
    }

    #[test]
    fn test_restore_twice() {
        let mut matching = team();
        let state = matching.get_state();
        matching.find_matching();
        matching.restore(&state).unwrap();
        assert!(matching.get_matches().is_empty());
        matching.set_match(&U2, &V1).unwrap();
        matching.restore(&state).unwrap();
        assert!(matching.get_matches().is_empty());
    }

    fn generate_instance(
        num_u: usize,
        num_v: usize,
        seed: u64,
    ) -> (HashSet<(usize, usize)>, HashMap<usize, Capacity>) {
        use rand::prelude::*;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut compatible = HashSet::new();
        for u in 0..num_u {
            for v in 0..num_v {
                if rng.gen_bool(0.4) {
                    compatible.insert((u, v));
                }
            }
        }
        let counts = (0..num_v).map(|v| (v, rng.gen_range(1..3))).collect();
        (compatible, counts)
    }

    #[test]
    fn test_random_instances() {
        use pathfinding::directed::edmonds_karp::edmonds_karp_sparse;
        for num_u in 1..7 {
            for seed in 0..30 {
                let num_v = 1 + (seed as usize) % 5;
                let (compatible, counts) = generate_instance(num_u, num_v, seed);
                // nodes: 0 source, 1 sink, 2.. U, then V
                let vertices: Vec<usize> = (0..2 + num_u + num_v).collect();
                let mut caps: Vec<((usize, usize), i64)> = Vec::new();
                for u in 0..num_u {
                    caps.push(((0, 2 + u), 1));
                }
                for (u, v) in compatible.iter() {
                    caps.push(((2 + u, 2 + num_u + v), 1));
                }
                for (v, count) in counts.iter() {
                    caps.push(((2 + num_u + v, 1), *count as i64));
                }
                let (_, expected, ..) = edmonds_karp_sparse(&vertices, &0, &1, caps);

                let mut matching = Matching::new(
                    |u: &usize, v: &usize| compatible.contains(&(*u, *v)),
                    (0..num_u).collect(),
                    counts.clone(),
                )
                .unwrap();
                matching.find_matching();
                let matches = matching.get_matches();
                let total_count: Capacity = counts.values().sum();
                assert_eq!(matches.total() as i64, expected, "seed {}", seed);
                assert!(matches.len() <= num_u.min(total_count as usize));
                for (u, v, count) in matches.iter() {
                    assert!(compatible.contains(&(*u, *v)));
                    assert_eq!(count, 1);
                }
                for (v, count) in counts.iter() {
                    let taken: Capacity = matches
                        .iter()
                        .filter(|(_, matched_v, _)| *matched_v == v)
                        .map(|(_, _, count)| count)
                        .sum();
                    assert!(taken <= *count);
                }
            }
        }
    }

    #[test]
    fn test_random_pins_are_kept_and_maximum() {
        use pathfinding::directed::edmonds_karp::edmonds_karp_sparse;
        use rand::prelude::*;
        for num_u in 1..7 {
            for seed in 0..30 {
                let num_v = 1 + (seed as usize) % 5;
                let (compatible, counts) = generate_instance(num_u, num_v, seed);
                let mut matching = Matching::new(
                    |u: &usize, v: &usize| compatible.contains(&(*u, *v)),
                    (0..num_u).collect(),
                    counts.clone(),
                )
                .unwrap();

                let mut rng = ChaCha8Rng::seed_from_u64(seed + 1000);
                let mut pins = Vec::new();
                for u in 0..num_u {
                    let options: Vec<usize> = (0..num_v)
                        .filter(|v| compatible.contains(&(u, *v)))
                        .collect();
                    let Some(v) = options.choose(&mut rng).copied() else {
                        continue;
                    };
                    if !rng.gen_bool(0.5) {
                        continue;
                    }
                    match matching.set_match(&u, &v) {
                        Ok(()) => pins.push((u, v)),
                        Err(MatchingError::AlreadyMatched(_)) => {}
                        Err(err) => panic!("unexpected {:?}", err),
                    }
                }
                matching.find_matching();

                // what is left once the pinned pairs are taken out
                let pinned_u: HashSet<usize> = pins.iter().map(|(u, _)| *u).collect();
                let mut remaining = counts.clone();
                for (_, v) in pins.iter() {
                    *remaining.get_mut(v).unwrap() -= 1;
                }
                let vertices: Vec<usize> = (0..2 + num_u + num_v).collect();
                let mut caps: Vec<((usize, usize), i64)> = Vec::new();
                for u in (0..num_u).filter(|u| !pinned_u.contains(u)) {
                    caps.push(((0, 2 + u), 1));
                }
                for (u, v) in compatible.iter().filter(|(u, _)| !pinned_u.contains(u)) {
                    caps.push(((2 + u, 2 + num_u + v), 1));
                }
                for (v, count) in remaining.iter().filter(|(_, count)| **count > 0) {
                    caps.push(((2 + num_u + v, 1), *count as i64));
                }
                let (_, rest, ..) = edmonds_karp_sparse(&vertices, &0, &1, caps);

                let matches = matching.get_matches();
                for (u, v) in pins.iter() {
                    assert_eq!(matches.get(u, v), Some(1), "seed {}", seed);
                }
                assert_eq!(
                    matches.total() as i64,
                    pins.len() as i64 + rest,
                    "seed {}",
                    seed
                );
                let state = matching.get_state();
                matching.find_matching();
                assert_eq!(matching.get_state(), state);
            }
        }
    }
}
