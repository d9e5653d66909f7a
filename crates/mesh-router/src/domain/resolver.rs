//! Topology resolution: static edge graph in, first-hop routing table out.

use std::collections::{BTreeMap, HashSet, VecDeque};

use mesh_types::NodeId;

/// Per-node first-hop table derived once from the topology.
///
/// Maps every reachable node to the first hop on a fewest-hops path from
/// self. Unreachable nodes are simply absent. Built at router construction
/// and never mutated afterward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    first_hops: BTreeMap<NodeId, NodeId>,
}

impl RoutingTable {
    /// The first hop toward `destination`, or `None` if unreachable.
    #[must_use]
    pub fn first_hop(&self, destination: &NodeId) -> Option<&NodeId> {
        self.first_hops.get(destination)
    }

    /// Every reachable destination with its first hop, in node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.first_hops.iter()
    }

    /// Number of reachable destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.first_hops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_hops.is_empty()
    }
}

/// Resolve the first-hop table for `node` over a directed edge graph.
///
/// Breadth-first traversal; edges are unweighted, so "shortest" means fewest
/// hops. The first hop recorded for a newly discovered node is propagated
/// from its discoverer, not recomputed. Tie-break: neighbors are visited in
/// ascending node-id order (the edge maps are ordered), and whichever
/// neighbor discovers a node first wins. This is a defined policy, relied on
/// by tests, not an accident of map ordering.
pub fn resolve_first_hops<E>(
    edges: &BTreeMap<NodeId, BTreeMap<NodeId, E>>,
    node: &NodeId,
) -> RoutingTable {
    let mut first_hops = BTreeMap::new();
    let mut seen: HashSet<NodeId> = HashSet::from([node.clone()]);
    let mut queue: VecDeque<(NodeId, Option<NodeId>)> = VecDeque::from([(node.clone(), None)]);

    while let Some((current, via)) = queue.pop_front() {
        let Some(neighbors) = edges.get(&current) else {
            continue;
        };
        for next in neighbors.keys() {
            if seen.insert(next.clone()) {
                let hop = via.clone().unwrap_or_else(|| next.clone());
                first_hops.insert(next.clone(), hop.clone());
                queue.push_back((next.clone(), Some(hop)));
            }
        }
    }

    RoutingTable { first_hops }
}
