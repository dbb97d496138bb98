use std::fmt::{Debug, Display};
use std::hash::Hash;

pub trait NodeId: Eq + Hash + Debug + Clone {}
impl<T> NodeId for T where T: Eq + Hash + Debug + Clone {}

pub type Capacity = u64;
// flow received minus flow sent, wide enough for any sum of u64 flows
pub type Excess = i128;

/// A node of the network built from a bipartite graph UV.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Node<U, V> {
    Source,
    Sink,
    U(U),
    V(V),
}

impl<U: Display, V: Display> Display for Node<U, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Source => write!(f, "Source"),
            Node::Sink => write!(f, "Sink"),
            Node::U(u) => write!(f, "{}", u),
            Node::V(v) => write!(f, "{}", v),
        }
    }
}
