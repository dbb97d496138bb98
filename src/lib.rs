mod active_nodes;
pub mod common;
pub mod error;
pub mod flow_network;
pub mod matches;
pub mod matching;
pub mod push_relabel;

pub use active_nodes::ActiveNodeOrder;
pub use common::{Capacity, Excess, Node, NodeId};
pub use error::{MatchingError, Result};
pub use flow_network::{FlowArc, FlowNetwork};
pub use matches::Matches;
pub use matching::{Matching, MatchingState};
pub use push_relabel::{PushRelabelMaxFlow, SolverConfig, SolverState};
