use priority_queue::PriorityQueue;
use std::collections::{HashSet, VecDeque};

use crate::common::NodeId;

/// Order in which the solver discharges nodes with positive excess.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveNodeOrder {
    #[default]
    HighestLabel,
    Fifo,
}

pub(crate) enum ActiveNodes<N: NodeId> {
    HighestLabel(PriorityQueue<N, usize>),
    Fifo {
        queue: VecDeque<N>,
        queued: HashSet<N>,
    },
}

impl<N: NodeId> ActiveNodes<N> {
    pub fn new(order: ActiveNodeOrder) -> Self {
        match order {
            ActiveNodeOrder::HighestLabel => ActiveNodes::HighestLabel(PriorityQueue::new()),
            ActiveNodeOrder::Fifo => ActiveNodes::Fifo {
                queue: VecDeque::new(),
                queued: HashSet::new(),
            },
        }
    }
    pub fn len(&self) -> usize {
        match self {
            ActiveNodes::HighestLabel(queue) => queue.len(),
            ActiveNodes::Fifo { queue, .. } => queue.len(),
        }
    }
    // a node already waiting keeps its place
    pub fn push(&mut self, node: N, height: usize) {
        match self {
            ActiveNodes::HighestLabel(queue) => {
                queue.push_increase(node, height);
            }
            ActiveNodes::Fifo { queue, queued } => {
                if queued.insert(node.clone()) {
                    queue.push_back(node);
                }
            }
        }
    }
    pub fn pop(&mut self) -> Option<N> {
        match self {
            ActiveNodes::HighestLabel(queue) => queue.pop().map(|(node, _)| node),
            ActiveNodes::Fifo { queue, queued } => {
                let node = queue.pop_front()?;
                queued.remove(&node);
                Some(node)
            }
        }
    }
}
