//! Majority vote over the relay tree
//!
//! A lieutenant's log forms a tree keyed by path: the commander's message is
//! the root and each message relayed one hop further is a child of the
//! message it was relayed from. A node's vote is the majority of its own
//! order and its children's votes; nodes at the recursion limit vote their own
//! order. Ties go to [`Order::Retreat`].

use crate::path::Path;
use crate::types::{Order, ReceivedLog, RelayMessage};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Node {
    order: Order,
    depth: usize,
    children: Vec<usize>,
}

/// Path-indexed view of one lieutenant's received log
#[derive(Debug, Clone)]
pub struct VoteTree {
    nodes: Vec<Node>,
    index: HashMap<Path, usize>,
    max_path_len: usize,
}

impl VoteTree {
    /// Index `log` once. Repeated paths keep their first arrival and
    /// messages whose parent never arrived are left out.
    pub fn build(log: &ReceivedLog, recursion_bound: usize) -> Self {
        let mut nodes = Vec::with_capacity(log.len());
        let mut index = HashMap::with_capacity(log.len());

        for msg in log.messages() {
            if index.contains_key(&msg.path) {
                tracing::warn!("Duplicate relay path {} ignored", msg.path);
                continue;
            }
            index.insert(msg.path.clone(), nodes.len());
            nodes.push(Node {
                order: msg.order,
                depth: msg.path.len(),
                children: Vec::new(),
            });
        }

        for msg in log.messages() {
            let Some(parent) = msg.path.parent() else {
                continue;
            };
            let child = index[&msg.path];
            match index.get(&parent) {
                Some(&p) => {
                    if !nodes[p].children.contains(&child) {
                        nodes[p].children.push(child);
                    }
                }
                None => {
                    tracing::warn!("Relay path {} arrived without its parent, skipped", msg.path);
                }
            }
        }

        Self {
            nodes,
            index,
            max_path_len: recursion_bound + 1,
        }
    }

    /// Vote of the message received along `path`, if it is in the log
    pub fn vote_at(&self, path: &Path) -> Option<Order> {
        self.index.get(path).map(|&i| self.vote(i))
    }

    /// The lieutenant's decision: the vote at the commander's message
    pub fn decision(&self) -> Option<Order> {
        self.vote_at(&Path::commander())
    }

    fn vote(&self, i: usize) -> Order {
        let node = &self.nodes[i];
        self.combine(node.order, node.depth, &node.children)
    }

    fn combine(&self, own: Order, depth: usize, children: &[usize]) -> Order {
        if depth >= self.max_path_len {
            return own;
        }
        let mut tally = Tally::default();
        tally.add(own);
        for &child in children {
            tally.add(self.vote(child));
        }
        tally.majority()
    }
}

#[derive(Debug, Default)]
struct Tally {
    affirm: usize,
    retreat: usize,
}

impl Tally {
    fn add(&mut self, order: Order) {
        match order {
            Order::Affirm => self.affirm += 1,
            Order::Retreat => self.retreat += 1,
        }
    }

    fn majority(&self) -> Order {
        if self.affirm > self.retreat {
            Order::Affirm
        } else {
            Order::Retreat
        }
    }
}

/// Vote for `message` given everything the lieutenant received
pub fn get_vote(message: &RelayMessage, log: &ReceivedLog, recursion_bound: usize) -> Order {
    let tree = VoteTree::build(log, recursion_bound);
    let children = tree
        .index
        .get(&message.path)
        .map(|&i| tree.nodes[i].children.as_slice())
        .unwrap_or_default();
    tree.combine(message.order, message.path.len(), children)
}

/// A lieutenant's final order, `None` if the commander's message is missing
pub fn decide(log: &ReceivedLog, recursion_bound: usize) -> Option<Order> {
    VoteTree::build(log, recursion_bound).decision()
}
