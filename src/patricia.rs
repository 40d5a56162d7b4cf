//! Patricia-style compressed trie.
//!
//! Instead of one node per bit, internal nodes store the index of the
//! first bit at which their subtrees disagree; runs of non-branching bits
//! are skipped entirely, so depth is bounded by the number of distinct
//! prefixes rather than 32. Prefix endpoints live in leaves, or directly
//! on an internal node when a prefix terminates at that branching point
//! (the endpoint length then equals the node's split bit).
//!
//! Insertion keeps three invariants the LPM descent relies on:
//! split bits strictly increase along any root-to-leaf path, every key
//! below a node shares that node's region bits, and an endpoint stored at
//! a node covers the node's whole region. Before descending an internal
//! node the candidate is compared against the subtree's shared bits:
//! a divergence ahead of the branching point hangs the subtree under a
//! new sibling split, and a prefix that ends at or above the branching
//! point anchors there instead of sinking past it.

use crate::key_pool::KeyId;
use crate::prefix::{bit_at, Prefix};

/// A stored prefix endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    prefix: Prefix,
    key: KeyId,
}

#[derive(Debug)]
enum Node {
    Leaf(Endpoint),
    Internal {
        /// First bit (from MSB) at which the two subtrees disagree.
        split_bit: u8,
        /// Prefix terminating at this branching point, if any. Its
        /// length equals `split_bit`.
        endpoint: Option<Endpoint>,
        children: [Option<Box<Node>>; 2],
    },
}

/// Path-compressed binary trie mapping prefixes to value references.
#[derive(Debug, Default)]
pub struct PatriciaTrie {
    root: Option<Box<Node>>,
    len: usize,
    nodes: usize,
}

impl PatriciaTrie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a prefix.
    pub fn insert(&mut self, prefix: Prefix, key: KeyId) {
        let root = self.root.take();
        self.root = Some(self.insert_into(root, Endpoint { prefix, key }));
    }

    fn insert_into(&mut self, node: Option<Box<Node>>, new: Endpoint) -> Box<Node> {
        let Some(mut node) = node else {
            self.len += 1;
            self.nodes += 1;
            return Box::new(Node::Leaf(new));
        };

        let leaf_ep = match &*node {
            Node::Leaf(ep) => Some(*ep),
            Node::Internal { .. } => None,
        };
        if let Some(old) = leaf_ep {
            return self.split_leaf(node, old, new);
        }

        let split_bit = match &*node {
            Node::Internal { split_bit, .. } => *split_bit,
            Node::Leaf(_) => unreachable!(),
        };

        let b = new.prefix.len();
        let rep = Self::leftmost_leaf_net(&node);
        let d = first_differing_bit(new.prefix.net(), rep);

        if d < split_bit && d < b {
            // Disagrees with the subtree's shared bits before its
            // branching point: the whole subtree becomes a sibling.
            let mut children: [Option<Box<Node>>; 2] = [None, None];
            children[bit_at(new.prefix.net(), d)] = Some(Box::new(Node::Leaf(new)));
            children[bit_at(rep, d)] = Some(node);
            self.len += 1;
            self.nodes += 2;
            Box::new(Node::Internal {
                split_bit: d,
                endpoint: None,
                children,
            })
        } else if b > split_bit {
            // Extends past this branching point: descend.
            let bit = bit_at(new.prefix.net(), split_bit);
            if let Node::Internal { children, .. } = &mut *node {
                let child = children[bit].take();
                children[bit] = Some(self.insert_into(child, new));
            }
            node
        } else if b == split_bit {
            // Terminates exactly at this branching point. Any endpoint
            // already here covers the same region with the same length,
            // i.e. is the same prefix.
            if let Node::Internal { endpoint, .. } = &mut *node {
                if endpoint.is_none() {
                    self.len += 1;
                }
                *endpoint = Some(new);
            }
            node
        } else {
            // Shorter than the branching point and agreeing with the
            // region: covers the whole subtree, so it becomes a new
            // branching point above.
            let mut children: [Option<Box<Node>>; 2] = [None, None];
            children[bit_at(rep, b)] = Some(node);
            self.len += 1;
            self.nodes += 1;
            Box::new(Node::Internal {
                split_bit: b,
                endpoint: Some(new),
                children,
            })
        }
    }

    /// Resolve a collision between a leaf holding `old` and the new
    /// endpoint. `node` is the leaf itself.
    fn split_leaf(&mut self, mut node: Box<Node>, old: Endpoint, new: Endpoint) -> Box<Node> {
        if old.prefix == new.prefix {
            *node = Node::Leaf(new);
            return node;
        }

        let (a, b) = (new.prefix.net(), new.prefix.len());
        let (p, q) = (old.prefix.net(), old.prefix.len());

        if new.prefix.covers(p) && b < q {
            // Old is more specific: it keeps its leaf, the new prefix
            // terminates at the branching point.
            let mut children: [Option<Box<Node>>; 2] = [None, None];
            children[bit_at(p, b)] = Some(node);
            self.len += 1;
            self.nodes += 1;
            Box::new(Node::Internal {
                split_bit: b,
                endpoint: Some(new),
                children,
            })
        } else if old.prefix.covers(a) && q < b {
            // New is more specific: the old leaf's payload moves onto the
            // branching point and the new prefix gets a fresh leaf.
            let mut children: [Option<Box<Node>>; 2] = [None, None];
            children[bit_at(a, q)] = Some(Box::new(Node::Leaf(new)));
            self.len += 1;
            self.nodes += 1;
            *node = Node::Internal {
                split_bit: q,
                endpoint: Some(old),
                children,
            };
            node
        } else {
            // Incomparable: branch at the first differing bit.
            let d = first_differing_bit(p, a);
            let mut children: [Option<Box<Node>>; 2] = [None, None];
            children[bit_at(a, d)] = Some(Box::new(Node::Leaf(new)));
            children[bit_at(p, d)] = Some(node);
            self.len += 1;
            self.nodes += 2;
            Box::new(Node::Internal {
                split_bit: d,
                endpoint: None,
                children,
            })
        }
    }

    /// Network address of any leaf below `node`; all of them share the
    /// node's region bits.
    fn leftmost_leaf_net(mut node: &Node) -> u32 {
        loop {
            match node {
                Node::Leaf(ep) => return ep.prefix.net(),
                Node::Internal { children, .. } => {
                    node = children[0]
                        .as_deref()
                        .or(children[1].as_deref())
                        .expect("internal node without children");
                }
            }
        }
    }

    /// Longest-prefix match.
    ///
    /// Descends by the split bit of each internal node, remembering the
    /// last endpoint whose prefix covers the address; stops at a leaf.
    pub fn lookup(&self, ip: u32) -> Option<KeyId> {
        let mut best = None;
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match n {
                Node::Leaf(ep) => {
                    if ep.prefix.covers(ip) {
                        best = Some(ep.key);
                    }
                    break;
                }
                Node::Internal {
                    split_bit,
                    endpoint,
                    children,
                } => {
                    if let Some(ep) = endpoint {
                        if ep.prefix.covers(ip) {
                            best = Some(ep.key);
                        }
                    }
                    node = children[bit_at(ip, *split_bit)].as_deref();
                }
            }
        }
        best
    }

    /// Number of stored prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the trie holds no prefix.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated nodes.
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Approximate heap usage.
    pub fn memory_usage(&self) -> usize {
        self.nodes * std::mem::size_of::<Node>()
    }
}

impl Drop for PatriciaTrie {
    fn drop(&mut self) {
        let mut stack: Vec<Box<Node>> = Vec::new();
        stack.extend(self.root.take());
        while let Some(mut node) = stack.pop() {
            if let Node::Internal { children, .. } = &mut *node {
                for child in children {
                    if let Some(c) = child.take() {
                        stack.push(c);
                    }
                }
            }
        }
    }
}

/// Index (from MSB) of the first bit at which `x` and `y` differ;
/// 32 when equal.
#[inline]
fn first_differing_bit(x: u32, y: u32) -> u8 {
    (x ^ y).leading_zeros() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_pool::KeyPool;

    fn p(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> u32 {
        crate::prefix::parse_ipv4(s).unwrap()
    }

    #[test]
    fn nested_prefixes_longest_wins() {
        let mut pool = KeyPool::new();
        let k1 = pool.intern_bytes([1; 64]);
        let k2 = pool.intern_bytes([2; 64]);
        let k3 = pool.intern_bytes([3; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("10.1.2.0/24"), k3);
        trie.insert(p("10.1.0.0/16"), k2);
        trie.insert(p("10.0.0.0/8"), k1);

        assert_eq!(trie.len(), 3);
        assert_eq!(trie.lookup(ip("10.1.2.3")), Some(k3));
        assert_eq!(trie.lookup(ip("10.1.5.6")), Some(k2));
        assert_eq!(trie.lookup(ip("10.2.0.1")), Some(k1));
        assert_eq!(trie.lookup(ip("11.0.0.1")), None);
    }

    #[test]
    fn sibling_subnets_split_cleanly() {
        let mut pool = KeyPool::new();
        let a = pool.intern_bytes([0xA; 64]);
        let b = pool.intern_bytes([0xB; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("192.168.1.128/25"), b);
        trie.insert(p("192.168.1.0/24"), a);

        assert_eq!(trie.lookup(ip("192.168.1.10")), Some(a));
        assert_eq!(trie.lookup(ip("192.168.1.200")), Some(b));
    }

    #[test]
    fn default_route_alone() {
        let mut pool = KeyPool::new();
        let d = pool.intern_bytes([0xD; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("0.0.0.0/0"), d);

        assert_eq!(trie.lookup(ip("8.8.8.8")), Some(d));
        assert_eq!(trie.lookup(ip("255.255.255.255")), Some(d));
    }

    #[test]
    fn short_prefix_inserted_after_split_still_matches_everywhere() {
        let mut pool = KeyPool::new();
        let x = pool.intern_bytes([1; 64]);
        let y = pool.intern_bytes([2; 64]);
        let d = pool.intern_bytes([3; 64]);

        // The two /16s force a branch near the top of the address space;
        // the default route arriving last must still cover addresses that
        // descend either branch, and addresses outside both.
        let mut trie = PatriciaTrie::new();
        trie.insert(p("0.1.0.0/16"), x);
        trie.insert(p("128.1.0.0/16"), y);
        trie.insert(p("0.0.0.0/0"), d);

        assert_eq!(trie.lookup(ip("0.1.2.3")), Some(x));
        assert_eq!(trie.lookup(ip("128.1.2.3")), Some(y));
        assert_eq!(trie.lookup(ip("200.0.0.1")), Some(d));
        assert_eq!(trie.lookup(ip("64.0.0.1")), Some(d));
    }

    #[test]
    fn covering_prefix_inserted_after_siblings() {
        let mut pool = KeyPool::new();
        let k16a = pool.intern_bytes([1; 64]);
        let k16b = pool.intern_bytes([2; 64]);
        let k8 = pool.intern_bytes([3; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("10.1.0.0/16"), k16a);
        trie.insert(p("10.2.0.0/16"), k16b);
        trie.insert(p("10.0.0.0/8"), k8);

        assert_eq!(trie.lookup(ip("10.1.0.1")), Some(k16a));
        assert_eq!(trie.lookup(ip("10.2.0.1")), Some(k16b));
        // Covered by the /8 only, on either side of the /16 split.
        assert_eq!(trie.lookup(ip("10.3.0.1")), Some(k8));
        assert_eq!(trie.lookup(ip("10.200.0.1")), Some(k8));
        assert_eq!(trie.lookup(ip("11.0.0.1")), None);
    }

    #[test]
    fn reinsert_overwrites_value() {
        let mut pool = KeyPool::new();
        let a = pool.intern_bytes([1; 64]);
        let b = pool.intern_bytes([2; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("10.0.0.0/8"), a);
        trie.insert(p("10.1.0.0/16"), a);
        // "10.0.0.0/8" now terminates at an internal node; overwriting
        // must not add an entry.
        trie.insert(p("10.0.0.0/8"), b);

        assert_eq!(trie.len(), 2);
        assert_eq!(trie.lookup(ip("10.200.0.1")), Some(b));
        assert_eq!(trie.lookup(ip("10.1.0.1")), Some(a));
    }

    #[test]
    fn divergent_sibling_keeps_covering_endpoint_reachable() {
        let mut pool = KeyPool::new();
        let k1 = pool.intern_bytes([1; 64]);
        let k2 = pool.intern_bytes([2; 64]);
        let k3a = pool.intern_bytes([3; 64]);
        let k3b = pool.intern_bytes([4; 64]);
        let k4 = pool.intern_bytes([5; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("10.1.0.0/16"), k1);
        trie.insert(p("10.2.0.0/16"), k2);
        trie.insert(p("10.0.0.0/14"), k3a);
        // Diverges from the 10.x subtree ahead of its branching point.
        trie.insert(p("9.1.0.0/16"), k4);
        // Overwrite through the restructured tree.
        trie.insert(p("10.0.0.0/14"), k3b);

        assert_eq!(trie.len(), 4);
        assert_eq!(trie.lookup(ip("10.1.0.1")), Some(k1));
        assert_eq!(trie.lookup(ip("10.2.0.1")), Some(k2));
        assert_eq!(trie.lookup(ip("10.3.0.1")), Some(k3b));
        assert_eq!(trie.lookup(ip("9.1.2.3")), Some(k4));
        assert_eq!(trie.lookup(ip("8.0.0.1")), None);
    }

    #[test]
    fn host_routes() {
        let mut pool = KeyPool::new();
        let a = pool.intern_bytes([1; 64]);
        let b = pool.intern_bytes([2; 64]);

        let mut trie = PatriciaTrie::new();
        trie.insert(p("203.0.113.7/32"), a);
        trie.insert(p("203.0.113.8/32"), b);

        assert_eq!(trie.lookup(ip("203.0.113.7")), Some(a));
        assert_eq!(trie.lookup(ip("203.0.113.8")), Some(b));
        assert_eq!(trie.lookup(ip("203.0.113.9")), None);
    }
}
