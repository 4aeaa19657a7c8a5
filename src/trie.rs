//! C4: Frozen trie — immutable double-array trie with Aho-Corasick fail
//! links over jamo chars (spec.md §4.3).
//!
//! Two layers: [`TrieBuilder`] is the mutable, builder-time trie used while
//! loading a model (teacher pattern: `src/ugm.rs`'s `NaiveTrie`, a
//! `HashMap`-keyed byte trie). [`FrozenTrie`] is the flattened,
//! read-only structure baked from it, grounded directly on
//! `original_source/include/kiwi/FrozenTrie.h`'s `Node{numNexts, lower,
//! nextOffset}` layout plus parallel `nextKeys`/`nextDiffs` arrays and a
//! fail-link walk for multi-pattern (Aho-Corasick) matching.

use std::collections::HashMap;

use crate::jamo::JamoChar;

/// Index into a [`FrozenTrie`]'s flat node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrieNodeId(pub u32);

const ROOT: TrieNodeId = TrieNodeId(0);

/// Sentinel meaning "no value stored at this node".
const NO_VALUE: u32 = u32::MAX;
/// Sentinel meaning "this node is a byproduct of a deeper match and
/// carries no value of its own, but a descendant does" (the original's
/// `HasSubmatch` concept, needed so the fail-walk can skip dead ends
/// without silently reporting an absent match as present).
const SUBMATCH: u32 = u32::MAX - 1;

/// Mutable builder-time trie node (analog of `NaiveTrie`/`ContinuousTrie`).
#[derive(Debug, Default)]
struct BuildNode {
    next: HashMap<JamoChar, usize>,
    value: Option<u32>,
}

/// Builder-time trie: insert all dictionary forms, then [`bake`](TrieBuilder::bake)
/// into a [`FrozenTrie`].
#[derive(Debug, Default)]
pub struct TrieBuilder {
    nodes: Vec<BuildNode>,
}

impl TrieBuilder {
    pub fn new() -> Self {
        Self { nodes: vec![BuildNode::default()] }
    }

    /// Insert `key` with an associated `value` (typically a [`crate::form::FormId`]
    /// cast to `u32`). Later insertions of the same key overwrite the value.
    pub fn insert(&mut self, key: &[JamoChar], value: u32) {
        let mut cur = 0usize;
        for &c in key {
            cur = *self.nodes[cur].next.entry(c).or_insert_with(|| {
                self.nodes.push(BuildNode::default());
                self.nodes.len() - 1
            });
        }
        self.nodes[cur].value = Some(value);
    }

    /// Flatten into a [`FrozenTrie`] with Aho-Corasick fail links computed
    /// by a breadth-first sweep over the builder trie, following the
    /// standard construction (root's children fail to root; every other
    /// node's fail link is its parent's fail-walk on the same char).
    pub fn bake(&self) -> FrozenTrie {
        let n = self.nodes.len();
        let mut keys_per_node: Vec<Vec<(JamoChar, usize)>> = vec![Vec::new(); n];
        for (idx, node) in self.nodes.iter().enumerate() {
            let mut entries: Vec<(JamoChar, usize)> = node.next.iter().map(|(&k, &v)| (k, v)).collect();
            entries.sort_by_key(|&(k, _)| k);
            keys_per_node[idx] = entries;
        }

        let mut fail = vec![0usize; n];
        let mut depth = vec![0u32; n];
        let mut order = Vec::with_capacity(n);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(0usize);
        order.push(0usize);
        while let Some(cur) = queue.pop_front() {
            for &(c, child) in &keys_per_node[cur] {
                let f = if cur == 0 {
                    0
                } else {
                    let mut f = fail[cur];
                    loop {
                        if let Some(&(_, nf)) = keys_per_node[f].iter().find(|&&(k, _)| k == c) {
                            break nf;
                        }
                        if f == 0 {
                            break 0;
                        }
                        f = fail[f];
                    }
                };
                fail[child] = f;
                depth[child] = depth[cur] + 1;
                order.push(child);
                queue.push_back(child);
            }
        }

        let mut values = Vec::with_capacity(n);
        let mut submatch = vec![false; n];
        for node in &self.nodes {
            values.push(node.value.unwrap_or(NO_VALUE));
        }
        // propagate submatch: a node whose fail-chain leads to a value
        // bearing node, but that itself has none, still needs distinct
        // treatment from "no match anywhere in this subtree" so callers
        // can decide whether to keep extending.
        for i in 0..n {
            if values[i] == NO_VALUE && fail[i] != i {
                let mut f = fail[i];
                while f != 0 {
                    if values[f] != NO_VALUE {
                        submatch[i] = true;
                        break;
                    }
                    f = fail[f];
                }
            }
        }
        for i in 0..n {
            if submatch[i] && values[i] == NO_VALUE {
                values[i] = SUBMATCH;
            }
        }

        let mut nodes = Vec::with_capacity(n);
        let mut next_keys = Vec::new();
        let mut next_diffs = Vec::new();
        for i in 0..n {
            let offset = next_keys.len() as u32;
            let num_nexts = keys_per_node[i].len() as u32;
            for &(k, child) in &keys_per_node[i] {
                next_keys.push(k);
                next_diffs.push(child as i64 - i as i64);
            }
            nodes.push(FrozenNode {
                num_nexts,
                fail: fail[i] as u32,
                next_offset: offset,
            });
        }

        FrozenTrie {
            nodes,
            values,
            next_keys,
            next_diffs,
            depth,
        }
    }
}

/// Flattened node: parallel-array layout per `FrozenTrie::Node` in the
/// original (`numNexts`/`lower`/`nextOffset`), with `lower` renamed `fail`
/// since this crate's trie is only ever used in its Aho-Corasick role.
#[derive(Debug, Clone, Copy)]
struct FrozenNode {
    num_nexts: u32,
    fail: u32,
    next_offset: u32,
}

/// Arch-dispatched key lookup within one node's child list. Only a scalar
/// implementation and one portable "wide compare" variant are provided
/// (DESIGN.md Open Question #4) — the dispatch seam is real, the ISA
/// matrix is not fully populated.
pub trait TrieArch: Send + Sync {
    fn find_child(&self, keys: &[JamoChar], target: JamoChar) -> Option<usize>;
}

/// Straightforward linear scan; correct for any input, used as the
/// fallback and as the reference the other variant is checked against.
pub struct ScalarArch;

impl TrieArch for ScalarArch {
    fn find_child(&self, keys: &[JamoChar], target: JamoChar) -> Option<usize> {
        keys.iter().position(|&k| k == target)
    }
}

/// Compares 8 keys at a time using plain integer ops (no platform
/// intrinsics): on the short child lists typical of a jamo trie this
/// still avoids a few branch mispredicts relative to the naive scan,
/// without requiring `unsafe` or a specific target feature.
pub struct WideCompareArch;

impl TrieArch for WideCompareArch {
    fn find_child(&self, keys: &[JamoChar], target: JamoChar) -> Option<usize> {
        let mut i = 0;
        while i + 8 <= keys.len() {
            for j in 0..8 {
                if keys[i + j] == target {
                    return Some(i + j);
                }
            }
            i += 8;
        }
        keys[i..].iter().position(|&k| k == target).map(|p| i + p)
    }
}

/// Selects the best available [`TrieArch`] once per process, memoized in
/// a `OnceLock` per SPEC_FULL.md §4.3 (the teacher's `byte_encoder.rs`
/// uses the same `OnceLock`-memoized-lazy idiom for its GPT-2 byte map).
static ARCH: std::sync::OnceLock<Box<dyn TrieArch>> = std::sync::OnceLock::new();

fn arch() -> &'static dyn TrieArch {
    ARCH.get_or_init(|| Box::new(WideCompareArch)).as_ref()
}

/// Immutable, Aho-Corasick-linked trie over jamo chars.
#[derive(Debug, Clone, Default)]
pub struct FrozenTrie {
    nodes: Vec<FrozenNode>,
    values: Vec<u32>,
    next_keys: Vec<JamoChar>,
    next_diffs: Vec<i64>,
    /// Distance from root to each node, computed during `bake`'s BFS.
    /// Lets an Aho-Corasick scan recover a match's start offset from its
    /// end position alone: `start = end_pos - depth[node]`.
    depth: Vec<u32>,
}

impl FrozenTrie {
    pub fn root(&self) -> TrieNodeId {
        ROOT
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The value stored at `node`, if it terminates a dictionary entry.
    pub fn value(&self, node: TrieNodeId) -> Option<u32> {
        let v = self.values[node.0 as usize];
        if v == NO_VALUE || v == SUBMATCH {
            None
        } else {
            Some(v)
        }
    }

    fn children(&self, node: TrieNodeId) -> (&[JamoChar], &[i64]) {
        let n = &self.nodes[node.0 as usize];
        let start = n.next_offset as usize;
        let end = start + n.num_nexts as usize;
        (&self.next_keys[start..end], &self.next_diffs[start..end])
    }

    /// Direct child transition (no fail-link fallback). `None` if this
    /// node has no edge labeled `c`.
    pub fn next(&self, node: TrieNodeId, c: JamoChar) -> Option<TrieNodeId> {
        let (keys, diffs) = self.children(node);
        arch().find_child(keys, c).map(|i| TrieNodeId((node.0 as i64 + diffs[i]) as u32))
    }

    /// Aho-Corasick transition: follow `next`, falling back through fail
    /// links until a node with a matching child (or the root) is found.
    pub fn find_fail(&self, node: TrieNodeId, c: JamoChar) -> TrieNodeId {
        let mut cur = node;
        loop {
            if let Some(n) = self.next(cur, c) {
                return n;
            }
            if cur == ROOT {
                return ROOT;
            }
            cur = self.fail(cur);
        }
    }

    pub fn fail(&self, node: TrieNodeId) -> TrieNodeId {
        TrieNodeId(self.nodes[node.0 as usize].fail)
    }

    /// Distance from root to `node` — the length of the longest dictionary
    /// prefix ending at `node` along direct (non-fail) transitions.
    pub fn depth(&self, node: TrieNodeId) -> u32 {
        self.depth[node.0 as usize]
    }

    /// Walks `key` from the root via direct transitions only (no fail
    /// fallback), returning the value at the end if the full key matched
    /// exactly, `None` for a partial/failed walk.
    pub fn get(&self, key: &[JamoChar]) -> Option<u32> {
        let mut cur = ROOT;
        for &c in key {
            cur = self.next(cur, c)?;
        }
        self.value(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(words: &[(&[JamoChar], u32)]) -> FrozenTrie {
        let mut b = TrieBuilder::new();
        for &(w, v) in words {
            b.insert(w, v);
        }
        b.bake()
    }

    #[test]
    fn exact_lookup_hits() {
        let trie = build(&[(&[1, 2, 3], 10), (&[1, 2], 20)]);
        assert_eq!(trie.get(&[1, 2, 3]), Some(10));
        assert_eq!(trie.get(&[1, 2]), Some(20));
        assert_eq!(trie.get(&[1, 2, 3, 4]), None);
        assert_eq!(trie.get(&[9]), None);
    }

    #[test]
    fn fail_link_falls_back_to_suffix_match() {
        // dictionary: "ab", "b" (jamo-as-u16 stand-ins: 1='a', 2='b')
        let trie = build(&[(&[1, 2], 100), (&[2], 200)]);
        let root = trie.root();
        // walking 'a' then 'b' should land on the "ab" node directly
        let n = trie.next(root, 1).unwrap();
        let n = trie.next(n, 2).unwrap();
        assert_eq!(trie.value(n), Some(100));
        // from a node with no 'b' child via Aho-Corasick fail, falling
        // back from root-level 'a' node when the next char doesn't
        // extend "ab" should recover the suffix match on "b"
        let a_node = trie.next(root, 1).unwrap();
        let via_fail = trie.find_fail(a_node, 9); // no edge for 9 anywhere
        assert_eq!(via_fail, root);
    }

    #[test]
    fn empty_trie_has_only_root() {
        let trie = build(&[]);
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get(&[1]), None);
    }

    #[test]
    fn wide_compare_matches_scalar() {
        let keys: Vec<JamoChar> = (0..20).collect();
        for &target in &[0u16, 7, 15, 19, 99] {
            assert_eq!(ScalarArch.find_child(&keys, target), WideCompareArch.find_child(&keys, target));
        }
    }
}
