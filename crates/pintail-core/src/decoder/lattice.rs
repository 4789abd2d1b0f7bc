//! Beam-search lattice: a node arena segmented into per-step beams.
//!
//! The lattice owns every node produced by one decode. Nodes reference
//! their predecessors by arena slot, so survivors stay addressable across
//! top-k pruning without any pointer juggling: a step may shuffle its own
//! open beam, but once `end_step` runs the beam is frozen and later steps
//! only ever point into frozen beams.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ops::Range;

use crate::dict::WordId;

/// One feature: key and value.
pub type Feature = (String, f64);

/// A node in one beam of the lattice, also an element of a result path
/// (paths are read by following `prev` links back to the root).
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Arena slot of the predecessor; `None` only at the root.
    pub prev: Option<usize>,
    /// Input position where the last reduction completed, i.e. the start
    /// of the pending shift span.
    pub code_pos: usize,
    /// Bytes of target text emitted so far.
    pub text_pos: usize,
    /// Word consumed by this node: `Some` on reductions and on the
    /// virtual BOS/EOS markers, `None` on shifts.
    pub word: Option<WordId>,
    /// Slot of the nearest ancestor carrying a word, for O(1) bigram
    /// construction.
    pub prev_word: Option<usize>,
    /// Features effective for every path through this node.
    pub local_features: Vec<Feature>,
    /// Features effective only when this node is the rear of a path.
    pub global_features: Vec<Feature>,
    /// Accumulated local-feature score of the sub-path ending here.
    pub local_score: f64,
    /// Total score of the path ending at this node.
    pub score: f64,
}

impl Node {
    /// The single node of step 0. Carries the sentinel word when BOS
    /// anchoring is on.
    pub fn root(word: Option<WordId>) -> Self {
        Node {
            word,
            ..Self::default()
        }
    }

    /// Shift child: extends the pending span of `prev` by one byte.
    pub fn shift(prev_slot: usize, prev: &Node) -> Self {
        Node {
            prev: Some(prev_slot),
            code_pos: prev.code_pos,
            text_pos: prev.text_pos,
            word: None,
            prev_word: if prev.word.is_some() {
                Some(prev_slot)
            } else {
                prev.prev_word
            },
            ..Self::default()
        }
    }

    /// Reduce child: consumes the pending span as `word`, emitting text up
    /// to `text_pos`.
    pub fn reduce(
        prev_slot: usize,
        prev: &Node,
        code_pos: usize,
        text_pos: usize,
        word: WordId,
    ) -> Self {
        Node {
            code_pos,
            text_pos,
            word: Some(word),
            ..Self::shift(prev_slot, prev)
        }
    }
}

/// Heap key for pruning: the lowest-scoring slot of the open step is
/// popped first; ties evict the higher slot.
#[derive(Debug, PartialEq)]
struct HeapSlot {
    score: f64,
    slot: usize,
}

impl Eq for HeapSlot {}

impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Arena of beam-search nodes.
///
/// Slots are preallocated by `init` for the whole decode, so `emplace`
/// never reallocates mid-step. While a step is open, at most
/// `beam_size + 1` of its slots exist at once: when a candidate beyond the
/// beam width arrives, the current minimum is dropped and its slot reused.
#[derive(Debug, Default)]
pub struct Lattice {
    nodes: Vec<Node>,
    /// Start offset of each step; step `k` spans `steps[k]..steps[k+1]`,
    /// the newest step runs to the arena tail.
    steps: Vec<usize>,
    beam_size: usize,
    /// Min-heap over the open step's live slots, keyed by score.
    heap: BinaryHeap<Reverse<HeapSlot>>,
    /// Slot vacated by the last prune, reused by the next emplace.
    free: Option<usize>,
}

impl Lattice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a decode of `code_len` input bytes with the given beam
    /// width, preallocating every slot the decode can touch: one beam per
    /// step (BOS, one per byte, EOS), one scratch slot, and one slot for a
    /// forced post-pruning node.
    pub fn init(&mut self, code_len: usize, beam_size: usize) {
        self.beam_size = beam_size.max(1);
        self.nodes.clear();
        self.steps.clear();
        self.heap.clear();
        self.free = None;
        self.nodes.reserve((code_len + 2) * self.beam_size + 2);
    }

    /// Open a new beam at the arena tail.
    pub fn begin_step(&mut self) {
        self.steps.push(self.nodes.len());
        self.heap.clear();
        self.free = None;
    }

    /// Add a fully built (featurized and scored) candidate to the open
    /// step, keeping only the `beam_size` best.
    pub fn emplace(&mut self, node: Node) {
        let score = node.score;
        let slot = match self.free.take() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.heap.push(Reverse(HeapSlot { score, slot }));
        if self.heap.len() > self.beam_size {
            if let Some(Reverse(min)) = self.heap.pop() {
                self.free = Some(min.slot);
            }
        }
    }

    /// Freeze the open beam: survivors are compacted to the step start and
    /// ordered by descending score, ties by slot order.
    pub fn end_step(&mut self) {
        let start = *self.steps.last().expect("no open step");
        let mut order: Vec<HeapSlot> = self.heap.drain().map(|Reverse(entry)| entry).collect();
        order.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        let mut beam: Vec<Node> = order
            .iter()
            .map(|entry| std::mem::take(&mut self.nodes[entry.slot]))
            .collect();
        self.nodes.truncate(start);
        self.nodes.append(&mut beam);
        self.free = None;
    }

    /// Append a node to the most recent beam after it was frozen,
    /// bypassing pruning. Returns the new slot.
    pub fn force(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, slot: usize) -> &Node {
        &self.nodes[slot]
    }

    /// Number of steps begun so far.
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn beam_range(&self, step: usize) -> Range<usize> {
        let start = self.steps[step];
        let end = self
            .steps
            .get(step + 1)
            .copied()
            .unwrap_or(self.nodes.len());
        start..end
    }

    pub fn beam(&self, step: usize) -> &[Node] {
        &self.nodes[self.beam_range(step)]
    }

    pub fn back_range(&self) -> Range<usize> {
        if self.steps.is_empty() {
            return 0..0;
        }
        self.beam_range(self.steps.len() - 1)
    }

    /// The most recent beam.
    pub fn back(&self) -> &[Node] {
        &self.nodes[self.back_range()]
    }

    /// Slots of the path ending at `rear`, root first.
    pub fn path_slots(&self, rear: usize) -> Vec<usize> {
        let mut slots = Vec::with_capacity(self.steps.len());
        let mut cur = Some(rear);
        while let Some(slot) = cur {
            slots.push(slot);
            cur = self.nodes[slot].prev;
        }
        slots.reverse();
        slots
    }

    /// Back-pointer paths for the top `max` nodes of the final beam, best
    /// first. Each path holds one slot per step.
    pub fn paths(&self, max: usize) -> Vec<Vec<usize>> {
        self.back_range()
            .take(max)
            .map(|rear| self.path_slots(rear))
            .collect()
    }
}
