//! Shift/reduce lattice expansion.
//!
//! A node at step `pos` represents a partial derivation covering
//! `code[..code_pos]` with the pending span `code[code_pos..pos]` still
//! unreduced. Each step expands every surviving predecessor by one shift
//! (grow the pending span by a byte) and one reduction per dictionary word
//! matching the span exactly.

use tracing::{debug, debug_span};

use crate::dict::WordId;

use super::features;
use super::lattice::{Lattice, Node};
use super::Decoder;

impl Decoder {
    /// Run a full beam-search decode of `code` into `lattice`.
    ///
    /// With `text` supplied, only reductions consistent with the target
    /// text are admitted and only paths that consumed all of it survive
    /// `end_decode`. Returns whether the final beam is non-empty.
    pub fn decode(
        &self,
        code: &str,
        text: Option<&str>,
        lattice: &mut Lattice,
        beam_size: usize,
    ) -> bool {
        let _span = debug_span!("decode", code, beam_size).entered();

        lattice.init(code.len(), beam_size);
        let mut alive = self.begin_decode(lattice);
        for pos in 1..=code.len() {
            if !alive {
                break;
            }
            alive = self.advance(code, text, pos, lattice);
        }
        if alive {
            alive = self.end_decode(code, text, lattice);
        }

        if !alive {
            debug!(code, text = text.unwrap_or(""), "empty beam, decode failed");
        }
        alive
    }

    /// Push the virtual root. Its sentinel word lets the first reduction
    /// emit a sentence-initial bigram.
    pub(super) fn begin_decode(&self, lattice: &mut Lattice) -> bool {
        lattice.begin_step();
        lattice.emplace(Node::root(Some(WordId::BOS_EOS)));
        lattice.end_step();
        true
    }

    /// Expand every node of the previous beam at input position `pos`.
    pub(super) fn advance(
        &self,
        code: &str,
        text: Option<&str>,
        pos: usize,
        lattice: &mut Lattice,
    ) -> bool {
        let prev_beam = lattice.back_range();
        lattice.begin_step();

        for prev_slot in prev_beam {
            let (code_pos, text_pos, prev_local_score) = {
                let prev = lattice.node(prev_slot);
                (prev.code_pos, prev.text_pos, prev.local_score)
            };

            if self.shift_allowed(code, code_pos, pos) {
                let mut node = Node::shift(prev_slot, lattice.node(prev_slot));
                features::make_features(&mut node, lattice, &self.dict, pos);
                self.model.compute_score(prev_local_score, &mut node);
                lattice.emplace(node);
            }

            let span = &code[code_pos..pos];
            for (id, word) in self.dict.find(span) {
                if !reduce_allowed(text, text_pos, &word.text) {
                    continue;
                }
                let mut node = Node::reduce(
                    prev_slot,
                    lattice.node(prev_slot),
                    pos,
                    text_pos + word.text.len(),
                    id,
                );
                features::make_features(&mut node, lattice, &self.dict, pos);
                self.model.compute_score(prev_local_score, &mut node);
                lattice.emplace(node);
            }
        }

        lattice.end_step();
        !lattice.back().is_empty()
    }

    /// Close the lattice with a beam of terminal nodes, one per
    /// predecessor that consumed the whole code (and text, when
    /// constrained). The sentinel word yields a sentence-final bigram.
    pub(super) fn end_decode(&self, code: &str, text: Option<&str>, lattice: &mut Lattice) -> bool {
        let prev_beam = lattice.back_range();
        lattice.begin_step();

        for prev_slot in prev_beam {
            let prev = lattice.node(prev_slot);
            if prev.code_pos != code.len() || text.is_some_and(|t| prev.text_pos != t.len()) {
                continue;
            }
            let prev_local_score = prev.local_score;
            let mut node = Node::reduce(prev_slot, prev, prev.code_pos, prev.text_pos, WordId::BOS_EOS);
            features::make_features(&mut node, lattice, &self.dict, code.len());
            self.model.compute_score(prev_local_score, &mut node);
            lattice.emplace(node);
        }

        lattice.end_step();
        !lattice.back().is_empty()
    }

    /// A longer pending span could never match any dictionary code, and a
    /// span still pending at the last byte can never reduce at all.
    fn shift_allowed(&self, code: &str, code_pos: usize, pos: usize) -> bool {
        pos < code.len() && pos - code_pos < self.dict.max_code_len()
    }
}

/// Under a target text, a reduction must reproduce the next text bytes.
fn reduce_allowed(text: Option<&str>, text_pos: usize, word_text: &str) -> bool {
    match text {
        None => true,
        Some(t) => t
            .get(text_pos..)
            .is_some_and(|rest| rest.starts_with(word_text)),
    }
}
