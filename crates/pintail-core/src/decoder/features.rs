//! Feature construction for lattice nodes.
//!
//! Keys live in a flat string namespace: `unigram:<text>` and
//! `bigram:<prev>_<cur>` are local (they fire on every path through the
//! node), `code_len:<n>` is global (the pending span length only means
//! something at the rear of a path).

use crate::dict::{Dictionary, WordId};

use super::lattice::{Lattice, Node};

pub(super) fn unigram_key(text: &str) -> String {
    format!("unigram:{text}")
}

pub(super) fn bigram_key(prev: &str, cur: &str) -> String {
    format!("bigram:{prev}_{cur}")
}

pub(super) fn code_len_key(len: usize) -> String {
    format!("code_len:{len}")
}

/// Text of a word; empty for the BOS/EOS sentinel.
pub(super) fn word_text(dict: &Dictionary, id: WordId) -> &str {
    if id == WordId::BOS_EOS {
        ""
    } else {
        &dict.word(id).text
    }
}

/// Attach the features contributed by a freshly built node at step `pos`.
///
/// Sentinel words have no text and emit no unigram, but they still anchor
/// bigrams, which is how sentence-boundary n-grams arise.
pub(super) fn make_features(node: &mut Node, lattice: &Lattice, dict: &Dictionary, pos: usize) {
    if let Some(word) = node.word {
        let text = word_text(dict, word);
        if !text.is_empty() {
            node.local_features.push((unigram_key(text), 1.0));
        }
        if let Some(prev_id) = node.prev_word.and_then(|slot| lattice.node(slot).word) {
            node.local_features
                .push((bigram_key(word_text(dict, prev_id), text), 1.0));
        }
    }

    if node.code_pos < pos {
        node.global_features
            .push((code_len_key(pos - node.code_pos), 1.0));
    }
}
