//! Code-to-text decoding via shift/reduce beam search, and online
//! structured-perceptron training with early update.
//!
//! `Decoder` drives the lattice expansion in `search`, scores candidates
//! through the shared sparse `Model`, and exposes prediction here. The
//! training side (oracle matching, early update, batch gradients) lives in
//! `train`.

mod features;
pub mod lattice;
mod search;
mod train;

#[cfg(test)]
mod tests;

use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::dict::Dictionary;
use crate::model::{Model, DEFAULT_LEARNING_RATE};

use lattice::{Lattice, Node};

pub use train::SampleReport;

pub const DEFAULT_BEAM_SIZE: usize = 20;

/// One ranked candidate returned by prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub text: String,
    pub prob: f64,
}

/// Where a known target text landed in the prediction list.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TargetPrediction {
    /// Index in the final beam; `beam_size` when the target was only
    /// reachable through a constrained decode.
    pub rank: usize,
    pub prob: f64,
}

pub struct Decoder {
    dict: Arc<Dictionary>,
    beam_size: usize,
    model: Model,
}

impl Decoder {
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self::with_params(dict, DEFAULT_BEAM_SIZE, DEFAULT_LEARNING_RATE)
    }

    pub fn with_params(dict: Arc<Dictionary>, beam_size: usize, learning_rate: f64) -> Self {
        Decoder {
            dict,
            beam_size,
            model: Model::new(learning_rate),
        }
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Replace the model, e.g. with one deserialized elsewhere.
    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    pub fn save_model(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.model.save(path)
    }

    pub fn load_model(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        self.model.load(path)
    }

    /// Top `num` candidate texts for `code` with softmax probabilities.
    ///
    /// An empty result means the final beam was empty: no sequence of
    /// dictionary words covers the code.
    pub fn predict(&self, code: &str, num: usize) -> Vec<Prediction> {
        let mut lattice = Lattice::new();
        if !self.decode(code, None, &mut lattice, self.beam_size) {
            return Vec::new();
        }

        let probs = softmax(lattice.back());
        lattice
            .paths(num)
            .iter()
            .zip(&probs)
            .map(|(path, &prob)| Prediction {
                text: self.path_text(&lattice, path),
                prob,
            })
            .collect()
    }

    /// Rank and probability of a known target text for `code`.
    ///
    /// When the target is missing from the free beam, a text-constrained
    /// decode supplies its score; the probability then weighs that score
    /// against the whole free beam and the rank is the `beam_size`
    /// sentinel. `None` means the target is not reachable at all.
    pub fn predict_target(&self, code: &str, text: &str) -> Option<TargetPrediction> {
        let mut lattice = Lattice::new();
        if !self.decode(code, None, &mut lattice, self.beam_size) {
            return None;
        }

        let probs = softmax(lattice.back());
        for (rank, path) in lattice.paths(usize::MAX).iter().enumerate() {
            if self.path_text(&lattice, path) == text {
                return Some(TargetPrediction {
                    rank,
                    prob: probs[rank],
                });
            }
        }

        let free_scores: Vec<f64> = lattice.back().iter().map(|n| n.score).collect();
        let mut constrained = Lattice::new();
        if !self.decode(code, Some(text), &mut constrained, self.beam_size) {
            return None;
        }
        let target = constrained.back().first()?.score;

        let max = free_scores.iter().copied().fold(target, f64::max);
        let sum: f64 =
            free_scores.iter().map(|s| (s - max).exp()).sum::<f64>() + (target - max).exp();
        Some(TargetPrediction {
            rank: self.beam_size,
            prob: (target - max).exp() / sum,
        })
    }

    /// Concatenated word texts along a path.
    fn path_text(&self, lattice: &Lattice, slots: &[usize]) -> String {
        let mut text = String::new();
        for &slot in slots {
            if let Some(id) = lattice.node(slot).word {
                text.push_str(features::word_text(&self.dict, id));
            }
        }
        text
    }
}

/// Softmax over a beam's scores, computed against the maximum so large
/// learned scores cannot overflow `exp`.
fn softmax(beam: &[Node]) -> Vec<f64> {
    let max = beam
        .iter()
        .map(|n| n.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = beam.iter().map(|n| (n.score - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
