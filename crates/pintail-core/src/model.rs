//! Sparse linear model over string-keyed features.
//!
//! Weights default to zero: a feature absent from the map contributes
//! nothing to a score. Updates are plain SGD steps scaled by the learning
//! rate. The on-disk format is one `key<TAB>weight` line per feature.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::decoder::lattice::{Feature, Lattice, Node};

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct Model {
    weights: HashMap<String, f64>,
    learning_rate: f64,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl Model {
    pub fn new(learning_rate: f64) -> Self {
        Model {
            weights: HashMap::new(),
            learning_rate,
        }
    }

    /// Weighted sum of the given features; missing keys contribute zero.
    pub fn score(&self, features: &[Feature]) -> f64 {
        features
            .iter()
            .map(|(key, value)| value * self.weights.get(key).copied().unwrap_or(0.0))
            .sum()
    }

    /// Score a freshly built node.
    ///
    /// Local features are additive along a path, so the node's accumulated
    /// local score is the predecessor's plus its own contribution. Global
    /// features count only while this node is the rear of a path.
    pub fn compute_score(&self, prev_local_score: f64, node: &mut Node) {
        node.local_score = prev_local_score + self.score(&node.local_features);
        node.score = node.local_score + self.score(&node.global_features);
    }

    /// One SGD step: `weight[key] += value * delta * learning_rate`.
    pub fn update(&mut self, features: &[Feature], delta: f64) {
        for (key, value) in features {
            *self.weights.entry(key.clone()).or_insert(0.0) += value * delta * self.learning_rate;
        }
    }

    /// Apply one gradient step to every feature of the path ending at
    /// `slot`: the rear node's global features plus the local features of
    /// the whole ancestor chain.
    pub fn update_path(&mut self, lattice: &Lattice, slot: usize, delta: f64) {
        self.update(&lattice.node(slot).global_features, delta);
        let mut cur = Some(slot);
        while let Some(s) = cur {
            let node = lattice.node(s);
            self.update(&node.local_features, delta);
            cur = node.prev;
        }
    }

    /// Batched form of `update_path` over a lattice's final beam: one
    /// delta per beam node, applied in beam order.
    pub fn update_beam(&mut self, lattice: &Lattice, deltas: &[f64]) {
        let beam = lattice.back_range();
        debug_assert_eq!(beam.len(), deltas.len());
        for (slot, &delta) in beam.zip(deltas) {
            self.update_path(lattice, slot, delta);
        }
    }

    pub fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn save_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for (key, weight) in &self.weights {
            writeln!(writer, "{key}\t{weight}")?;
        }
        info!(features = self.weights.len(), "model saved");
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_to(&mut writer)?;
        writer.flush()
    }

    /// Replace the weights with entries read from `reader`.
    ///
    /// Unknown feature keys are accepted verbatim; malformed lines are
    /// skipped with a warning.
    pub fn load_from<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        self.weights.clear();
        for (no, line) in reader.lines().enumerate() {
            let line = line?;
            let parsed = line
                .split_once('\t')
                .and_then(|(key, weight)| Some((key, weight.trim().parse::<f64>().ok()?)));
            match parsed {
                Some((key, weight)) => {
                    self.weights.insert(key.to_string(), weight);
                }
                None => {
                    if !line.trim().is_empty() {
                        warn!(line = no + 1, "skipping malformed weight line");
                    }
                }
            }
        }
        info!(features = self.weights.len(), "model loaded");
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        self.load_from(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> Vec<Feature> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn score_ignores_missing_keys() {
        let mut model = Model::new(0.5);
        model.update(&features(&[("unigram:你", 1.0)]), 2.0);
        let score = model.score(&features(&[("unigram:你", 1.0), ("unigram:好", 1.0)]));
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn update_strictly_increases_score() {
        let mut model = Model::new(0.01);
        let feats = features(&[("unigram:你好", 1.0), ("code_len:2", 1.0)]);
        let before = model.score(&feats);
        model.update(&feats, 1.0);
        assert!(model.score(&feats) > before);
    }

    #[test]
    fn compute_score_accumulates_local_scores() {
        let mut model = Model::new(1.0);
        model.update(&features(&[("unigram:a", 1.0)]), 1.0);
        model.update(&features(&[("code_len:1", 1.0)]), -2.0);

        let mut node = Node {
            local_features: features(&[("unigram:a", 1.0)]),
            global_features: features(&[("code_len:1", 1.0)]),
            ..Node::default()
        };
        model.compute_score(0.5, &mut node);
        assert!((node.local_score - 1.5).abs() < 1e-12);
        assert!((node.score - (1.5 - 2.0)).abs() < 1e-12);
    }

    #[test]
    fn save_load_round_trips_exactly() {
        let mut model = Model::new(0.01);
        model.update(&features(&[("unigram:你好", 1.0)]), 0.3125);
        model.update(&features(&[("bigram:你_好", 1.0)]), -1.0);
        model.update(&features(&[("code_len:3", 1.0)]), 7.0);

        let mut buf = Vec::new();
        model.save_to(&mut buf).unwrap();

        let mut loaded = Model::new(0.01);
        loaded.load_from(buf.as_slice()).unwrap();
        assert_eq!(loaded.len(), model.len());
        for key in ["unigram:你好", "bigram:你_好", "code_len:3"] {
            assert_eq!(loaded.weight(key), model.weight(key));
        }
    }

    #[test]
    fn load_skips_malformed_lines() {
        let mut model = Model::new(0.01);
        model
            .load_from("unigram:你\t0.5\nnonsense\nbigram:a_b\tnot-a-number\n".as_bytes())
            .unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.weight("unigram:你"), 0.5);
    }
}
