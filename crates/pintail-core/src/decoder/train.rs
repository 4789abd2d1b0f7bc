//! Structured-perceptron training with early update.
//!
//! A sample is first decoded under its target text, which yields the set
//! of oracle paths (several segmentations can spell the same text). The
//! code is then re-decoded without the constraint while `match_step`
//! tracks where each oracle path sits in every beam. The moment all of
//! them have fallen out, the best-surviving oracle node is forced back in
//! and search stops: the gradient is taken over the prefix beam, which is
//! exactly where the model went wrong. Softmax deltas over that beam move
//! weight toward the oracle path and away from the rest.

use std::io::{self, BufRead};

use rayon::prelude::*;
use tracing::{debug, debug_span, info};

use crate::corpus;
use crate::metrics::Metrics;

use super::lattice::Lattice;
use super::{softmax, Decoder};

/// Marker for an oracle path that has fallen out of the beam.
const FALLEN: usize = usize::MAX;

/// Outcome of one training sample that produced an update.
#[derive(Debug, Clone, Copy)]
pub struct SampleReport {
    /// Step index reached by the tracked decode; `code.len() + 2` when
    /// the whole decode, terminal step included, matched an oracle path.
    pub pos: usize,
    /// Final-beam index of the matched (or forced) oracle path.
    pub label: usize,
    /// Softmax probability assigned to the oracle path.
    pub prob: f64,
    /// Whether search stopped before the full decode completed.
    pub early_update: bool,
}

/// A computed gradient waiting for its serial weight application.
struct PendingUpdate {
    lattice: Lattice,
    deltas: Vec<f64>,
    report: SampleReport,
}

#[derive(Debug, Default)]
struct TrainStats {
    count: usize,
    success: usize,
    precision: usize,
    early_updates: usize,
    loss: f64,
}

impl TrainStats {
    fn absorb(&mut self, reports: &[Option<SampleReport>]) {
        self.count += reports.len();
        for report in reports.iter().flatten() {
            self.success += 1;
            if report.label == 0 {
                self.precision += 1;
            }
            if report.early_update {
                self.early_updates += 1;
            }
            self.loss += -report.prob.ln();
        }
    }

    fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.set("count", self.count as f64);
        metrics.set("success rate", self.success as f64 / self.count as f64);
        metrics.set("precision", self.precision as f64 / self.success as f64);
        metrics.set("loss", self.loss / self.success as f64);
        metrics.set(
            "early update rate",
            self.early_updates as f64 / self.success as f64,
        );
        metrics
    }
}

impl Decoder {
    /// Train on one `(code, text)` sample.
    ///
    /// Returns `None` when no oracle path exists even after retrying with
    /// a doubled beam; such samples are skipped.
    pub fn update(&mut self, code: &str, text: &str) -> Option<SampleReport> {
        let pending = self.early_update(code, text)?;
        self.apply(&pending);
        Some(pending.report)
    }

    /// Train on a batch: gradients are computed in parallel against the
    /// weights as of batch start, then applied serially in input order.
    pub fn update_batch(&mut self, samples: &[(String, String)]) -> Vec<Option<SampleReport>> {
        let this = &*self;
        let pendings: Vec<Option<PendingUpdate>> = samples
            .par_iter()
            .map(|(code, text)| this.early_update(code, text))
            .collect();

        pendings
            .iter()
            .map(|pending| {
                pending.as_ref().map(|p| {
                    self.apply(p);
                    p.report
                })
            })
            .collect()
    }

    fn apply(&mut self, pending: &PendingUpdate) {
        self.model.update_beam(&pending.lattice, &pending.deltas);
    }

    /// Decode oracle paths, re-decode tracking them, and compute softmax
    /// deltas over the beam where search stopped.
    fn early_update(&self, code: &str, text: &str) -> Option<PendingUpdate> {
        let _span = debug_span!("early_update", code, text).entered();

        let mut oracle = Lattice::new();
        if !self.decode(code, Some(text), &mut oracle, self.beam_size)
            && !self.decode(code, Some(text), &mut oracle, self.beam_size * 2)
        {
            debug!(code, text, "no oracle path, sample skipped");
            return None;
        }
        let paths = oracle.paths(usize::MAX);

        let mut lattice = Lattice::new();
        lattice.init(code.len(), self.beam_size);
        self.begin_decode(&mut lattice);

        // Every oracle path starts at the root.
        let root = lattice.back_range().start;
        let mut tracked = vec![root; paths.len()];

        let mut matched = true;
        let mut pos = 1;
        while matched && pos <= code.len() {
            self.advance(code, None, pos, &mut lattice);
            matched = self.match_step(&oracle, &paths, &mut lattice, pos, &mut tracked);
            pos += 1;
        }
        if matched {
            self.end_decode(code, None, &mut lattice);
            matched = self.match_step(&oracle, &paths, &mut lattice, pos, &mut tracked);
            if matched {
                pos += 1;
            }
        }

        let beam = lattice.back_range();
        let label_slot = tracked
            .iter()
            .copied()
            .find(|&slot| slot != FALLEN)
            .expect("fallout keeps one oracle path in the beam");
        let label = label_slot - beam.start;

        let probs = softmax(lattice.back());
        let prob = probs[label];
        let mut deltas: Vec<f64> = probs.iter().map(|p| -p).collect();
        deltas[label] += 1.0;

        let report = SampleReport {
            pos,
            label,
            prob,
            early_update: pos < code.len() + 2,
        };
        debug!(pos, label, prob, "gradient computed");
        Some(PendingUpdate {
            lattice,
            deltas,
            report,
        })
    }

    /// Locate every still-alive oracle path in the beam at `pos`.
    ///
    /// A path survives when some beam node extends the path's node of the
    /// previous step with the same word. When none survives, the first
    /// path whose ancestor is still in the previous beam is forced back in
    /// past pruning, so the gradient can see it; `false` signals fallout.
    fn match_step(
        &self,
        oracle: &Lattice,
        paths: &[Vec<usize>],
        lattice: &mut Lattice,
        pos: usize,
        tracked: &mut Vec<usize>,
    ) -> bool {
        let prev = std::mem::replace(tracked, vec![FALLEN; paths.len()]);
        let beam = lattice.beam_range(pos);
        let mut found = false;

        for (i, path) in paths.iter().enumerate() {
            if prev[i] == FALLEN {
                continue;
            }
            let word = oracle.node(path[pos]).word;
            for slot in beam.clone() {
                let node = lattice.node(slot);
                if node.prev == Some(prev[i]) && node.word == word {
                    tracked[i] = slot;
                    found = true;
                    break;
                }
            }
        }

        if !found {
            let i = prev
                .iter()
                .position(|&slot| slot != FALLEN)
                .expect("an oracle ancestor survives the previous beam");
            let mut node = oracle.node(paths[i][pos]).clone();
            let anchor = prev[i];
            let (anchor_word, anchor_prev_word) = {
                let a = lattice.node(anchor);
                (a.word, a.prev_word)
            };
            node.prev = Some(anchor);
            node.prev_word = if anchor_word.is_some() {
                Some(anchor)
            } else {
                anchor_prev_word
            };
            tracked[i] = lattice.force(node);
        }

        found
    }

    /// Train over a stream of `code text` rows, updating in batches.
    pub fn train<R: BufRead>(&mut self, reader: R, batch_size: usize) -> io::Result<Metrics> {
        let _span = debug_span!("train", batch_size).entered();
        let batch_size = batch_size.max(1);
        let mut stats = TrainStats::default();
        let mut batches = 0usize;
        let mut batch: Vec<(String, String)> = Vec::with_capacity(batch_size);

        for pair in corpus::pairs(reader) {
            batch.push(pair?);
            if batch.len() >= batch_size {
                let reports = self.update_batch(&batch);
                stats.absorb(&reports);
                batch.clear();
                batches += 1;
                if batches % 100 == 0 {
                    info!(
                        batches,
                        count = stats.count,
                        success_rate = stats.success as f64 / stats.count as f64,
                        loss = stats.loss / stats.success as f64,
                        early_update_rate = stats.early_updates as f64 / stats.success as f64,
                        "training progress"
                    );
                }
            }
        }
        if !batch.is_empty() {
            let reports = self.update_batch(&batch);
            stats.absorb(&reports);
        }

        let metrics = stats.metrics();
        info!(%metrics, "training pass finished");
        Ok(metrics)
    }

    /// Score a held-out stream of `code text` rows.
    pub fn evaluate<R: BufRead>(&self, reader: R, batch_size: usize) -> io::Result<Metrics> {
        let _span = debug_span!("evaluate", batch_size).entered();
        let batch_size = batch_size.max(1);
        let mut count = 0usize;
        let mut success = 0usize;
        let mut precision = 0usize;
        let mut in_beam = 0usize;
        let mut loss = 0.0f64;
        let mut batch: Vec<(String, String)> = Vec::with_capacity(batch_size);

        let mut drain = |batch: &mut Vec<(String, String)>| {
            let results: Vec<_> = batch
                .par_iter()
                .map(|(code, text)| self.predict_target(code, text))
                .collect();
            count += batch.len();
            for target in results.into_iter().flatten() {
                success += 1;
                loss += -target.prob.ln();
                if target.rank < self.beam_size {
                    in_beam += 1;
                    if target.rank == 0 {
                        precision += 1;
                    }
                }
            }
            batch.clear();
        };

        for pair in corpus::pairs(reader) {
            batch.push(pair?);
            if batch.len() >= batch_size {
                drain(&mut batch);
            }
        }
        if !batch.is_empty() {
            drain(&mut batch);
        }

        let mut metrics = Metrics::new();
        metrics.set("count", count as f64);
        metrics.set("success rate", success as f64 / count as f64);
        metrics.set("precision", precision as f64 / success as f64);
        metrics.set(format!("p@{}", self.beam_size), in_beam as f64 / success as f64);
        metrics.set("loss", loss / success as f64);
        info!(%metrics, "evaluation finished");
        Ok(metrics)
    }
}
