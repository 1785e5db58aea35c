//! Structured training log output.
//!
//! A small purpose-built logger rather than a global logging facade: training
//! progress goes to stderr, gated by a [`Verbosity`] level the caller picks
//! per trainer.

use super::loss::LossResults;

/// How much training output to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No output.
    Silent,
    /// One line per iteration.
    #[default]
    Info,
}

/// Per-round training log writer.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    /// Create a logger with the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Announce the start of a training run.
    pub fn start_training(&self, num_iterations: usize, num_examples: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!(
                "training gradient boosted trees: {} iterations on {} examples",
                num_iterations, num_examples
            );
        }
    }

    /// Log the metrics of one finished iteration.
    pub fn log_round(
        &self,
        round: usize,
        train: &LossResults,
        valid: Option<&LossResults>,
        metric_names: &[&'static str],
    ) {
        if self.verbosity < Verbosity::Info {
            return;
        }
        let mut line = format!("iter:{} train-loss:{:.6}", round, train.loss);
        for (name, value) in metric_names.iter().zip(&train.secondary_metrics) {
            line.push_str(&format!(" train-{}:{:.6}", name, value));
        }
        if let Some(valid) = valid {
            line.push_str(&format!(" valid-loss:{:.6}", valid.loss));
            for (name, value) in metric_names.iter().zip(&valid.secondary_metrics) {
                line.push_str(&format!(" valid-{}:{:.6}", name, value));
            }
        }
        eprintln!("{}", line);
    }

    /// Log that early stopping triggered.
    pub fn log_early_stopping(&self, round: usize, best_round: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!(
                "early stopping at iteration {} (best iteration: {})",
                round, best_round
            );
        }
    }

    /// Announce the end of a training run.
    pub fn finish_training(&self, num_trees: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("training done: {} trees", num_trees);
        }
    }
}
