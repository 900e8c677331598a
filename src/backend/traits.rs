//! Backend Contract
//!
//! The polymorphic interface every model adapter implements. The dispatcher
//! only ever talks to `dyn LlmBackend`; prompt grammars, role markers, and
//! scoring-window conventions stay inside the adapters.
//!
//! # Design Philosophy
//!
//! `assemble_prompt`, `tokenize`, `generate`, and `score` are the
//! independently overridable primitives. The compositions every request
//! handler needs (`ask`, `perplexities`, `rank_answers`) are provided here
//! once, so ranking policy and the empty-input short-circuit cannot drift
//! between model families.

use async_trait::async_trait;

use crate::chat::ChatTurn;
use crate::engine::EngineError;
use crate::scoring::{perplexity, rank_ascending};

/// Errors surfaced by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The underlying engine call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The contract every model adapter satisfies.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stable backend name used in queue naming and logs.
    fn name(&self) -> &str;

    /// Force tokenizer and engine construction eagerly.
    ///
    /// Idempotent: concurrent and repeated calls initialize at most once.
    /// Called at process start to trade startup latency for predictable
    /// first-request latency; skipping it only defers the same work to the
    /// first request.
    async fn warmup(&self) -> Result<(), BackendError>;

    /// Render the system preamble, a bounded history suffix, and the new
    /// message with this model's role markers.
    ///
    /// Reads at most the configured context depth of `history`; older turns
    /// are dropped, not summarized.
    fn assemble_prompt(&self, message: &str, history: &[ChatTurn]) -> String;

    /// Split `text` into this model's token vocabulary.
    async fn tokenize(&self, text: &str) -> Result<Vec<String>, BackendError>;

    /// Decode a reply to `prompt` with fixed greedy decoding parameters.
    ///
    /// The returned text never includes the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// Log-probabilities for each of `targets` as a continuation of
    /// `prompt`, one sequence per target, in input order.
    ///
    /// Each returned sequence covers exactly the target-attributable window
    /// for this model family (see the concrete adapters).
    async fn score(&self, prompt: &str, targets: &[String])
        -> Result<Vec<Vec<f64>>, BackendError>;

    /// Generate a reply to `message` given `history`.
    async fn ask(&self, message: &str, history: &[ChatTurn]) -> Result<String, BackendError> {
        let prompt = self.assemble_prompt(message, history);
        self.generate(&prompt).await
    }

    /// Perplexity of each answer as a continuation of the zero-history
    /// prompt for `question`. Lower is better.
    async fn perplexities(
        &self,
        question: &str,
        answers: &[String],
    ) -> Result<Vec<f64>, BackendError> {
        let prompt = self.assemble_prompt(question, &[]);
        let log_probs = self.score(&prompt, answers).await?;
        Ok(log_probs.iter().map(|lp| perplexity(lp)).collect())
    }

    /// Indices of `answers` ordered best to worst by perplexity.
    ///
    /// An empty `answers` list returns an empty ranking immediately, without
    /// any engine call. Ties keep input order.
    async fn rank_answers(
        &self,
        question: &str,
        answers: &[String],
    ) -> Result<Vec<usize>, BackendError> {
        if answers.is_empty() {
            return Ok(Vec::new());
        }
        let scores = self.perplexities(question, answers).await?;
        Ok(rank_ascending(&scores))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Minimal contract implementation that fails if any engine primitive
    /// is reached. Lets the default methods be tested in isolation.
    struct NoEngineBackend {
        score_calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for NoEngineBackend {
        fn name(&self) -> &str {
            "no-engine"
        }

        async fn warmup(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn assemble_prompt(&self, message: &str, _history: &[ChatTurn]) -> String {
            message.to_string()
        }

        async fn tokenize(&self, _text: &str) -> Result<Vec<String>, BackendError> {
            unreachable!("tokenize must not be called")
        }

        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            unreachable!("generate must not be called")
        }

        async fn score(
            &self,
            _prompt: &str,
            targets: &[String],
        ) -> Result<Vec<Vec<f64>>, BackendError> {
            self.score_calls.fetch_add(1, Ordering::SeqCst);
            // One token at log-prob -ln(k) gives perplexity k, making the
            // expected ordering easy to read off in assertions.
            Ok(targets
                .iter()
                .enumerate()
                .map(|(i, _)| vec![-(([3.0f64, 1.0, 2.0][i]).ln())])
                .collect())
        }
    }

    #[tokio::test]
    async fn test_rank_answers_empty_short_circuits() {
        let backend = NoEngineBackend {
            score_calls: AtomicUsize::new(0),
        };

        let ranked = backend.rank_answers("q", &[]).await.unwrap();
        assert!(ranked.is_empty());
        assert_eq!(backend.score_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rank_answers_orders_by_perplexity() {
        let backend = NoEngineBackend {
            score_calls: AtomicUsize::new(0),
        };

        let answers = vec!["a0".to_string(), "a1".to_string(), "a2".to_string()];
        // Stub perplexities come out [3.0, 1.0, 2.0].
        let ranked = backend.rank_answers("q", &answers).await.unwrap();
        assert_eq!(ranked, vec![1, 2, 0]);
        assert_eq!(backend.score_calls.load(Ordering::SeqCst), 1);
    }
}
