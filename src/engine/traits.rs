//! Engine Traits
//!
//! Trait definitions for the tokenizer provider and the batched
//! generation/scoring engine. Backends hold these as `Arc<dyn …>` handles,
//! so any engine runtime that can tokenize, generate, and score token
//! sequences can sit behind a switchboard backend.

use async_trait::async_trait;

/// Errors surfaced by engine collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The HTTP request to the engine failed outright.
    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine answered with a non-success status.
    #[error("engine returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The engine answered 2xx but the payload was missing a field.
    #[error("engine response missing field: {0}")]
    MalformedResponse(&'static str),

    /// Model or tokenizer construction failed. Fatal at process startup;
    /// there is no per-request recovery.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// Fixed decoding parameters for one generation call.
///
/// The switchboard always decodes greedily: beam of one, a fixed repetition
/// penalty, and a hard output-length bound. Engines are assumed
/// deterministic under these settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodingParams {
    /// Maximum number of tokens to decode.
    pub max_tokens: usize,
    /// Beam width. Always `1` for switchboard traffic.
    pub beam_size: usize,
    /// Repetition penalty applied during decoding.
    pub repetition_penalty: f64,
    /// Whether the prompt tokens are echoed back in the result. Always
    /// `false`: handlers must never see their own prompt.
    pub include_prompt: bool,
}

impl DecodingParams {
    /// Greedy decoding bounded at `max_tokens`.
    #[must_use]
    pub fn greedy(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            beam_size: 1,
            repetition_penalty: 1.2,
            include_prompt: false,
        }
    }
}

/// What the engine must construct during warmup.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadSpec {
    /// Model identifier understood by the engine (e.g. a hub repo id).
    pub model_id: String,
    /// Tokenizer identifier understood by the engine.
    pub tokenizer_id: String,
    /// Threads the engine may use inside one batched call.
    pub intra_threads: usize,
    /// Concurrent batched calls the engine should size itself for.
    pub inter_threads: usize,
}

/// Tokenizer provider.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Split `text` into the engine's token vocabulary.
    ///
    /// Deterministic and side-effect-free once the tokenizer is loaded.
    async fn tokenize(&self, text: &str) -> Result<Vec<String>, EngineError>;
}

/// Batched generation/scoring engine.
///
/// Implementations are expected to be safe to invoke concurrently from
/// multiple workers; the dispatcher performs no locking around engine calls.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Construct the model and tokenizer eagerly.
    ///
    /// Called once per process through the backend's warmup guard.
    async fn load(&self, spec: &LoadSpec) -> Result<(), EngineError>;

    /// Decode a continuation of `tokens` in batch-of-one mode.
    ///
    /// Returns decoded text, never including the prompt.
    async fn generate(
        &self,
        tokens: &[String],
        params: &DecodingParams,
    ) -> Result<String, EngineError>;

    /// Score `targets` against their `sources`, one log-probability sequence
    /// per pair, in input order. Used by encoder-decoder models where the
    /// prompt and the scored continuation live in separate sequences.
    async fn score_paired(
        &self,
        sources: &[Vec<String>],
        targets: &[Vec<String>],
    ) -> Result<Vec<Vec<f64>>, EngineError>;

    /// Score each joint sequence in `sequences`, one log-probability
    /// sequence per input, in input order. Used by decoder-only models where
    /// prompt and continuation share one sequence.
    async fn score_joint(&self, sequences: &[Vec<String>]) -> Result<Vec<Vec<f64>>, EngineError>;
}
