//! Model Backends
//!
//! Each model family gets a thin adapter that satisfies one behavioral
//! contract: assemble a model-specific prompt, drive the engine, and reduce
//! log-probabilities to a ranking signal. Everything above the contract
//! (dispatch, routing, reply publishing) stays model-agnostic.
//!
//! # Available Backends
//!
//! - [`SeqToSeqBackend`]: encoder-decoder chat models (FastChat/T5 family)
//! - [`CausalBackend`]: decoder-only chat models (Llama-2-chat family)

mod causal;
mod seq2seq;
mod traits;

use std::sync::Arc;

pub use causal::CausalBackend;
pub use seq2seq::SeqToSeqBackend;
pub use traits::{BackendError, LlmBackend};

use crate::config::{ModelFamily, ServiceConfig};
use crate::engine::{InferenceEngine, Tokenizer};

/// Construct the backend selected by `config.model_family`.
///
/// Selection happens here, at construction time, never by downcasting or
/// subclass dispatch later.
#[must_use]
pub fn for_family(
    config: &ServiceConfig,
    tokenizer: Arc<dyn Tokenizer>,
    engine: Arc<dyn InferenceEngine>,
) -> Arc<dyn LlmBackend> {
    match config.model_family {
        ModelFamily::SeqToSeq => Arc::new(SeqToSeqBackend::new(config, tokenizer, engine)),
        ModelFamily::Causal => Arc::new(CausalBackend::new(config, tokenizer, engine)),
    }
}
