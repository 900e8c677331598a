//! Inference Engine Seam
//!
//! The neural generation/scoring engine and the tokenizer are external
//! collaborators. This module defines the narrow trait seams the backends
//! drive them through, plus an HTTP client implementation for a local
//! batched inference sidecar.

mod http;
mod traits;

pub use http::HttpEngine;
pub use traits::{DecodingParams, EngineError, InferenceEngine, LoadSpec, Tokenizer};

#[cfg(test)]
pub(crate) use traits::stub;
