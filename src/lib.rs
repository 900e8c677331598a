//! LLM Switchboard - Message-Driven Inference Front End
//!
//! This crate puts independent chat LLM backends behind a uniform,
//! queue-driven contract. Callers publish three request kinds - free-form
//! chat ("ask"), answer ranking ("score"), and opinion synthesis
//! ("discussion") - and the switchboard routes each to the right backend
//! operation, publishing the reply to the queue the request named.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        Producers                             |
//! |   ask / score / discussion requests, each carrying its own   |
//! |   message_id (correlation) and routing_key (reply queue)     |
//! +------------------------------+-------------------------------+
//!                                |
//!                        MessageBus (queues)
//!                                |
//! +------------------------------+-------------------------------+
//! |                        Dispatcher                            |
//! |   N ask workers        1 score worker      1 discussion      |
//! |        \                     |                  /            |
//! |         +--------- Arc<dyn LlmBackend> --------+             |
//! |                   (seq2seq | causal)                         |
//! +------------------------------+-------------------------------+
//!                                |
//!                 Tokenizer + InferenceEngine seams
//!                    (batched sidecar, external)
//! +--------------------------------------------------------------+
//! ```
//!
//! # Key Types
//!
//! - [`LlmBackend`]: the contract every model adapter satisfies
//! - [`SeqToSeqBackend`] / [`CausalBackend`]: the two adapter families
//! - [`Dispatcher`]: consumer-pool router mapping queues to operations
//! - [`MessageBus`] / [`InProcessBus`]: queue fabric seam and its embedded
//!   implementation
//! - [`ServiceConfig`]: per-process configuration, one model per process
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use llm_switchboard::{backend, Dispatcher, HttpEngine, InProcessBus, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::from_env();
//!     let engine = Arc::new(HttpEngine::new(&config.engine_url)?);
//!     let backend = backend::for_family(&config, engine.clone(), engine);
//!
//!     backend.warmup().await?;
//!
//!     let bus = Arc::new(InProcessBus::new());
//!     let workers = Dispatcher::new(backend, bus, config).start().await?;
//!     for worker in workers {
//!         worker.await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # No Engine Dependencies
//!
//! The crate never links model weights or inference kernels. Backends drive
//! the engine through the [`Tokenizer`] and [`InferenceEngine`] traits; the
//! bundled [`HttpEngine`] talks to a local batched sidecar over JSON.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod chat;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod messages;
pub mod scoring;
pub mod transport;

// Re-exports for convenience
pub use backend::{BackendError, CausalBackend, LlmBackend, SeqToSeqBackend};
pub use chat::{ChatTurn, InvalidRoleError, Role};
pub use config::{ModelFamily, ServiceConfig};
pub use dispatcher::Dispatcher;
pub use engine::{DecodingParams, EngineError, HttpEngine, InferenceEngine, LoadSpec, Tokenizer};
pub use messages::{
    AskRequest, AskResponse, OpinionRequest, OpinionResponse, OptionMap, ScoreRequest,
    ScoreResponse,
};
pub use scoring::{perplexity, rank_ascending};
pub use transport::{BusConsumer, BusError, Delivery, InProcessBus, MessageBus, TransportError};
