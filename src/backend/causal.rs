//! Causal Backend
//!
//! Adapter for decoder-only chat models of the Llama-2-chat family. The
//! prompt grammar uses instruction-bracket markers: `[/INST]` closes a user
//! turn and hands the floor to the model, `</s><s>[INST]` closes the model's
//! prior turn and opens a new instruction block.
//!
//! Scoring runs the engine on joint `prompt + target` sequences, so only a
//! suffix of the returned log-probabilities is target-attributable (see
//! [`CausalBackend::score`]).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::chat::{context_window, ChatTurn, Role};
use crate::config::ServiceConfig;
use crate::engine::{DecodingParams, InferenceEngine, LoadSpec, Tokenizer};

use super::traits::{BackendError, LlmBackend};

/// System preamble in the `<<SYS>>` instruction block. Never omitted, even
/// for zero-history requests.
const SYSTEM_PROMPT: &str = "[INST] <<SYS>>\nYou are a helpful, respectful and honest assistant. \
Always answer as helpfully as possible, while being safe. \
Your answers should not include any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. \
Please ensure that your responses are socially unbiased and positive in nature.\n\n\
If a question does not make any sense, or is not factually coherent, explain why instead of answering something not correct. \
If you don't know the answer to a question, please don't share false information.\n<</SYS>>\n\n";

/// Marker appended after a user turn: closes the instruction block.
const USER_MARKER: &str = "[/INST]";
/// Marker appended after a model turn: ends the model's sequence and opens
/// the next instruction block.
const MODEL_MARKER: &str = "</s><s>[INST]";

/// Decoder-only chat backend.
pub struct CausalBackend {
    name: String,
    context_depth: usize,
    max_tokens: usize,
    load_spec: LoadSpec,
    tokenizer: Arc<dyn Tokenizer>,
    engine: Arc<dyn InferenceEngine>,
    ready: OnceCell<()>,
}

impl CausalBackend {
    /// Create a backend from configuration and engine handles.
    ///
    /// Construction is cheap; the engine-side model load happens in
    /// [`LlmBackend::warmup`] or lazily on first use.
    #[must_use]
    pub fn new(
        config: &ServiceConfig,
        tokenizer: Arc<dyn Tokenizer>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            name: config.model_name.clone(),
            context_depth: config.context_depth,
            max_tokens: config.max_tokens,
            load_spec: LoadSpec {
                model_id: config.model_id.clone(),
                tokenizer_id: config.tokenizer_id.clone(),
                intra_threads: config.num_threads_per_process,
                inter_threads: config.num_parallel_processes,
            },
            tokenizer,
            engine,
            ready: OnceCell::new(),
        }
    }

    fn role_marker(role: Role) -> &'static str {
        match role {
            Role::User => USER_MARKER,
            Role::Model => MODEL_MARKER,
        }
    }

    async fn ensure_ready(&self) -> Result<(), BackendError> {
        self.ready
            .get_or_try_init(|| self.engine.load(&self.load_spec))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LlmBackend for CausalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn warmup(&self) -> Result<(), BackendError> {
        self.ensure_ready().await
    }

    fn assemble_prompt(&self, message: &str, history: &[ChatTurn]) -> String {
        let mut prompt = SYSTEM_PROMPT.to_string();
        for turn in context_window(history, self.context_depth) {
            prompt.push_str(&turn.content);
            prompt.push(' ');
            prompt.push_str(Self::role_marker(turn.role));
            prompt.push(' ');
        }
        prompt.push_str(message);
        prompt.push(' ');
        prompt.push_str(USER_MARKER);
        prompt
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<String>, BackendError> {
        self.ensure_ready().await?;
        Ok(self.tokenizer.tokenize(text).await?)
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.ensure_ready().await?;
        let tokens = self.tokenizer.tokenize(prompt).await?;
        let text = self
            .engine
            .generate(&tokens, &DecodingParams::greedy(self.max_tokens))
            .await?;
        Ok(text.trim().to_string())
    }

    async fn score(
        &self,
        prompt: &str,
        targets: &[String],
    ) -> Result<Vec<Vec<f64>>, BackendError> {
        self.ensure_ready().await?;

        let prompt_len = self.tokenizer.tokenize(prompt).await?.len();

        let mut sequences = Vec::with_capacity(targets.len());
        for target in targets {
            sequences
                .push(self.tokenizer.tokenize(&format!("{prompt} {target}</s>")).await?);
        }

        let log_probs = self.engine.score_joint(&sequences).await?;

        // The engine scores the joint sequence; discard the prompt-attributable
        // prefix. The window starts one token before the target boundary so
        // the first target token's probability is still charged.
        let offset = prompt_len.saturating_sub(1);
        Ok(log_probs
            .into_iter()
            .map(|row| row.get(offset..).map(<[f64]>::to_vec).unwrap_or_default())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ModelFamily;
    use crate::engine::stub::StubEngine;

    fn backend_with(stub: Arc<StubEngine>, context_depth: usize) -> CausalBackend {
        let mut config = ServiceConfig::for_family(ModelFamily::Causal);
        config.context_depth = context_depth;
        CausalBackend::new(&config, stub.clone(), stub)
    }

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn::new(role, content)
    }

    #[test]
    fn test_empty_history_prompt_is_exact() {
        let backend = backend_with(Arc::new(StubEngine::default()), 3);
        let prompt = backend.assemble_prompt("how are you?", &[]);
        assert_eq!(prompt, format!("{SYSTEM_PROMPT}how are you? [/INST]"));
    }

    #[test]
    fn test_history_markers_close_turns() {
        let backend = backend_with(Arc::new(StubEngine::default()), 3);
        let history = vec![turn(Role::User, "hi"), turn(Role::Model, "hello")];
        let prompt = backend.assemble_prompt("next", &history);

        assert_eq!(
            prompt,
            format!("{SYSTEM_PROMPT}hi [/INST] hello </s><s>[INST] next [/INST]")
        );
    }

    #[test]
    fn test_prompt_reads_only_context_suffix() {
        let backend = backend_with(Arc::new(StubEngine::default()), 1);
        let history = vec![turn(Role::User, "hi"), turn(Role::Model, "hello")];

        let prompt = backend.assemble_prompt("how are you?", &history);
        assert_eq!(
            prompt,
            format!("{SYSTEM_PROMPT}hello </s><s>[INST] how are you? [/INST]")
        );

        let mut longer = vec![turn(Role::User, "much"), turn(Role::Model, "older")];
        longer.extend(history);
        assert_eq!(prompt, backend.assemble_prompt("how are you?", &longer));
    }

    #[tokio::test]
    async fn test_generate_trims_output() {
        let stub = Arc::new(StubEngine::with_generation("  a reply \n"));
        let backend = backend_with(stub, 3);
        assert_eq!(backend.generate("p").await.unwrap(), "a reply");
    }

    #[tokio::test]
    async fn test_score_discards_prompt_window() {
        // Stub tokenizer splits on whitespace: the prompt below is 2 tokens,
        // so the kept window starts at index 1 and keeps the token *before*
        // the target boundary plus the target itself.
        let stub = Arc::new(StubEngine::with_log_probs(vec![vec![
            -1.0, -2.0, -3.0, -4.0,
        ]]));
        let backend = backend_with(stub.clone(), 3);

        let log_probs = backend
            .score("two tokens", &["tiny target".to_string()])
            .await
            .unwrap();
        assert_eq!(log_probs, vec![vec![-2.0, -3.0, -4.0]]);

        // The scored sequence is the joint prompt + target with the
        // end-of-sequence marker attached.
        let joint = stub.last_joint.lock().unwrap().clone();
        assert_eq!(joint, vec![vec!["two", "tokens", "tiny", "target</s>"]]);
    }

    #[tokio::test]
    async fn test_score_short_row_yields_empty_window() {
        // An engine row shorter than the prompt window reduces to an empty
        // (worst-scoring) sequence rather than panicking.
        let stub = Arc::new(StubEngine::with_log_probs(vec![vec![-1.0]]));
        let backend = backend_with(stub, 3);

        let log_probs = backend
            .score("three token prompt", &["t".to_string()])
            .await
            .unwrap();
        assert_eq!(log_probs, vec![Vec::<f64>::new()]);
    }

    #[tokio::test]
    async fn test_warmup_is_idempotent() {
        let stub = Arc::new(StubEngine::default());
        let backend = backend_with(stub.clone(), 3);

        backend.warmup().await.unwrap();
        backend.warmup().await.unwrap();
        backend.generate("p").await.unwrap();

        assert_eq!(stub.load_calls.load(Ordering::SeqCst), 1);
    }
}
