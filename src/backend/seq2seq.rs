//! Sequence-to-Sequence Backend
//!
//! Adapter for encoder-decoder chat models of the FastChat/T5 family. The
//! prompt grammar uses plain `Human`/`Assistant` role markers; scoring runs
//! the engine in paired source/target mode, where the entire returned
//! log-probability sequence is attributable to the target.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::chat::{context_window, ChatTurn, Role};
use crate::config::ServiceConfig;
use crate::engine::{DecodingParams, InferenceEngine, LoadSpec, Tokenizer};

use super::traits::{BackendError, LlmBackend};

/// System preamble, seeded with one worked example exchange to bias style.
/// Never omitted, even for zero-history requests.
const SYSTEM_PROMPT: &str = "A chat between a curious human and an artificial intelligence assistant. \
The assistant gives helpful, detailed, and polite answers to the human's questions.\n\
### Human: What are the key differences between renewable and non-renewable energy sources?\n\
### Assistant: Renewable energy sources are those that can be \
replenished naturally in a relatively short amount of time, such as solar, wind, hydro, \
geothermal, and biomass. Non-renewable energy sources, on the other hand, \
are finite and will eventually be depleted, such as coal, oil, and natural gas.\n";

/// Encoder-decoder chat backend.
pub struct SeqToSeqBackend {
    name: String,
    context_depth: usize,
    max_tokens: usize,
    load_spec: LoadSpec,
    tokenizer: Arc<dyn Tokenizer>,
    engine: Arc<dyn InferenceEngine>,
    ready: OnceCell<()>,
}

impl SeqToSeqBackend {
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
            Role::User => "Human",
            Role::Model => "Assistant",
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
impl LlmBackend for SeqToSeqBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn warmup(&self) -> Result<(), BackendError> {
        self.ensure_ready().await
    }

    fn assemble_prompt(&self, message: &str, history: &[ChatTurn]) -> String {
        let mut prompt = SYSTEM_PROMPT.to_string();
        for turn in context_window(history, self.context_depth) {
            prompt.push_str("### ");
            prompt.push_str(Self::role_marker(turn.role));
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push_str("### Human: ");
        prompt.push_str(message);
        prompt.push_str("\n### Assistant:");
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
        // Engine output is passed through verbatim aside from special-token
        // handling on the engine side.
        Ok(text)
    }

    async fn score(
        &self,
        prompt: &str,
        targets: &[String],
    ) -> Result<Vec<Vec<f64>>, BackendError> {
        self.ensure_ready().await?;

        let prompt_tokens = self.tokenizer.tokenize(prompt).await?;
        let sources = vec![prompt_tokens; targets.len()];

        let mut target_tokens = Vec::with_capacity(targets.len());
        for target in targets {
            target_tokens.push(self.tokenizer.tokenize(target).await?);
        }

        // The whole returned sequence is target-attributable for this
        // family; no window offset applies.
        Ok(self.engine.score_paired(&sources, &target_tokens).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ModelFamily;
    use crate::engine::stub::StubEngine;

    fn backend_with(stub: Arc<StubEngine>, context_depth: usize) -> SeqToSeqBackend {
        let mut config = ServiceConfig::for_family(ModelFamily::SeqToSeq);
        config.context_depth = context_depth;
        SeqToSeqBackend::new(&config, stub.clone(), stub)
    }

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn::new(role, content)
    }

    #[test]
    fn test_empty_history_prompt_is_exact() {
        let backend = backend_with(Arc::new(StubEngine::default()), 3);
        let prompt = backend.assemble_prompt("how are you?", &[]);
        assert_eq!(
            prompt,
            format!("{SYSTEM_PROMPT}### Human: how are you?\n### Assistant:")
        );
    }

    #[test]
    fn test_history_renders_role_markers() {
        let backend = backend_with(Arc::new(StubEngine::default()), 3);
        let history = vec![turn(Role::User, "hi"), turn(Role::Model, "hello")];
        let prompt = backend.assemble_prompt("next", &history);

        assert!(prompt.contains("### Human: hi\n"));
        assert!(prompt.contains("### Assistant: hello\n"));
        assert!(prompt.ends_with("### Human: next\n### Assistant:"));
    }

    #[test]
    fn test_prompt_reads_only_context_suffix() {
        let backend = backend_with(Arc::new(StubEngine::default()), 1);
        let history = vec![turn(Role::User, "hi"), turn(Role::Model, "hello")];

        let prompt = backend.assemble_prompt("how are you?", &history);
        assert!(prompt.contains("### Assistant: hello\n"));
        assert!(!prompt.contains("hi\n"));

        // Prepending arbitrary older turns must not change the output.
        let mut longer = vec![turn(Role::User, "much"), turn(Role::Model, "older")];
        longer.extend(history);
        assert_eq!(prompt, backend.assemble_prompt("how are you?", &longer));
    }

    #[tokio::test]
    async fn test_generate_passes_output_through_verbatim() {
        let stub = Arc::new(StubEngine::with_generation("  padded reply \n"));
        let backend = backend_with(stub.clone(), 3);

        let text = backend.generate("prompt text").await.unwrap();
        assert_eq!(text, "  padded reply \n");

        // The engine sees the tokenized prompt and fixed greedy parameters.
        assert_eq!(
            stub.last_prompt.lock().unwrap().clone(),
            vec!["prompt".to_string(), "text".to_string()]
        );
        let params = stub.last_params.lock().unwrap().clone().unwrap();
        assert_eq!(params.beam_size, 1);
        assert!(!params.include_prompt);
    }

    #[tokio::test]
    async fn test_score_batches_one_source_per_target() {
        let stub = Arc::new(StubEngine::with_log_probs(vec![
            vec![-0.1],
            vec![-0.2],
        ]));
        let backend = backend_with(stub.clone(), 3);

        let targets = vec!["yes".to_string(), "no".to_string()];
        let log_probs = backend.score("the prompt", &targets).await.unwrap();
        assert_eq!(log_probs, vec![vec![-0.1], vec![-0.2]]);

        let (sources, scored_targets) = stub.last_paired.lock().unwrap().clone();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], sources[1]);
        assert_eq!(scored_targets, vec![vec!["yes"], vec!["no"]]);
    }

    #[tokio::test]
    async fn test_rank_answers_empty_makes_no_engine_call() {
        let stub = Arc::new(StubEngine::default());
        let backend = backend_with(stub.clone(), 3);

        let ranked = backend.rank_answers("q", &[]).await.unwrap();
        assert!(ranked.is_empty());
        assert_eq!(stub.score_calls.load(Ordering::SeqCst), 0);
        assert_eq!(stub.generate_calls.load(Ordering::SeqCst), 0);
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
