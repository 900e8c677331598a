//! Service Configuration
//!
//! Environment-driven configuration for one switchboard process. One process
//! serves exactly one model family; running a second family means running a
//! second process with its own configuration.
//!
//! All values are read once at startup and are immutable afterwards; no
//! worker mutates configuration.

use std::path::PathBuf;

/// Which adapter family this process serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    /// Encoder-decoder chat models (FastChat/T5 style).
    SeqToSeq,
    /// Decoder-only chat models (Llama-2-chat style).
    Causal,
}

impl ModelFamily {
    /// Parse the `SWITCHBOARD_MODEL_FAMILY` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "seq2seq" => Some(Self::SeqToSeq),
            "causal" => Some(Self::Causal),
            _ => None,
        }
    }

    /// Service name used as the queue-name prefix.
    #[must_use]
    pub fn default_service_name(self) -> &'static str {
        match self {
            Self::SeqToSeq => "seq2seq",
            Self::Causal => "causal",
        }
    }

    /// Default engine model identifier for this family.
    #[must_use]
    pub fn default_model_id(self) -> &'static str {
        match self {
            Self::SeqToSeq => "google/flan-t5-xl",
            Self::Causal => "meta-llama/Llama-2-7b-chat-hf",
        }
    }

    /// Default tokenizer identifier for this family.
    #[must_use]
    pub fn default_tokenizer_id(self) -> &'static str {
        // Both families ship the tokenizer alongside the model.
        self.default_model_id()
    }
}

/// Configuration for one switchboard process.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Adapter family to construct.
    pub model_family: ModelFamily,
    /// Service name; queue names derive from it.
    pub model_name: String,
    /// Engine model identifier.
    pub model_id: String,
    /// Engine tokenizer identifier.
    pub tokenizer_id: String,
    /// Most-recent turns included when assembling a prompt.
    pub context_depth: usize,
    /// Maximum tokens decoded per generation call.
    pub max_tokens: usize,
    /// Independent workers on the ask queue; also the engine's
    /// inter-call parallelism hint.
    pub num_parallel_processes: usize,
    /// Threads the engine may use inside one batched call.
    pub num_threads_per_process: usize,
    /// Base URL of the inference engine sidecar.
    pub engine_url: String,
    /// Unix socket path for the bus bridge.
    pub socket_path: PathBuf,
    /// Whether to load the model eagerly at startup.
    pub warmup_on_start: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::for_family(ModelFamily::SeqToSeq)
    }
}

impl ServiceConfig {
    /// Defaults for `family`.
    #[must_use]
    pub fn for_family(family: ModelFamily) -> Self {
        Self {
            model_family: family,
            model_name: family.default_service_name().to_string(),
            model_id: family.default_model_id().to_string(),
            tokenizer_id: family.default_tokenizer_id().to_string(),
            context_depth: 3,
            max_tokens: 256,
            num_parallel_processes: 2,
            num_threads_per_process: 4,
            engine_url: "http://127.0.0.1:9920".to_string(),
            socket_path: default_socket_path(),
            warmup_on_start: true,
        }
    }

    /// Create configuration from `SWITCHBOARD_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let family = std::env::var("SWITCHBOARD_MODEL_FAMILY")
            .ok()
            .and_then(|v| ModelFamily::parse(&v))
            .unwrap_or(ModelFamily::SeqToSeq);

        let defaults = Self::for_family(family);

        Self {
            model_family: family,
            model_name: env_string("SWITCHBOARD_MODEL_NAME", defaults.model_name),
            model_id: env_string("SWITCHBOARD_MODEL_ID", defaults.model_id),
            tokenizer_id: env_string("SWITCHBOARD_TOKENIZER_ID", defaults.tokenizer_id),
            context_depth: env_parse("SWITCHBOARD_CONTEXT_DEPTH", defaults.context_depth),
            max_tokens: env_parse("SWITCHBOARD_MAX_TOKENS", defaults.max_tokens),
            num_parallel_processes: env_parse(
                "SWITCHBOARD_NUM_PARALLEL_PROCESSES",
                defaults.num_parallel_processes,
            ),
            num_threads_per_process: env_parse(
                "SWITCHBOARD_NUM_THREADS_PER_PROCESS",
                defaults.num_threads_per_process,
            ),
            engine_url: env_string("SWITCHBOARD_ENGINE_URL", defaults.engine_url),
            socket_path: std::env::var("SWITCHBOARD_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(defaults.socket_path),
            warmup_on_start: std::env::var("SWITCHBOARD_SKIP_WARMUP")
                .map(|v| v != "1" && v.to_lowercase() != "true")
                .unwrap_or(true),
        }
    }

    /// Queue carrying ask requests.
    #[must_use]
    pub fn queue_ask(&self) -> String {
        format!("{}_input", self.model_name)
    }

    /// Queue carrying score requests.
    #[must_use]
    pub fn queue_score(&self) -> String {
        format!("{}_score_input", self.model_name)
    }

    /// Queue carrying discussion requests.
    #[must_use]
    pub fn queue_opinion(&self) -> String {
        format!("{}_discussion_input", self.model_name)
    }
}

/// Default Unix socket path for the bus bridge.
///
/// Uses `XDG_RUNTIME_DIR` if available, otherwise `/tmp/llm-switchboard-$UID/`.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("llm-switchboard")
            .join("switchboard.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/llm-switchboard-{uid}/switchboard.sock"))
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parse() {
        assert_eq!(ModelFamily::parse("seq2seq"), Some(ModelFamily::SeqToSeq));
        assert_eq!(ModelFamily::parse("CAUSAL"), Some(ModelFamily::Causal));
        assert_eq!(ModelFamily::parse("gpt"), None);
    }

    #[test]
    fn test_queue_names_derive_from_model_name() {
        let mut config = ServiceConfig::for_family(ModelFamily::Causal);
        config.model_name = "causal".to_string();

        assert_eq!(config.queue_ask(), "causal_input");
        assert_eq!(config.queue_score(), "causal_score_input");
        assert_eq!(config.queue_opinion(), "causal_discussion_input");
    }

    #[test]
    fn test_family_defaults() {
        let config = ServiceConfig::for_family(ModelFamily::SeqToSeq);
        assert_eq!(config.model_id, "google/flan-t5-xl");
        assert!(config.warmup_on_start);
        assert_eq!(config.num_parallel_processes, 2);
    }
}
