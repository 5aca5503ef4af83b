//! The LLM Oracle Adapter (§4.7).
//!
//! A prompt-shaped text oracle. This crate does not integrate with any
//! specific provider (that's explicitly out of scope, §1) — it defines
//! the trait the engine calls through, following the same
//! `#[async_trait] pub trait ... : Send + Sync` shape used for this
//! crate's other collaborator traits, and ships a deterministic mock
//! implementation used by this crate's own tests.

use async_trait::async_trait;

/// One turn of prior conversation handed to the oracle as context.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Generation options for a single oracle call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// When set, the caller expects a bare JSON object back (used for the
    /// rating prompt) rather than conversational prose.
    pub expects_json_object: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            max_tokens: 250,
            temperature: 0.7,
            expects_json_object: false,
        }
    }
}

/// Contract: `generate(persona, history, user_input, options) -> reply`.
///
/// Implementations never propagate a transport error as an `Err` from
/// this trait — per §4.7, failures are encoded *into* the reply text
/// (e.g. `"(<agent> connection timed out)"`), so the engine can always
/// treat the return value as "the next thing to say", degrading
/// gracefully when the backing service is unhappy.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(
        &self,
        persona: &str,
        history: &[HistoryTurn],
        user_input: &str,
        options: &GenerateOptions,
    ) -> String;
}

/// `true` for any reply the engine should treat as a degraded/error
/// response rather than chatworthy dialogue or a parseable rating —
/// every error reply the oracle produces starts with `(`.
pub fn is_error_reply(reply: &str) -> bool {
    reply.trim_start().starts_with('(')
}

/// A scripted oracle for tests and for embedders without a provider
/// wired up yet. Returns a fixed reply, ignoring its inputs beyond
/// recording the last call for assertions.
pub struct MockOracle {
    pub reply: String,
}

impl MockOracle {
    pub fn new(reply: impl Into<String>) -> Self {
        MockOracle { reply: reply.into() }
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn generate(
        &self,
        _persona: &str,
        _history: &[HistoryTurn],
        _user_input: &str,
        _options: &GenerateOptions,
    ) -> String {
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_replies_are_recognized_by_leading_paren() {
        assert!(is_error_reply("(LLM Client Error: timeout)"));
        assert!(is_error_reply("  (padded)"));
        assert!(!is_error_reply("Sure, I can help with that."));
    }

    #[tokio::test]
    async fn mock_oracle_returns_fixed_reply() {
        let oracle = MockOracle::new("hello from the mock");
        let reply = oracle
            .generate("persona", &[], "hi", &GenerateOptions::default())
            .await;
        assert_eq!(reply, "hello from the mock");
    }
}
