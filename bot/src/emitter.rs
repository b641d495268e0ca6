use rand::Rng;
use serde::Deserialize;
use starfall_engine::session::{EmitError, ThrowEmitter};
use starfall_types::{ConversationId, DIE_FACES};
use tracing::debug;

/// Emitter backed by the chat transport: the transport animates the die in
/// the conversation and reports the value it landed on.
#[derive(Clone)]
pub struct TransportEmitter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct EmittedDie {
    value: u8,
}

impl TransportEmitter {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ThrowEmitter for TransportEmitter {
    async fn emit(&self, conversation: ConversationId) -> Result<u8, EmitError> {
        let url = format!("{}/conversations/{}/dice", self.base_url, conversation);
        let die: EmittedDie = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|err| EmitError(err.to_string()))?
            .error_for_status()
            .map_err(|err| EmitError(err.to_string()))?
            .json()
            .await
            .map_err(|err| EmitError(err.to_string()))?;
        if die.value == 0 || die.value > DIE_FACES {
            return Err(EmitError(format!("transport returned value {}", die.value)));
        }
        Ok(die.value)
    }
}

/// Local die roller for running without a transport (dev/testing only).
#[derive(Clone, Default)]
pub struct DevEmitter;

impl ThrowEmitter for DevEmitter {
    async fn emit(&self, conversation: ConversationId) -> Result<u8, EmitError> {
        let value = rand::thread_rng().gen_range(1..=DIE_FACES);
        debug!(conversation, value, "dev die rolled locally");
        Ok(value)
    }
}

/// Emitter selected at construction from the configuration.
#[derive(Clone)]
pub enum Emitter {
    Transport(TransportEmitter),
    Dev(DevEmitter),
}

impl ThrowEmitter for Emitter {
    async fn emit(&self, conversation: ConversationId) -> Result<u8, EmitError> {
        match self {
            Self::Transport(emitter) => emitter.emit(conversation).await,
            Self::Dev(emitter) => emitter.emit(conversation).await,
        }
    }
}
