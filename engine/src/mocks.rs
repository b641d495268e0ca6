//! Test doubles shared across the workspace (enabled with the `mocks`
//! feature, the way the execution tests consume them as a dev-dependency).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use starfall_types::ConversationId;
use tokio::time::sleep;

use crate::session::{EmitError, ThrowEmitter};

/// Emitter that replays a fixed script of die values and failures.
pub struct ScriptedEmitter {
    script: Mutex<VecDeque<Result<u8, EmitError>>>,
    delay: Option<Duration>,
}

impl ScriptedEmitter {
    pub fn new(script: impl IntoIterator<Item = Result<u8, EmitError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: None,
        }
    }

    /// Script where every die lands with the given values.
    pub fn landing(values: impl IntoIterator<Item = u8>) -> Self {
        Self::new(values.into_iter().map(Ok))
    }

    /// Script where every emission fails.
    pub fn failing(count: usize) -> Self {
        Self::new((0..count).map(|_| Err(EmitError("scripted failure".into()))))
    }

    /// Add a per-emission delay, useful for holding a session open while a
    /// test probes the busy guard.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl ThrowEmitter for ScriptedEmitter {
    async fn emit(&self, _conversation: ConversationId) -> Result<u8, EmitError> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(EmitError("script exhausted".into())))
    }
}
