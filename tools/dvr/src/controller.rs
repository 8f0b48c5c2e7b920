//! One-shot mode resolution and store lifecycle.
//!
//! `ModeController::initialize` moves the controller from uninitialized to
//! record, replay or passthrough exactly once. The outcome, failures included,
//! is cached so later callers never reopen the fixture.

use crate::config::{resolve_mode, DvrConfig};
use crate::errors::DvrError;
use crate::logging::{emit, JsonlLogger};
use crate::runtime::unix_ms;
use crate::store::Store;
use crate::types::Mode;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};

pub enum ActiveMode {
    Record(Arc<Store>),
    Replay(Arc<Store>),
    Passthrough,
}

impl ActiveMode {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Record(_) => Mode::Record,
            Self::Replay(_) => Mode::Replay,
            Self::Passthrough => Mode::Passthrough,
        }
    }

    pub fn store(&self) -> Option<&Arc<Store>> {
        match self {
            Self::Record(store) | Self::Replay(store) => Some(store),
            Self::Passthrough => None,
        }
    }
}

type Resolved = Result<Arc<ActiveMode>, DvrError>;

pub struct ModeController {
    config: DvrConfig,
    logger: Option<JsonlLogger>,
    state: Mutex<Option<Resolved>>,
}

impl ModeController {
    pub fn new(config: DvrConfig) -> Self {
        let logger = config.log_path.as_ref().map(JsonlLogger::new);
        Self {
            config,
            logger,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DvrConfig {
        &self.config
    }

    pub fn logger(&self) -> Option<&JsonlLogger> {
        self.logger.as_ref()
    }

    pub fn reference_unix_ms(&self) -> u64 {
        unix_ms(self.config.reference_time)
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Resolves the mode and prepares the store on first call; every later
    /// call returns the cached outcome. Concurrent first callers block until
    /// the single setup finishes.
    ///
    /// Setup failures come back as `DvrError::Setup`.
    pub fn initialize(&self) -> Resolved {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolved) = state.as_ref() {
            return resolved.clone();
        }
        let resolved = self.setup().map(Arc::new);
        *state = Some(resolved.clone());
        resolved
    }

    pub fn mode(&self) -> Result<Mode, DvrError> {
        self.initialize().map(|active| active.mode())
    }

    /// Flushes and closes a record-mode fixture. No-op in other modes or
    /// before initialization.
    pub fn finish(&self) -> Result<(), DvrError> {
        let active = match self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(Ok(active)) => Arc::clone(active),
            _ => return Ok(()),
        };
        match active.as_ref() {
            ActiveMode::Record(store) => {
                let result = store.close();
                emit(
                    self.logger(),
                    if result.is_ok() { "info" } else { "error" },
                    "dvr.finish",
                    || json!({ "recorded": store.len() }),
                );
                result
            }
            _ => Ok(()),
        }
    }

    fn setup(&self) -> Result<ActiveMode, DvrError> {
        let mode = resolve_mode(&self.config);
        let path = &self.config.fixture_path;
        let active = match mode {
            Mode::Record => Store::create(path).map(|store| ActiveMode::Record(Arc::new(store))),
            Mode::Replay => Store::load(path).map(|store| ActiveMode::Replay(Arc::new(store))),
            Mode::Passthrough => Ok(ActiveMode::Passthrough),
        };
        match active {
            Ok(active) => {
                emit(
                    self.logger(),
                    "info",
                    "dvr.setup",
                    || json!({
                        "mode": mode.as_str(),
                        "fixture": path.display().to_string(),
                        "records": active.store().map(|s| s.len()).unwrap_or(0),
                    }),
                );
                Ok(active)
            }
            Err(err) => {
                emit(
                    self.logger(),
                    "error",
                    "dvr.setup",
                    || json!({
                        "mode": mode.as_str(),
                        "fixture": path.display().to_string(),
                        "error": err.to_string(),
                    }),
                );
                Err(DvrError::Setup(Box::new(err)))
            }
        }
    }
}
