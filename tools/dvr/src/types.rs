use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Record,
    Replay,
    Passthrough,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "record" => Some(Self::Record),
            "replay" => Some(Self::Replay),
            "passthrough" => Some(Self::Passthrough),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Replay => "replay",
            Self::Passthrough => "passthrough",
        }
    }
}

/// Explicit mode requests. More than one may be set; `config::resolve_mode`
/// decides which wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeFlags {
    pub record: bool,
    pub replay: bool,
    pub passthrough: bool,
}

impl ModeFlags {
    pub fn request(&mut self, mode: Mode) {
        match mode {
            Mode::Record => self.record = true,
            Mode::Replay => self.replay = true,
            Mode::Passthrough => self.passthrough = true,
        }
    }
}
