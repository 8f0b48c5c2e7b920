use crate::errors::DvrError;
use crate::runtime::{Clock, FileSystem};
use crate::types::{Mode, ModeFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type EnvMap = BTreeMap<String, String>;

pub const DEFAULT_FIXTURE_PATH: &str = "testdata/archive.dvr";
pub const ENV_MODE: &str = "DVR_MODE";
pub const ENV_FILE: &str = "DVR_FILE";
pub const ENV_DEFAULT_REPLAY: &str = "DVR_DEFAULT_REPLAY";
pub const ENV_LOG: &str = "DVR_LOG";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub fixture_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub record: bool,
    pub replay: bool,
    pub passthrough: bool,
    pub default_replay: bool,
}

/// Everything the mode controller needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvrConfig {
    pub flags: ModeFlags,
    pub default_replay: bool,
    pub fixture_path: PathBuf,
    /// Stamped on every interaction recorded in this run.
    pub reference_time: SystemTime,
    pub log_path: Option<PathBuf>,
}

impl Default for DvrConfig {
    fn default() -> Self {
        Self {
            flags: ModeFlags::default(),
            default_replay: false,
            fixture_path: PathBuf::from(DEFAULT_FIXTURE_PATH),
            reference_time: UNIX_EPOCH,
            log_path: None,
        }
    }
}

impl DvrConfig {
    pub fn replay(fixture_path: impl Into<PathBuf>) -> Self {
        Self::with_mode(Mode::Replay, fixture_path)
    }

    pub fn record(fixture_path: impl Into<PathBuf>) -> Self {
        Self::with_mode(Mode::Record, fixture_path)
    }

    pub fn passthrough() -> Self {
        let mut cfg = Self::default();
        cfg.flags.request(Mode::Passthrough);
        cfg
    }

    fn with_mode(mode: Mode, fixture_path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self {
            fixture_path: fixture_path.into(),
            ..Self::default()
        };
        cfg.flags.request(mode);
        cfg
    }
}

/// Picks the operating mode. Explicit replay beats record, record beats
/// passthrough, then the default-replay toggle; otherwise traffic passes
/// through.
pub fn resolve_mode(cfg: &DvrConfig) -> Mode {
    if cfg.flags.replay {
        Mode::Replay
    } else if cfg.flags.record {
        Mode::Record
    } else if cfg.flags.passthrough {
        Mode::Passthrough
    } else if cfg.default_replay {
        Mode::Replay
    } else {
        Mode::Passthrough
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDvrConfig {
    mode: Option<PartialModeConfig>,
    fixture: Option<PartialFixtureConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialModeConfig {
    record: Option<bool>,
    replay: Option<bool>,
    passthrough: Option<bool>,
    default_replay: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialFixtureConfig {
    path: Option<PathBuf>,
    reference_unix_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
}

/// Layers defaults, the optional TOML file, environment and CLI overrides, in
/// that order.
pub fn load_config(
    overrides: &CliOverrides,
    env: &EnvMap,
    fs: &dyn FileSystem,
    clock: &dyn Clock,
) -> Result<DvrConfig, DvrError> {
    let mut cfg = DvrConfig {
        reference_time: clock.now(),
        ..DvrConfig::default()
    };

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialDvrConfig = toml::from_str(&file_contents)
            .map_err(|e| DvrError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_env(&mut cfg, env)?;
    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut DvrConfig, partial: PartialDvrConfig) {
    if let Some(mode) = partial.mode {
        if let Some(value) = mode.record {
            cfg.flags.record = value;
        }
        if let Some(value) = mode.replay {
            cfg.flags.replay = value;
        }
        if let Some(value) = mode.passthrough {
            cfg.flags.passthrough = value;
        }
        if let Some(value) = mode.default_replay {
            cfg.default_replay = value;
        }
    }

    if let Some(fixture) = partial.fixture {
        if let Some(path) = fixture.path {
            cfg.fixture_path = path;
        }
        if let Some(ms) = fixture.reference_unix_ms {
            cfg.reference_time = UNIX_EPOCH + Duration::from_millis(ms);
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.log_path = Some(path);
        }
    }
}

fn apply_env(cfg: &mut DvrConfig, env: &EnvMap) -> Result<(), DvrError> {
    if let Some(value) = non_empty(env, ENV_MODE) {
        let mode = Mode::parse(value).ok_or_else(|| {
            DvrError::InvalidConfig(format!(
                "{ENV_MODE} must be record, replay or passthrough, got `{value}`"
            ))
        })?;
        cfg.flags.request(mode);
    }
    if let Some(value) = non_empty(env, ENV_FILE) {
        cfg.fixture_path = PathBuf::from(value);
    }
    if let Some(value) = non_empty(env, ENV_DEFAULT_REPLAY) {
        cfg.default_replay = parse_bool(value).ok_or_else(|| {
            DvrError::InvalidConfig(format!("{ENV_DEFAULT_REPLAY} must be a boolean, got `{value}`"))
        })?;
    }
    if let Some(value) = non_empty(env, ENV_LOG) {
        cfg.log_path = Some(PathBuf::from(value));
    }
    Ok(())
}

fn apply_cli_overrides(cfg: &mut DvrConfig, overrides: &CliOverrides) {
    if overrides.record {
        cfg.flags.record = true;
    }
    if overrides.replay {
        cfg.flags.replay = true;
    }
    if overrides.passthrough {
        cfg.flags.passthrough = true;
    }
    if overrides.default_replay {
        cfg.default_replay = true;
    }
    if let Some(path) = &overrides.fixture_path {
        cfg.fixture_path = path.clone();
    }
    if let Some(path) = &overrides.log_path {
        cfg.log_path = Some(path.clone());
    }
}

pub fn validate_config(cfg: &DvrConfig) -> Result<(), DvrError> {
    if cfg.fixture_path.as_os_str().is_empty() {
        return Err(DvrError::InvalidConfig(
            "fixture path must not be empty".to_string(),
        ));
    }
    if cfg.log_path.as_deref() == Some(Path::new("")) {
        return Err(DvrError::InvalidConfig(
            "log path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn non_empty<'a>(env: &'a EnvMap, key: &str) -> Option<&'a str> {
    env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        load_config, resolve_mode, validate_config, CliOverrides, DvrConfig, EnvMap,
        DEFAULT_FIXTURE_PATH,
    };
    use crate::errors::DvrError;
    use crate::runtime::{FakeClock, FakeFileSystem};
    use crate::types::{Mode, ModeFlags};
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn cfg_with(flags: ModeFlags, default_replay: bool) -> DvrConfig {
        DvrConfig {
            flags,
            default_replay,
            ..DvrConfig::default()
        }
    }

    #[test]
    fn resolve_mode_follows_priority() {
        let all = ModeFlags {
            record: true,
            replay: true,
            passthrough: true,
        };
        assert_eq!(resolve_mode(&cfg_with(all, false)), Mode::Replay);

        let record_and_pass = ModeFlags {
            record: true,
            replay: false,
            passthrough: true,
        };
        assert_eq!(resolve_mode(&cfg_with(record_and_pass, true)), Mode::Record);

        let pass = ModeFlags {
            passthrough: true,
            ..ModeFlags::default()
        };
        assert_eq!(resolve_mode(&cfg_with(pass, true)), Mode::Passthrough);

        assert_eq!(resolve_mode(&cfg_with(ModeFlags::default(), true)), Mode::Replay);
        assert_eq!(
            resolve_mode(&cfg_with(ModeFlags::default(), false)),
            Mode::Passthrough
        );
    }

    #[test]
    fn defaults_use_clock_and_standard_fixture_path() {
        let clock = FakeClock::new(UNIX_EPOCH + Duration::from_secs(5));
        let cfg = load_config(
            &CliOverrides::default(),
            &EnvMap::new(),
            &FakeFileSystem::default(),
            &clock,
        )
        .expect("config");
        assert_eq!(cfg.fixture_path, PathBuf::from(DEFAULT_FIXTURE_PATH));
        assert_eq!(cfg.reference_time, UNIX_EPOCH + Duration::from_secs(5));
        assert_eq!(resolve_mode(&cfg), Mode::Passthrough);
    }

    #[test]
    fn file_then_env_then_cli_layering() {
        let fs = FakeFileSystem::with_file(
            "/dvr.toml",
            r#"
[mode]
record = true
default_replay = true

[fixture]
path = "from-file.dvr"
reference_unix_ms = 1234

[logging]
path = "events.jsonl"
"#,
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/dvr.toml")),
            ..CliOverrides::default()
        };
        let mut env = EnvMap::new();
        env.insert("DVR_FILE".to_string(), "from-env.dvr".to_string());

        let cfg = load_config(&overrides, &env, &fs, &FakeClock::default()).expect("config");
        assert!(cfg.flags.record);
        assert!(cfg.default_replay);
        assert_eq!(cfg.fixture_path, PathBuf::from("from-env.dvr"));
        assert_eq!(cfg.reference_time, UNIX_EPOCH + Duration::from_millis(1234));
        assert_eq!(cfg.log_path, Some(PathBuf::from("events.jsonl")));
        assert_eq!(resolve_mode(&cfg), Mode::Record);

        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/dvr.toml")),
            fixture_path: Some(PathBuf::from("from-cli.dvr")),
            replay: true,
            ..CliOverrides::default()
        };
        let cfg = load_config(&overrides, &env, &fs, &FakeClock::default()).expect("config");
        assert_eq!(cfg.fixture_path, PathBuf::from("from-cli.dvr"));
        assert_eq!(resolve_mode(&cfg), Mode::Replay);
    }

    #[test]
    fn env_mode_requests_a_mode() {
        let mut env = EnvMap::new();
        env.insert("DVR_MODE".to_string(), "replay".to_string());
        env.insert("DVR_DEFAULT_REPLAY".to_string(), "false".to_string());
        let cfg = load_config(
            &CliOverrides::default(),
            &env,
            &FakeFileSystem::default(),
            &FakeClock::default(),
        )
        .expect("config");
        assert!(cfg.flags.replay);
        assert!(!cfg.default_replay);
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut env = EnvMap::new();
        env.insert("DVR_MODE".to_string(), "sometimes".to_string());
        let err = load_config(
            &CliOverrides::default(),
            &env,
            &FakeFileSystem::default(),
            &FakeClock::default(),
        )
        .expect_err("bad mode");
        assert!(matches!(err, DvrError::InvalidConfig(_)));

        let mut env = EnvMap::new();
        env.insert("DVR_DEFAULT_REPLAY".to_string(), "maybe".to_string());
        assert!(load_config(
            &CliOverrides::default(),
            &env,
            &FakeFileSystem::default(),
            &FakeClock::default(),
        )
        .is_err());
    }

    #[test]
    fn unknown_toml_keys_are_parse_errors() {
        let fs = FakeFileSystem::with_file("/dvr.toml", "[mode]\nrecrod = true\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/dvr.toml")),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, &EnvMap::new(), &fs, &FakeClock::default())
            .expect_err("typo");
        assert!(matches!(err, DvrError::ConfigParse(_)));
    }

    #[test]
    fn empty_fixture_path_is_invalid() {
        let cfg = DvrConfig {
            fixture_path: PathBuf::new(),
            ..DvrConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }
}
