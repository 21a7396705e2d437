//! Configuration file discovery and parsing.
//!
//! The config is a small YAML document, with JSON accepted as a fallback:
//!
//! ```yaml
//! command: /usr/lib/foo/native-host
//! proxy: socks5://127.0.0.1:1080
//! log: stderr
//! ```
//!
//! Looked up at `$NMPROXY_CONFIG`, else `<user config dir>/nmproxy.cfg`, else
//! `/etc/nmproxy.cfg`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

/// Environment variable overriding the config location.
pub const CONFIG_ENV: &str = "NMPROXY_CONFIG";

const CONFIG_FILE_NAME: &str = "nmproxy.cfg";
const SYSTEM_CONFIG_PATH: &str = "/etc/nmproxy.cfg";

/// Log destination meaning "standard error".
pub const LOG_STDERR: &str = "stderr";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {} as YAML ({yaml}) or JSON ({json})", path.display())]
    Parse {
        path: PathBuf,
        yaml: serde_yaml::Error,
        json: serde_json::Error,
    },
    #[error("invalid proxy url {url:?}: {source}")]
    InvalidProxy {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("command needs to be specified")]
    MissingCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Native messaging host executable.
    pub command: Option<PathBuf>,
    /// Optional upstream proxy for relay POSTs.
    pub proxy: Option<String>,
    /// `"stderr"` or a file path.
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: None,
            proxy: None,
            log: LOG_STDERR.to_string(),
        }
    }
}

/// Resolve the config location.
pub fn config_path() -> PathBuf {
    let from_env = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty());
    resolve_config_path(from_env.map(PathBuf::from), dirs::config_dir())
}

fn resolve_config_path(from_env: Option<PathBuf>, user_config_dir: Option<PathBuf>) -> PathBuf {
    if let Some(path) = from_env {
        return path;
    }
    match user_config_dir {
        Some(dir) => dir.join(CONFIG_FILE_NAME),
        None => PathBuf::from(SYSTEM_CONFIG_PATH),
    }
}

impl Config {
    /// Parse as YAML, falling back to JSON.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, ConfigError> {
        let yaml = match serde_yaml::from_slice(bytes) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };
        serde_json::from_slice(bytes).map_err(|json| ConfigError::Parse {
            path: path.to_path_buf(),
            yaml,
            json,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &bytes)
    }

    /// Failsafe load: any failure yields the empty config.
    ///
    /// The error is handed back so it can be reported once logging is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Host executable, or [`ConfigError::MissingCommand`] if unset.
    pub fn require_command(&self) -> Result<&Path, ConfigError> {
        match self.command.as_deref() {
            Some(command) if !command.as_os_str().is_empty() => Ok(command),
            _ => Err(ConfigError::MissingCommand),
        }
    }

    /// Parsed proxy URL; an empty string means no proxy.
    pub fn proxy_url(&self) -> Result<Option<Url>, ConfigError> {
        match self.proxy.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|source| ConfigError::InvalidProxy {
                    url: raw.to_string(),
                    source,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let json = br#"{"command":"/opt/host","proxy":"socks5://127.0.0.1:1080","log":"/tmp/nm.log"}"#;
        let config = Config::parse(Path::new("test.cfg"), json).unwrap();

        assert_eq!(config.require_command().unwrap(), Path::new("/opt/host"));
        assert_eq!(
            config.proxy_url().unwrap().unwrap().as_str(),
            "socks5://127.0.0.1:1080"
        );
        assert_eq!(config.log, "/tmp/nm.log");
    }

    #[test]
    fn parses_yaml_config() {
        let yaml = b"command: /bin/cat\nproxy: socks5://127.0.0.1:1080\n";
        let config = Config::parse(Path::new("test.cfg"), yaml).unwrap();

        assert_eq!(config.command, Some(PathBuf::from("/bin/cat")));
        assert_eq!(
            config.proxy_url().unwrap().unwrap().as_str(),
            "socks5://127.0.0.1:1080"
        );
        assert_eq!(config.log, LOG_STDERR);
    }

    #[test]
    fn load_or_default_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"command: /bin/cat\nlog: /tmp/nm.log\n").unwrap();

        let (config, err) = Config::load_or_default(file.path());
        assert!(err.is_none(), "{err:?}");
        assert_eq!(config.command, Some(PathBuf::from("/bin/cat")));
        assert_eq!(config.log, "/tmp/nm.log");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = Config::parse(Path::new("test.cfg"), b"{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log, LOG_STDERR);
        assert!(config.proxy_url().unwrap().is_none());
        assert!(matches!(
            config.require_command(),
            Err(ConfigError::MissingCommand)
        ));
    }

    #[test]
    fn empty_command_is_missing() {
        let config =
            Config::parse(Path::new("test.cfg"), br#"{"command":"","proxy":""}"#).unwrap();
        assert!(matches!(
            config.require_command(),
            Err(ConfigError::MissingCommand)
        ));
        assert!(config.proxy_url().unwrap().is_none());
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let config = Config {
            proxy: Some("not a url".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            config.proxy_url(),
            Err(ConfigError::InvalidProxy { .. })
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"command":"/bin/cat"}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.command, Some(PathBuf::from("/bin/cat")));
    }

    #[test]
    fn load_or_default_survives_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = Config::load_or_default(&dir.path().join("absent.cfg"));
        assert_eq!(config, Config::default());
        assert!(matches!(err, Some(ConfigError::Read { .. })));
    }

    #[test]
    fn load_or_default_survives_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"command: [unterminated").unwrap();

        let (config, err) = Config::load_or_default(file.path());
        assert_eq!(config, Config::default());
        assert!(matches!(err, Some(ConfigError::Parse { .. })));
    }

    #[test]
    fn config_path_prefers_env() {
        let path = resolve_config_path(
            Some(PathBuf::from("/custom/nm.cfg")),
            Some(PathBuf::from("/home/u/.config")),
        );
        assert_eq!(path, PathBuf::from("/custom/nm.cfg"));
    }

    #[test]
    fn config_path_falls_back_to_user_then_system() {
        assert_eq!(
            resolve_config_path(None, Some(PathBuf::from("/home/u/.config"))),
            PathBuf::from("/home/u/.config/nmproxy.cfg")
        );
        assert_eq!(
            resolve_config_path(None, None),
            PathBuf::from(SYSTEM_CONFIG_PATH)
        );
    }
}
