use std::collections::BTreeMap;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };
use tracing::debug;

pub const CONFIG_ENV: &str = "DOKCTL_CONFIG";
const CONFIG_FILE: &str = "servers.yaml";

/// One remote server the client can talk to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL, e.g. `https://deploy.example.com`
    pub server_url: String,

    /// Sent as `x-api-key`
    pub api_token: String,

    /// Project selected on first load instead of the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project_id: Option<String>,
}

/// Root of `servers.yaml`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_alias: Option<String>,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown server alias '{0}'")]
    UnknownAlias(String),
    #[error("no servers configured, add one to {}", .0.display())]
    NoServers(PathBuf),
    #[error("cannot determine a config directory")]
    NoConfigDir,
    #[error("cannot connect to '{alias}': {reason}")]
    Client {
        alias: String,
        reason: String,
    },
}

impl ServersConfig {
    /// `$DOKCTL_CONFIG`, else `<config dir>/dokctl/servers.yaml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            if !env_path.trim().is_empty() {
                return Ok(PathBuf::from(env_path));
            }
        }
        dirs::config_dir()
            .map(|dir| dir.join("dokctl").join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// A missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no server config, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io { path: path.to_path_buf(), source });
            }
        };
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text).map_err(io)
    }

    pub fn aliases(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// `current_alias` if it names a configured server, else the first alias.
    pub fn active(&self) -> Option<(&str, &ServerConfig)> {
        self.current_alias
            .as_deref()
            .and_then(|alias| self.servers.get_key_value(alias))
            .or_else(|| self.servers.iter().next())
            .map(|(alias, server)| (alias.as_str(), server))
    }

    pub fn server(&self, alias: &str) -> Result<&ServerConfig, ConfigError> {
        self.servers.get(alias).ok_or_else(|| ConfigError::UnknownAlias(alias.to_string()))
    }

    pub fn use_alias(&mut self, alias: &str) -> Result<(), ConfigError> {
        self.server(alias)?;
        self.current_alias = Some(alias.to_string());
        Ok(())
    }
}
