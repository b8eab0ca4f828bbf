use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{PtunError, PtunResult};

/// Host both tunnel endpoints resolve against: the listener binds here and
/// the remote peer dials it from its own network.
pub const LOCAL_HOST: &str = "localhost";

/// Configuration for one SSH tunnel
///
/// Unset numeric fields deserialize to 0 and are resolved through the
/// accessor methods, which carry the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSpec {
    /// Remote SSH server hostname or IP address
    pub host: String,
    /// SSH port (default: 22)
    #[serde(default)]
    pub port: u16,
    /// Username for the SSH connection (default: "root")
    #[serde(default)]
    pub user: String,
    /// Password for the SSH connection (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to the identity key file (default: ~/.ssh/id_rsa when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_key_path: Option<PathBuf>,
    /// Port the remote peer dials on the tunnel's behalf
    #[serde(default)]
    pub bind_port: u16,
    /// Port the tunnel listens on locally
    #[serde(default)]
    pub forward_port: u16,
    /// Keep-alive probing of the SSH session
    #[serde(default)]
    pub keep_alive: KeepAliveSpec,
}

/// Keep-alive settings; either field at 0 disables monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeepAliveSpec {
    /// Seconds between liveness probes
    #[serde(default)]
    pub interval: u64,
    /// Missed probes tolerated before the session is force-closed
    #[serde(default)]
    pub count_max: u32,
}

impl TunnelSpec {
    /// Load a tunnel spec from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PtunResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PtunError::Config(format!("Failed to read config file: {e}")))?;

        let spec: TunnelSpec = serde_json::from_str(&content)
            .map_err(|e| PtunError::Config(format!("Failed to parse config: {e}")))?;

        spec.validate()?;
        Ok(spec)
    }

    /// Save the tunnel spec to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> PtunResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PtunError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| PtunError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the spec
    ///
    /// An identity key configured explicitly must be loadable up front; a
    /// missing password AND key is not an error here, it surfaces as an
    /// authentication failure at dial time.
    pub fn validate(&self) -> PtunResult<()> {
        if self.host.is_empty() {
            return Err(PtunError::Config("Remote host cannot be empty".to_string()));
        }

        if self.password().is_none()
            && let Some(path) = &self.identity_key_path
        {
            russh::keys::load_secret_key(path, None).map_err(|e| {
                PtunError::Config(format!("Cannot load identity key {}: {e}", path.display()))
            })?;
        }

        Ok(())
    }

    /// SSH username, defaulting to "root"
    pub fn user(&self) -> &str {
        if self.user.is_empty() { "root" } else { &self.user }
    }

    /// SSH server port, defaulting to 22
    pub fn port(&self) -> u16 {
        if self.port == 0 { 22 } else { self.port }
    }

    /// Password, treating an empty string as absent
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Identity key path: the configured one, else ~/.ssh/id_rsa when it
    /// exists on disk
    pub fn identity_key_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.identity_key_path {
            return Some(path.clone());
        }

        let home = std::env::var_os("HOME")?;
        let fallback = Path::new(&home).join(".ssh").join("id_rsa");
        fallback.exists().then_some(fallback)
    }

    /// Local listen port: `forward_port`, folding back to the SSH port when
    /// `bind_port` is 0
    pub fn listen_port(&self) -> u16 {
        if self.bind_port == 0 {
            return self.port();
        }

        self.forward_port
    }

    /// Port the remote peer connects to on the tunnel's behalf
    pub fn dial_port(&self) -> u16 {
        self.bind_port
    }

    /// Address the local listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{LOCAL_HOST}:{}", self.listen_port())
    }

    /// Address dialed from the remote peer's network vantage point
    pub fn dial_addr(&self) -> String {
        format!("{LOCAL_HOST}:{}", self.dial_port())
    }
}

impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} | {} -> {}",
            self.user(),
            self.host,
            self.bind_addr(),
            self.dial_addr()
        )
    }
}
