use std::{env, fmt, fs, io, path};

use meshcore::graph::ReplayRetention;
use meshcore::MeshConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("neither XDG_CONFIG_HOME nor a home directory is available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the identity seed and trust graph live unless `mesh` overrides them
    pub data_dir: path::PathBuf,
    pub log_level: String,
    pub mesh: MeshConfig,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

fn xdg_dir(var: &str, fallback: &str) -> Option<path::PathBuf> {
    if let Ok(dir) = env::var(var) {
        if !dir.is_empty() {
            return Some(path::PathBuf::from(dir));
        }
    }
    env::home_dir().map(|home| home.join(fallback))
}

/// Get default config path ($XDG_CONFIG_HOME/mesh/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    xdg_dir("XDG_CONFIG_HOME", ".config")
        .map(|dir| dir.join("mesh/config.toml"))
        .ok_or(Error::ConfigPathUnavailable)
}

/// $XDG_DATA_HOME/mesh or $HOME/.local/share/mesh, else ./.mesh
fn default_data_dir() -> path::PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
        .map(|dir| dir.join("mesh"))
        .unwrap_or_else(|| path::PathBuf::from(".mesh"))
}

impl Default for Config {
    fn default() -> Self {
        Self { data_dir: default_data_dir(), log_level: "warn".into(), mesh: MeshConfig::default() }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let mesh = self.resolved_mesh();
        let retention = match mesh.replay_retention {
            ReplayRetention::Unbounded => "unbounded".to_string(),
            ReplayRetention::Window { retention_ms } => format!("{} ms", retention_ms),
        };
        let show_path = |path: &Option<path::PathBuf>| {
            path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(memory)".into())
        };

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "General")?;
        write_1(f, "Data Directory", &self.data_dir.display())?;
        write_1(f, "Log Level", &self.log_level)?;
        write_title_1(f, "Mesh")?;
        write_1(f, "Nickname", &mesh.nickname.as_deref().unwrap_or("(none)"))?;
        write_1(f, "Max Clock Skew", &format!("{} ms", mesh.max_clock_skew_ms))?;
        write_1(f, "Replay Retention", &retention)?;
        write_1(f, "Cipher Suite", &format!("{:?}", mesh.cipher_suite))?;
        write_1(f, "Identity File", &show_path(&mesh.identity_path))?;
        write_1(f, "Graph File", &show_path(&mesh.graph_path))?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/mesh/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Mesh settings with file locations filled in from `data_dir`.
    pub fn resolved_mesh(&self) -> MeshConfig {
        let mut mesh = self.mesh.clone();
        if mesh.identity_path.is_none() {
            mesh.identity_path = Some(self.data_dir.join("identity.key"));
        }
        if mesh.graph_path.is_none() {
            mesh.graph_path = Some(self.data_dir.join("graph.json"));
        }
        mesh
    }
}
