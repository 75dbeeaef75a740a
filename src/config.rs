//! Server configuration: TOML file plus command-line overrides.

use std::path::{Path, PathBuf};

use clap::Parser;
use log::warn;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to listen on.
    pub listen: String,
    /// Base TCP port (conventionally 5900 + display number).
    pub port: u16,
    /// Walk upward from `port` when it is already taken.
    pub find_unused_port: bool,
    /// Framebuffer width in pixels.
    pub width: usize,
    /// Framebuffer height in pixels.
    pub height: usize,
    /// Internal framebuffer depth: 8, 15, 16, or 32.
    pub depth: u8,
    /// Desktop title sent in ServerInit.
    pub title: String,
    /// File holding the VNC password (first line, at most 8 bytes used).
    pub password_file: Option<PathBuf>,
    /// Shell to run; defaults to `$SHELL` then `/bin/sh`.
    pub shell: Option<String>,
    /// Scrollback ring rows (visible rows plus history).
    pub scrollback: usize,
    /// Log destination; stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Snapshot to restore on startup.
    pub restore: Option<PathBuf>,
    /// Snapshot to write when the session ends.
    pub dump_on_exit: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 5900,
            find_unused_port: false,
            width: 640,
            height: 384,
            depth: 8,
            title: "rfbterm".to_string(),
            password_file: None,
            shell: None,
            scrollback: 512,
            log_file: None,
            restore: None,
            dump_on_exit: None,
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("config {}: {e}; using defaults", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&data) {
            Ok(config) => config,
            Err(e) => {
                warn!("config {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.find_unused_port {
            self.find_unused_port = true;
        }
        if let Some(width) = cli.width {
            self.width = width;
        }
        if let Some(height) = cli.height {
            self.height = height;
        }
        if let Some(depth) = cli.depth {
            self.depth = depth;
        }
        if let Some(title) = &cli.title {
            self.title = title.clone();
        }
        if let Some(pw) = &cli.password_file {
            self.password_file = Some(pw.clone());
        }
        if let Some(shell) = &cli.shell {
            self.shell = Some(shell.clone());
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = Some(log_file.clone());
        }
        if let Some(restore) = &cli.restore {
            self.restore = Some(restore.clone());
        }
        if let Some(dump) = &cli.dump_on_exit {
            self.dump_on_exit = Some(dump.clone());
        }
    }

    /// The shell to spawn.
    pub fn shell_command(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    /// Read the VNC password, if configured. Empty file means no auth.
    pub fn password(&self) -> Option<Vec<u8>> {
        let path = self.password_file.as_ref()?;
        match std::fs::read(path) {
            Ok(data) => {
                let line = data.split(|&b| b == b'\n').next().unwrap_or(&[]);
                if line.is_empty() {
                    None
                } else {
                    Some(line[..line.len().min(8)].to_vec())
                }
            }
            Err(e) => {
                warn!("password file {}: {e}; running without auth", path.display());
                None
            }
        }
    }
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "rfbterm", about = "Text terminal served over RFB/VNC")]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Listen address.
    #[arg(long)]
    pub listen: Option<String>,
    /// Listen port.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Search upward for a free port.
    #[arg(long)]
    pub find_unused_port: bool,
    /// Framebuffer width in pixels.
    #[arg(long)]
    pub width: Option<usize>,
    /// Framebuffer height in pixels.
    #[arg(long)]
    pub height: Option<usize>,
    /// Internal depth (8, 15, 16, 32).
    #[arg(long)]
    pub depth: Option<u8>,
    /// Desktop title.
    #[arg(short, long)]
    pub title: Option<String>,
    /// VNC password file.
    #[arg(long)]
    pub password_file: Option<PathBuf>,
    /// Shell to run.
    #[arg(long)]
    pub shell: Option<String>,
    /// Log file (stderr when absent).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Restore a terminal snapshot on startup.
    #[arg(long)]
    pub restore: Option<PathBuf>,
    /// Write a terminal snapshot when the session ends.
    #[arg(long)]
    pub dump_on_exit: Option<PathBuf>,
    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Config};
    use clap::Parser;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 5900);
        assert_eq!((config.width, config.height), (640, 384));
        assert_eq!(config.depth, 8);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str("port = 5901\ntitle = \"console\"").unwrap();
        assert_eq!(config.port, 5901);
        assert_eq!(config.title, "console");
        assert_eq!(config.width, 640);
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.listen, config.listen);
    }

    #[test]
    fn cli_overrides_file_values() {
        let cli = Cli::parse_from(["rfbterm", "--port", "6000", "--depth", "32"]);
        let mut config = Config::default();
        config.apply_cli(&cli);
        assert_eq!(config.port, 6000);
        assert_eq!(config.depth, 32);
        assert_eq!(config.width, 640);
    }
}
