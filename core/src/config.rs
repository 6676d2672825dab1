/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a toolkit for line-oriented TCP dialogues.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Configuration: endpoints per protocol, transport limits and the HTTP server root.
//! Stored as JSON in ~/.staffetta/config.json; every field has a default so a partial
//! file (or none at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Protocol;

const DEFAULT_MAX_LINE_LENGTH: usize = 8192;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;
const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;

/// Limits applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Longest accepted line, terminator excluded.
    pub max_line_length: usize,
    pub connect_timeout_ms: u64,
    /// Per read/write timeout; `None` blocks until the peer acts or closes.
    pub io_timeout_ms: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: Some(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

/// Remote endpoint of one protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self {
            host: default_host(),
            port: protocol.default_port(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_smtp() -> EndpointConfig {
    EndpointConfig::for_protocol(Protocol::Smtp)
}

fn default_pop3() -> EndpointConfig {
    EndpointConfig::for_protocol(Protocol::Pop3)
}

fn default_http() -> EndpointConfig {
    EndpointConfig::for_protocol(Protocol::Http)
}

/// HTTP GET server settings. Shared read-only between connection tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Directory under which request paths are resolved.
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default = "default_smtp")]
    pub smtp: EndpointConfig,
    #[serde(default = "default_pop3")]
    pub pop3: EndpointConfig,
    #[serde(default = "default_http")]
    pub http: EndpointConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            smtp: default_smtp(),
            pop3: default_pop3(),
            http: default_http(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn endpoint(&self, protocol: Protocol) -> &EndpointConfig {
        match protocol {
            Protocol::Smtp => &self.smtp,
            Protocol::Pop3 => &self.pop3,
            Protocol::Http => &self.http,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.transport.max_line_length == 0 {
            return Err(Error::Config("max_line_length must be positive".into()));
        }
        for protocol in [Protocol::Smtp, Protocol::Pop3, Protocol::Http] {
            if self.endpoint(protocol).port == 0 {
                return Err(Error::Config(format!("{} port must be non-zero", protocol)));
            }
        }
        Ok(())
    }
}

/// Default config directory: ~/.staffetta.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|h| h.join(".staffetta"))
}

/// Default config path: ~/.staffetta/config.json.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("config.json"))
}
