// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_PATH: &str = "vkclear.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WindowCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_validation")]
    pub validation: bool,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            validation: default_validation(),
        }
    }
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_title() -> String {
    "vkclear".to_owned()
}
fn default_clear() -> [f32; 4] {
    [1.0, 0.0, 0.0, 1.0]
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}

/// Parses `text`, falling back to defaults on error.
pub fn parse(text: &str) -> AppCfg {
    match toml::from_str::<AppCfg>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config parse error, using defaults: {e}");
            AppCfg::default()
        }
    }
}

/// `Ok(None)` when the file does not exist.
fn read(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A missing file is not an error; any other read failure is logged and
/// falls back to defaults.
pub fn load(path: &Path) -> AppCfg {
    match read(path) {
        Ok(Some(s)) => {
            info!("config: {}", path.display());
            parse(&s)
        }
        Ok(None) => AppCfg::default(),
        Err(e) => {
            warn!("config {} unreadable, using defaults: {e}", path.display());
            AppCfg::default()
        }
    }
}
