use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml_ng::{Mapping, Value};

use crate::error::{ArchiveError, Result};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const CONFIG_PRIVATE_FILE_NAME: &str = "config.private.yaml";

/// Largest `count` the platform accepts for both conversations and history pages.
pub const MAX_PAGE_SIZE: u32 = 200;

/// History pages overlap by the boundary message, so a page of one never moves
/// the cursor past it.
pub const MIN_HISTORY_PAGE_SIZE: u32 = 2;

/// Run configuration, built once at startup and handed to whoever needs it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub login: Option<String>,
    pub password: Option<String>,
    pub app_id: Option<u64>,
    pub client_secret: Option<String>,
    /// Skips the login handshake when present.
    pub access_token: Option<String>,
    pub api_version: String,
    pub api_base_url: String,
    pub oauth_url: String,
    /// Empty means interactive selection.
    pub peer_ids_to_process: Vec<i64>,
    pub doc_ignore_by_type: HashSet<i64>,
    pub process_video: bool,
    pub output_dir: PathBuf,
    pub conversations_page_size: u32,
    pub history_page_size: u32,
    pub write_manifest: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login: None,
            password: None,
            app_id: None,
            client_secret: None,
            access_token: None,
            api_version: "5.131".to_string(),
            api_base_url: "https://api.vk.com/method/".to_string(),
            oauth_url: "https://oauth.vk.com/token".to_string(),
            peer_ids_to_process: Vec::new(),
            doc_ignore_by_type: HashSet::new(),
            process_video: false,
            output_dir: PathBuf::from("output"),
            conversations_page_size: 100,
            history_page_size: MAX_PAGE_SIZE,
            write_manifest: true,
        }
    }
}

impl Config {
    /// Loads the base file and lays the private file over it key by key.
    ///
    /// A missing base file counts as empty, so a setup that only has the private
    /// file (or relies on defaults and CLI flags) still works.
    pub fn load(base: &Path, private: Option<&Path>) -> Result<Self> {
        let mut merged = read_layer(base)?.unwrap_or_default();
        if let Some(private) = private {
            if let Some(layer) = read_layer(private)? {
                overlay(&mut merged, layer);
            }
        }
        Self::from_mapping(merged)
    }

    pub fn from_yaml_layers(base: &str, private: Option<&str>) -> Result<Self> {
        let mut merged = parse_layer(base)?;
        if let Some(private) = private {
            overlay(&mut merged, parse_layer(private)?);
        }
        Self::from_mapping(merged)
    }

    fn from_mapping(merged: Mapping) -> Result<Self> {
        let merged: Mapping = merged.into_iter().filter(|(_, v)| !v.is_null()).collect();
        let config: Config = serde_yaml_ng::from_value(Value::Mapping(merged))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value, min) in [
            ("conversations_page_size", self.conversations_page_size, 1),
            ("history_page_size", self.history_page_size, MIN_HISTORY_PAGE_SIZE),
        ] {
            if !(min..=MAX_PAGE_SIZE).contains(&value) {
                return Err(ArchiveError::Config(format!(
                    "{key} must be between {min} and {MAX_PAGE_SIZE}, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn uses_allow_list(&self) -> bool {
        !self.peer_ids_to_process.is_empty()
    }
}

fn read_layer(path: &Path) -> Result<Option<Mapping>> {
    match fs::read_to_string(path) {
        Ok(content) => parse_layer(&content).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArchiveError::io(path, e)),
    }
}

fn parse_layer(content: &str) -> Result<Mapping> {
    match serde_yaml_ng::from_str::<Value>(content)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => Err(ArchiveError::Config(format!(
            "expected a mapping at the top level, found {other:?}"
        ))),
    }
}

// Null values never override; `from_mapping` drops the ones left in the base so
// `key:` with no value behaves exactly like an absent key.
fn overlay(base: &mut Mapping, layer: Mapping) {
    for (key, value) in layer {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
}
