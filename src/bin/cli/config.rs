use graphcheck::check::{CheckConfig, ConsistencyFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Names accepted in a profile's `skip` list and by the `--skip-*` flags.
pub const CHECK_GROUPS: [&str; 5] = ["graph", "label-index", "properties", "indexes", "counts"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: String,
    pub workers: Option<usize>,
    pub chunk_size: Option<u64>,
    pub max_memory: Option<u64>,
    pub max_violations: Option<usize>,
    pub skip: Vec<String>,
}

impl Profile {
    /// Layers the profile's values over `config`.
    pub fn apply(&self, config: &mut CheckConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.ids_per_chunk = chunk_size;
        }
        if let Some(max_memory) = self.max_memory {
            config.memory_ceiling = Some(max_memory);
        }
        if let Some(max_violations) = self.max_violations {
            config.max_retained_violations = Some(max_violations);
        }
        for group in &self.skip {
            skip_group(&mut config.flags, group);
        }
    }
}

/// Turns off one named check group. Unknown names are ignored; profiles are
/// validated when loaded.
pub fn skip_group(flags: &mut ConsistencyFlags, group: &str) {
    match group {
        "graph" => flags.check_graph = false,
        "label-index" => flags.check_label_index = false,
        "properties" => flags.check_properties = false,
        "indexes" => flags.check_indexes = false,
        "counts" => flags.check_counts = false,
        _ => {}
    }
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    default_profile: Option<String>,
    profiles: HashMap<String, Profile>,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let required = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if required => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        let profiles = parse_profiles(&data)?;
        Ok(Self {
            path,
            default_profile: data.default_profile,
            profiles,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up `name`, falling back to the configured default profile when
    /// no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<Option<&Profile>, ConfigError> {
        match name.or(self.default_profile.as_deref()) {
            Some(name) => self
                .profiles
                .get(name)
                .map(Some)
                .ok_or_else(|| ConfigError::ProfileNotFound {
                    name: name.to_string(),
                }),
            None => Ok(None),
        }
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_profiles(data: &RawConfig) -> Result<HashMap<String, Profile>, ConfigError> {
    let mut profiles = HashMap::new();
    for (name, raw) in &data.profiles {
        profiles.insert(name.clone(), convert_profile(name, raw)?);
    }
    if let Some(default_name) = data.default_profile.as_ref() {
        if !profiles.contains_key(default_name) {
            return Err(ConfigError::ProfileNotFound {
                name: default_name.clone(),
            });
        }
    }
    Ok(profiles)
}

fn convert_profile(name: &str, raw: &RawProfile) -> Result<Profile, ConfigError> {
    for group in &raw.skip {
        if !CHECK_GROUPS.contains(&group.as_str()) {
            return Err(ConfigError::InvalidCheck {
                profile: name.to_string(),
                value: group.clone(),
            });
        }
    }
    Ok(Profile {
        name: name.to_string(),
        workers: raw.workers,
        chunk_size: raw.chunk_size,
        max_memory: raw.max_memory,
        max_violations: raw.max_violations,
        skip: raw.skip.clone(),
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    profiles: HashMap<String, RawProfile>,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawProfile {
    workers: Option<usize>,
    chunk_size: Option<u64>,
    max_memory: Option<u64>,
    max_violations: Option<usize>,
    #[serde(default)]
    skip: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
    #[error("profile '{profile}' skips unknown check group '{value}'")]
    InvalidCheck { profile: String, value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("graphcheck").join("cli.toml"))
}
