use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from herder.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HerderConfig {
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Exact name of the process to watch.
    pub name: String,
    /// Load factor at or above which a sample counts as overloaded.
    pub limit: f64,
    /// Cooldown after a kill, in seconds.
    pub grace_secs: u64,
    /// Consecutive overloaded samples needed to kill.
    pub samples: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            limit: 0.7,
            grace_secs: 20,
            samples: 3,
        }
    }
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub name: Option<String>,
    pub limit: Option<f64>,
    pub grace_secs: Option<u64>,
    pub samples: Option<u32>,
}

/// Resolved, validated settings. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub name: String,
    pub limit: f64,
    pub grace: Duration,
    pub samples: NonZeroU32,
}

impl std::fmt::Display for MonitorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "name:    {}", self.name)?;
        writeln!(f, "limit:   {}", self.limit)?;
        writeln!(f, "grace:   {}s", self.grace.as_secs())?;
        write!(f, "samples: {}", self.samples)
    }
}

/// Errors from loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// No process name was given anywhere.
    MissingName,
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::MissingName => write!(f, "no process name given"),
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingName | ConfigError::Invalid { .. } => None,
        }
    }
}

impl HerderConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists. A missing file yields defaults unless
    /// `required` is set.
    pub fn load_or_default(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

impl MonitorConfig {
    /// Apply command-line overrides on top of file values.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(name) = &overrides.name {
            self.name = name.clone();
        }
        if let Some(limit) = overrides.limit {
            self.limit = limit;
        }
        if let Some(grace_secs) = overrides.grace_secs {
            self.grace_secs = grace_secs;
        }
        if let Some(samples) = overrides.samples {
            self.samples = samples;
        }
    }

    /// Validate and freeze into [`MonitorSettings`].
    pub fn resolve(&self) -> Result<MonitorSettings, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if !self.limit.is_finite() || self.limit < 0.0 {
            return Err(ConfigError::Invalid {
                field: "limit",
                reason: format!("{} is not a non-negative number", self.limit),
            });
        }
        let samples = NonZeroU32::new(self.samples).ok_or_else(|| ConfigError::Invalid {
            field: "samples",
            reason: "must be at least 1".to_string(),
        })?;

        Ok(MonitorSettings {
            name: self.name.clone(),
            limit: self.limit,
            grace: Duration::from_secs(self.grace_secs),
            samples,
        })
    }
}
