use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::logging::{LogConfig, LogFormat, LogOutput};

pub const CONFIG_FILE_NAME: &str = "httpy.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpyConfig {
    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Which Python callables to resolve and how to call them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonConfig {
    #[serde(default)]
    pub init_module: Option<String>,

    #[serde(default)]
    pub init_function: Option<String>,

    #[serde(default)]
    pub request_module: String,

    #[serde(default)]
    pub request_function: String,

    /// Directories prepended to `sys.path` before any import
    #[serde(default)]
    pub python_path: Vec<PathBuf>,

    /// Print Python tracebacks to the interpreter's stderr when a call raises
    #[serde(default = "default_true")]
    pub print_tracebacks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Write daily-rotated files here instead of stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default)]
    pub span_events: bool,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            init_module: None,
            init_function: None,
            request_module: String::new(),
            request_function: String::new(),
            python_path: Vec::new(),
            print_tracebacks: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            directory: None,
            filter: None,
            span_events: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_level() -> String { "info".to_string() }

impl PythonConfig {
    pub fn new(request_module: impl Into<String>, request_function: impl Into<String>) -> Self {
        Self {
            request_module: request_module.into(),
            request_function: request_function.into(),
            ..Self::default()
        }
    }

    pub fn with_init(mut self, module: impl Into<String>, function: impl Into<String>) -> Self {
        self.init_module = Some(module.into());
        self.init_function = Some(function.into());
        self
    }

    pub fn with_python_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.python_path.push(dir.into());
        self
    }

    pub fn with_tracebacks(mut self, enabled: bool) -> Self {
        self.print_tracebacks = enabled;
        self
    }

    /// Both request module and function are mandatory
    pub fn validate(&self) -> Result<(), crate::errors::BridgeError> {
        if self.request_module.is_empty() || self.request_function.is_empty() {
            return Err(crate::errors::BridgeError::MissingEntrypoint);
        }
        Ok(())
    }

    /// The init callable, only when both halves are given
    pub fn init_target(&self) -> Option<(&str, &str)> {
        match (self.init_module.as_deref(), self.init_function.as_deref()) {
            (Some(module), Some(function)) if !module.is_empty() && !function.is_empty() => {
                Some((module, function))
            }
            _ => None,
        }
    }

    /// `module.function` of the request handler
    pub fn request_target(&self) -> String {
        format!("{}.{}", self.request_module, self.request_function)
    }
}

impl LoggingSection {
    /// Translate into a logging setup; an unknown level falls back to INFO
    pub fn to_log_config(&self) -> LogConfig {
        let level = self.level.parse().unwrap_or(tracing::Level::INFO);
        let output = match &self.directory {
            Some(dir) => LogOutput::File {
                directory: dir.to_string_lossy().to_string(),
                prefix: "httpy".to_string(),
            },
            None => LogOutput::Stderr,
        };

        let mut config = LogConfig::new()
            .with_level(level)
            .with_format(self.format)
            .with_output(output)
            .with_span_events(self.span_events);
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

impl HttpyConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content)?;

        // Relative python_path entries are relative to the config file
        if let Some(base) = path.parent() {
            for dir in &mut config.python.python_path {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find `httpy.toml` in the current directory or its parents
    pub fn discover() -> Option<(PathBuf, Result<Self, ConfigError>)> {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                let loaded = Self::load(&config_path);
                return Some((config_path, loaded));
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        let mut config = Self::default();
        config.python.request_module = "worker".to_string();
        config.python.request_function = "handle".to_string();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
