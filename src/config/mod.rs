//! User configuration: `~/.devtools.yaml`, created with defaults on first
//! use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

pub const CONFIG_FILE_NAME: &str = ".devtools.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Default per-node timeout in seconds; a flow-level `timeout`
    /// variable still overrides it per run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Default report target when none is passed on the command line.
    #[serde(default = "default_report")]
    pub report: String,
    /// Remote JS evaluator endpoint, if any.
    #[serde(default)]
    pub js_evaluator_url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_report() -> String {
    "console".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            report: default_report(),
            js_evaluator_url: None,
        }
    }
}

/// Default config path under the user's home directory.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Read the config file, writing the defaults first when it is absent.
pub fn load_or_init(path: &Path) -> FlowResult<Config> {
    if !path.exists() {
        let config = Config::default();
        let text = serde_yaml::to_string(&config)
            .map_err(|e| FlowError::FlowFile(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| FlowError::FlowFile(format!("writing {}: {e}", path.display())))?;
        return Ok(config);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| FlowError::FlowFile(format!("reading {}: {e}", path.display())))?;
    serde_yaml::from_str(&text).map_err(|e| FlowError::FlowFile(e.to_string()))
}
