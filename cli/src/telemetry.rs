//! Tracing / logging initialisation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `"warn,ethrpc_core=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `config`.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr so command output on stdout stays pipeable.
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
