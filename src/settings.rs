use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::authz::loader::CompileOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub policy: PolicySettings,
    pub logging: Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Enforced policy document (JSON). Default: rbac.json
    pub path: PathBuf,
    /// Optional document evaluated alongside the enforced one, for logging only
    pub shadow_path: Option<PathBuf>,
    /// Upper bound on each compiled regex, in bytes. Unset keeps the regex crate default.
    pub regex_size_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    /// Default `tracing` filter when RUST_LOG is not set
    pub level: String,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rbac.json"),
            shadow_path: None,
            regex_size_limit: None,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default(
                "policy.path",
                PolicySettings::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("logging.level", Logging::default().level)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: RBAC_ENGINE__LOGGING__LEVEL=debug, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("RBAC_ENGINE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize policy paths to be relative to current dir
        if s.policy.path.is_relative() {
            s.policy.path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.policy.path);
        }
        if let Some(shadow) = s.policy.shadow_path.take() {
            s.policy.shadow_path = Some(if shadow.is_relative() {
                std::env::current_dir().into_diagnostic()?.join(shadow)
            } else {
                shadow
            });
        }

        Ok(s)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            regex_size_limit: self.policy.regex_size_limit,
        }
    }
}
