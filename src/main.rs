use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use rbac_engine::authz::loader::load_document;
use rbac_engine::settings::Settings;
use rbac_engine::RbacFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rbac-engine",
    version,
    about = "Evaluate request attributes against an RBAC policy document"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Policy document to enforce, overriding `policy.path`
    #[arg(short, long)]
    policy: Option<PathBuf>,

    /// Request attribute as key=value, e.g. --attr :path=/hello (repeatable)
    #[arg(short, long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, String)>,
}

fn parse_attr(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty attribute key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // load settings
    let mut settings = Settings::load(&cli.config)?;
    if let Some(policy) = cli.policy {
        settings.policy.path = policy;
    }

    // logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();
    tracing::debug!(?settings, "Loaded configuration");

    let options = settings.compile_options();
    let filter = RbacFilter::new(options.clone());
    filter.publish(load_document(&settings.policy.path, &options)?);
    if let Some(shadow_path) = &settings.policy.shadow_path {
        filter.publish_shadow(Some(load_document(shadow_path, &options)?));
    }

    let attrs: HashMap<String, String> = cli.attrs.into_iter().collect();
    let result = filter.check(&attrs)?;

    println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    Ok(if result.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
