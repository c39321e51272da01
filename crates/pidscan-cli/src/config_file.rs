use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pidscan_core::ScannerConfig;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PIDSCAN_CONFIG";

/// Config file looked up in the working directory.
pub const CWD_CONFIG: &str = "pidscan.json";

/// Where the effective configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named by `--config` or `$PIDSCAN_CONFIG`; must exist.
    Explicit(PathBuf),
    /// Found at a conventional location.
    Discovered(PathBuf),
    Defaults,
}

/// Platform config directory path: `<config_dir>/pidscan/config.json`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pidscan").join("config.json"))
}

/// Pick the config source: flag, then env var, then `./pidscan.json`, then
/// the platform config file, then built-in defaults.
pub fn resolve_source(
    flag: Option<PathBuf>,
    env: Option<OsString>,
    cwd_file: &Path,
    platform_file: Option<PathBuf>,
) -> ConfigSource {
    if let Some(path) = flag {
        return ConfigSource::Explicit(path);
    }
    if let Some(path) = env.filter(|v| !v.is_empty()) {
        return ConfigSource::Explicit(PathBuf::from(path));
    }
    if cwd_file.is_file() {
        return ConfigSource::Discovered(cwd_file.to_path_buf());
    }
    match platform_file {
        Some(path) if path.is_file() => ConfigSource::Discovered(path),
        _ => ConfigSource::Defaults,
    }
}

/// Load the configuration for this process.
///
/// A config file that exists but does not parse or validate is an error
/// wherever it was found; it never silently falls back to defaults.
pub fn load_config(flag: Option<PathBuf>) -> anyhow::Result<ScannerConfig> {
    let source = resolve_source(
        flag,
        std::env::var_os(CONFIG_ENV),
        Path::new(CWD_CONFIG),
        config_path(),
    );
    load_from_source(&source)
}

pub fn load_from_source(source: &ConfigSource) -> anyhow::Result<ScannerConfig> {
    match source {
        ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            ScannerConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        ConfigSource::Defaults => {
            tracing::debug!("no config file found, using built-in defaults");
            Ok(ScannerConfig::default())
        }
    }
}
