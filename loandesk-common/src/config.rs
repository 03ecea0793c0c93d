//! Root folder resolution and filesystem layout

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no CLI argument is given
pub const ROOT_FOLDER_ENV: &str = "LOANDESK_ROOT_FOLDER";

/// Filesystem layout under the resolved root folder.
///
/// The root folder holds everything the service persists: the `loandesk.db`
/// SQLite database and the `objects/` directory of uploaded document bytes,
/// addressed by object key.
#[derive(Debug, Clone)]
pub struct RootLayout {
    root: PathBuf,
}

impl RootLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.root.join("loandesk.db")
    }

    /// Directory holding stored object bytes
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Create the root folder and object store directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.objects_dir())?;
        Ok(())
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. LOANDESK_ROOT_FOLDER environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(get_default_root_folder())
}

/// Get the configuration file path for the platform, if one exists
fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/loandesk/config.toml first, then /etc/loandesk/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("loandesk").join("config.toml"));
        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/loandesk/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("loandesk").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/loandesk (or /var/lib/loandesk for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("loandesk"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/loandesk"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/loandesk
        dirs::data_dir()
            .map(|d| d.join("loandesk"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/loandesk"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\loandesk
        dirs::data_local_dir()
            .map(|d| d.join("loandesk"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\loandesk"))
    } else {
        PathBuf::from("./loandesk_data")
    }
}

// ============================================================================
// Tests
// ============================================================================
