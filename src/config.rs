use crate::error::{PplxError, Result};
use chrono::Local;
use pplx_common::Profile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_PROFILE: &str = "OPPD";
const STATE_FILE: &str = "state.json";
const LEGACY_ACTIVE_FILE: &str = "_active.json";
const HOME_ENV: &str = "PPLX_BATCH_HOME";

/// Last-used paths and the active profile, persisted in `config/state.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    #[serde(default = "default_profile_name")]
    pub active_config: String,
    #[serde(default)]
    pub last_existing_folder_path: String,
    #[serde(default)]
    pub last_proposed_folder_path: String,
    #[serde(default)]
    pub excel_file_path: String,
}

fn default_profile_name() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active_config: default_profile_name(),
            last_existing_folder_path: String::new(),
            last_proposed_folder_path: String::new(),
            excel_file_path: String::new(),
        }
    }
}

#[derive(Deserialize)]
struct LegacyActive {
    active_config: Option<String>,
}

/// Session state plus the active profile.
///
/// Loading never fails on a missing or malformed document: defaults are used and
/// a warning is logged. Only filesystem errors on save are reported.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    root: PathBuf,
    state: SessionState,
    profile_name: String,
    profile: Profile,
}

impl ConfigManager {
    /// Load state and a profile from `<root>/config`. `profile` overrides the
    /// remembered active profile.
    pub fn load(root: &Path, profile: Option<&str>) -> Self {
        let config_dir = root.join("config");
        let mut state = Self::read_state(&config_dir);
        Self::migrate_legacy_active(&config_dir, &mut state);

        let requested = profile
            .map(str::to_string)
            .unwrap_or_else(|| state.active_config.clone());
        let profile_name = if is_valid_profile_name(&requested) {
            requested
        } else {
            warn!(profile = %requested, "invalid profile name, using {}", DEFAULT_PROFILE);
            DEFAULT_PROFILE.to_string()
        };
        state.active_config = profile_name.clone();
        let profile = Self::read_profile(&config_dir, &profile_name);

        info!(root = %root.display(), profile = %profile_name, "configuration loaded");
        Self {
            root: root.to_path_buf(),
            state,
            profile_name,
            profile,
        }
    }

    fn read_state(config_dir: &Path) -> SessionState {
        let path = config_dir.join(STATE_FILE);
        if !path.exists() {
            return SessionState::default();
        }
        match std::fs::read_to_string(&path)
            .map_err(PplxError::from)
            .and_then(|s| serde_json::from_str::<SessionState>(&s).map_err(PplxError::from))
        {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "session state unreadable, using defaults");
                SessionState::default()
            }
        }
    }

    /// Fold the old `_active.json` pointer into the state and remove it
    fn migrate_legacy_active(config_dir: &Path, state: &mut SessionState) {
        let path = config_dir.join(LEGACY_ACTIVE_FILE);
        if !path.exists() {
            return;
        }
        let legacy = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<LegacyActive>(&s).ok())
            .and_then(|l| l.active_config)
            .filter(|name| !name.trim().is_empty());
        if let Some(name) = legacy {
            state.active_config = name;
        }
        if let Err(err) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %err, "could not remove legacy active pointer");
        } else {
            debug!("migrated {}", LEGACY_ACTIVE_FILE);
        }
    }

    fn read_profile(config_dir: &Path, name: &str) -> Profile {
        let path = config_dir.join(format!("{}.json", name));
        if !path.exists() {
            debug!(profile = name, "profile file absent, using defaults");
            return Profile::default();
        }
        match Profile::from_file(&path) {
            Ok(profile) => profile,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "profile unreadable, using defaults");
                Profile::default()
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn profile_path(&self) -> PathBuf {
        self.config_dir().join(format!("{}.json", self.profile_name))
    }

    pub fn set_existing_folder(&mut self, path: &Path) {
        self.state.last_existing_folder_path = path.display().to_string();
    }

    pub fn set_proposed_folder(&mut self, path: &Path) {
        self.state.last_proposed_folder_path = path.display().to_string();
    }

    pub fn set_excel_file(&mut self, path: &Path) {
        self.state.excel_file_path = path.display().to_string();
    }

    pub fn save_state(&self) -> Result<()> {
        let dir = self.config_dir();
        std::fs::create_dir_all(&dir)?;
        let content = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(dir.join(STATE_FILE), content)?;
        Ok(())
    }

    pub fn save_profile(&self) -> Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::write(self.profile_path(), self.profile.to_json()?)?;
        Ok(())
    }

    /// Make `name` the active profile and remember it
    pub fn switch_profile(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if !is_valid_profile_name(name) {
            return Err(PplxError::Config(format!("invalid profile name '{}'", name)));
        }
        self.profile = Self::read_profile(&self.config_dir(), name);
        self.profile_name = name.to_string();
        self.state.active_config = name.to_string();
        self.save_state()
    }

    /// Set one profile key from JSON text and save the profile
    pub fn set_profile_value(&mut self, key: &str, raw: &str) -> Result<()> {
        self.profile.set_value(key, raw)?;
        self.save_profile()
    }

    /// Workbook for a processing run: the given path, else the remembered one.
    /// A remembered path is kept even when stale so loading reports it missing.
    pub fn excel_workbook(&self, arg: Option<PathBuf>) -> Result<PathBuf> {
        arg.or_else(|| {
            let remembered = self.state.excel_file_path.trim();
            (!remembered.is_empty()).then(|| PathBuf::from(remembered))
        })
        .ok_or_else(|| PplxError::Config("no Excel workbook given: pass --excel".to_string()))
    }

    /// Profile names in the config dir, sorted. `OPPD` when there are none.
    pub fn available_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.config_dir())
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .filter(|stem| stem != "state" && !stem.starts_with('_'))
            .collect();
        names.sort();
        if names.is_empty() {
            names.push(DEFAULT_PROFILE.to_string());
        }
        names
    }

    /// Default output folder for a processing run:
    /// `<Downloads>/Processed PPLX/<prefix>_O-Calcs_<timestamp>`, or
    /// `<root>/output/<prefix>_O-Calcs_<timestamp>` without a downloads dir.
    pub fn default_output_dir(&self, excel_path: Option<&Path>) -> PathBuf {
        let prefix = excel_path
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .and_then(|s| s.split_whitespace().next().map(str::to_string))
            .unwrap_or_else(|| "Batch".to_string());
        let folder = format!("{}_O-Calcs_{}", prefix, timestamp());
        match dirs::download_dir() {
            Some(downloads) => downloads.join("Processed PPLX").join(folder),
            None => self.root.join("output").join(folder),
        }
    }
}

/// Profile names map to `<config>/<name>.json`: no separators, no hidden or
/// reserved names
fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && !name.starts_with('.')
        && name != "state"
        && !name.contains(['/', '\\', ':'])
}

/// Timestamp used in output folder and change-log names
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Project root: `PPLX_BATCH_HOME`, else the executable's directory when it has
/// a `config/` folder, else the source tree, else the executable's directory.
pub fn project_root() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    if let Some(dir) = &exe_dir {
        if dir.join("config").is_dir() {
            return dir.clone();
        }
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.is_dir() {
        return manifest_dir;
    }

    exe_dir.unwrap_or_else(|| PathBuf::from("."))
}
