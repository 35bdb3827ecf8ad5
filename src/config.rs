use std::env;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Whether the process runs with an interactive editor or as a headless
/// function deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Interactive,
    Headless,
}

impl RunMode {
    /// Headless when `FLOWFN_ENV=production`, interactive otherwise.
    pub fn from_env() -> Self {
        match env::var("FLOWFN_ENV") {
            Ok(v) if v == "production" => RunMode::Headless,
            _ => RunMode::Interactive,
        }
    }

    pub fn is_headless(self) -> bool {
        self == RunMode::Headless
    }
}

/// Permissions for installing extra modules at runtime.
///
/// `auto_install` reinstalls palette modules found missing compared to the
/// previous run, which matters in container environments where the local
/// module folder resets on restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalModules {
    pub auto_install: bool,
    pub allow_install: bool,
    pub allow_upload: bool,
}

/// The immutable configuration snapshot the runtime host is started with,
/// composed once at process start.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostSettings {
    pub mode: RunMode,
    pub credential_secret: Option<String>,
    pub debug_use_colors: bool,
    pub disable_editor: bool,
    pub external_modules: ExternalModules,
    pub flow_file: PathBuf,
    pub flow_file_pretty: bool,
    pub function_external_modules: bool,
    /// Mount point of the admin editor; `None` disables it.
    pub http_admin_root: Option<String>,
    /// Mount point of flow-defined HTTP endpoints; `None` disables them.
    pub http_node_root: Option<String>,
    pub read_only: bool,
    pub ui_host: Option<String>,
    pub ui_port: u16,
    pub user_dir: PathBuf,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl HostSettings {
    /// Compose the settings record for `mode`, then apply caller overrides
    /// field by field.
    pub fn compose(mode: RunMode, overrides: SettingsOverrides) -> Self {
        let headless = mode.is_headless();
        let base = Self {
            mode,
            credential_secret: env::var("FLOWFN_CREDENTIAL_SECRET").ok(),
            debug_use_colors: !headless,
            disable_editor: headless,
            external_modules: ExternalModules {
                auto_install: !headless,
                allow_install: !headless,
                allow_upload: !headless,
            },
            flow_file: PathBuf::from("flows.json"),
            flow_file_pretty: true,
            function_external_modules: true,
            http_admin_root: (!headless).then(|| "/".to_string()),
            http_node_root: (!headless).then(|| "/".to_string()),
            read_only: headless,
            ui_host: None,
            ui_port: env::var("FLOWFN_UI_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1880),
            user_dir: PathBuf::from("flowfn"),
            log_level: "info".to_string(),
            log_dir: None,
        };
        overrides.apply(base)
    }
}

/// Caller overrides for [`HostSettings::compose`]; every field is optional
/// and wins over the composed default when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SettingsOverrides {
    pub credential_secret: Option<String>,
    pub debug_use_colors: Option<bool>,
    pub disable_editor: Option<bool>,
    pub external_modules: Option<ExternalModules>,
    pub flow_file: Option<PathBuf>,
    pub flow_file_pretty: Option<bool>,
    pub function_external_modules: Option<bool>,
    pub http_admin_root: Option<Option<String>>,
    pub http_node_root: Option<Option<String>>,
    pub read_only: Option<bool>,
    pub ui_host: Option<String>,
    pub ui_port: Option<u16>,
    pub user_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl SettingsOverrides {
    fn apply(self, mut base: HostSettings) -> HostSettings {
        if let Some(v) = self.credential_secret {
            base.credential_secret = Some(v);
        }
        if let Some(v) = self.debug_use_colors {
            base.debug_use_colors = v;
        }
        if let Some(v) = self.disable_editor {
            base.disable_editor = v;
        }
        if let Some(v) = self.external_modules {
            base.external_modules = v;
        }
        if let Some(v) = self.flow_file {
            base.flow_file = v;
        }
        if let Some(v) = self.flow_file_pretty {
            base.flow_file_pretty = v;
        }
        if let Some(v) = self.function_external_modules {
            base.function_external_modules = v;
        }
        if let Some(v) = self.http_admin_root {
            base.http_admin_root = v;
        }
        if let Some(v) = self.http_node_root {
            base.http_node_root = v;
        }
        if let Some(v) = self.read_only {
            base.read_only = v;
        }
        if let Some(v) = self.ui_host {
            base.ui_host = Some(v);
        }
        if let Some(v) = self.ui_port {
            base.ui_port = v;
        }
        if let Some(v) = self.user_dir {
            base.user_dir = v;
        }
        if let Some(v) = self.log_level {
            base.log_level = v;
        }
        if let Some(v) = self.log_dir {
            base.log_dir = Some(v);
        }
        base
    }
}

/// Load a `.env` file into the process environment before composing
/// settings.
pub fn load_env(env_file: &Path) {
    match dotenvy::from_path(env_file) {
        Ok(()) => info!("Loaded .env from {}", env_file.display()),
        Err(e) => error!("could not load .env from {}: {}", env_file.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn test_headless_defaults_lock_the_deployment_down() {
        let settings = HostSettings::compose(RunMode::Headless, SettingsOverrides::default());
        assert!(settings.disable_editor);
        assert!(settings.read_only);
        assert!(!settings.debug_use_colors);
        assert!(!settings.external_modules.auto_install);
        assert!(!settings.external_modules.allow_install);
        assert!(!settings.external_modules.allow_upload);
        assert_eq!(settings.http_admin_root, None);
        assert_eq!(settings.http_node_root, None);
        assert!(settings.function_external_modules);
    }

    #[test]
    fn test_interactive_defaults_enable_the_editor() {
        let settings = HostSettings::compose(RunMode::Interactive, SettingsOverrides::default());
        assert!(!settings.disable_editor);
        assert!(!settings.read_only);
        assert!(settings.debug_use_colors);
        assert!(settings.external_modules.allow_install);
        assert_eq!(settings.http_admin_root.as_deref(), Some("/"));
        assert_eq!(settings.http_node_root.as_deref(), Some("/"));
        assert_eq!(settings.flow_file, PathBuf::from("flows.json"));
    }

    #[test]
    fn test_overrides_win_over_composed_defaults() {
        let overrides = SettingsOverrides {
            disable_editor: Some(true),
            ui_port: Some(9090),
            flow_file: Some(PathBuf::from("custom.json")),
            http_node_root: Some(None),
            ..Default::default()
        };
        let settings = HostSettings::compose(RunMode::Interactive, overrides);
        assert!(settings.disable_editor);
        assert_eq!(settings.ui_port, 9090);
        assert_eq!(settings.flow_file, PathBuf::from("custom.json"));
        assert_eq!(settings.http_node_root, None);
        // untouched fields keep their mode defaults
        assert!(!settings.read_only);
    }

    #[test]
    fn test_load_env_reads_file_into_process() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        write(&env_path, "FLOWFN_TEST_MARKER=present\n").unwrap();

        load_env(&env_path);
        assert_eq!(
            env::var("FLOWFN_TEST_MARKER").ok(),
            Some("present".to_string())
        );
        unsafe { env::remove_var("FLOWFN_TEST_MARKER") };
    }

    #[test]
    fn test_load_env_surfaces_missing_and_malformed_files() {
        // missing file: error path, not a panic
        load_env(Path::new("/nonexistent/.env"));

        // malformed file: the parse failure is reported, not swallowed
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        write(&env_path, "NOT A VALID LINE\n").unwrap();
        load_env(&env_path);
    }

    #[test]
    fn test_run_mode_from_env() {
        let backup = env::var("FLOWFN_ENV").ok();

        unsafe { env::set_var("FLOWFN_ENV", "production") };
        assert_eq!(RunMode::from_env(), RunMode::Headless);

        unsafe { env::set_var("FLOWFN_ENV", "development") };
        assert_eq!(RunMode::from_env(), RunMode::Interactive);

        unsafe { env::remove_var("FLOWFN_ENV") };
        assert_eq!(RunMode::from_env(), RunMode::Interactive);

        if let Some(v) = backup {
            unsafe { env::set_var("FLOWFN_ENV", v) };
        }
    }
}
