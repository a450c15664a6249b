use crate::domain::time_window::ClassCalendar;
use crate::infrastructure::config::{
    ensure_default_configs, read_app_settings, read_class_calendar, AppSettings,
};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "timetable.sqlite";

/// Workspace layout plus the configuration read from it.
#[derive(Debug)]
pub struct BootstrapResult {
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: AppSettings,
    pub calendar: ClassCalendar,
}

/// Creates `config/`, `state/` and `logs/`, seeds missing config files and
/// reads them once. The local database is opened by the caller when needed.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = read_app_settings(&config_dir)?;
    let calendar = read_class_calendar(&config_dir)?;

    Ok(BootstrapResult {
        logs_dir,
        database_path: state_dir.join(DATABASE_FILE),
        settings,
        calendar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let root = std::env::temp_dir().join(format!(
            "timetable-bootstrap-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let first = bootstrap_workspace(&root).expect("bootstrap");
        assert!(root.join("config").join("app.json").exists());
        assert!(root.join("config").join("calendar.json").exists());
        assert!(first.logs_dir.is_dir());
        assert!(root.join("state").is_dir());
        assert!(!first.database_path.exists());
        assert_eq!(first.settings.default_section, "CSE A");
        assert_eq!(first.calendar, ClassCalendar::default());

        let second = bootstrap_workspace(&root).expect("bootstrap again");
        assert_eq!(second.database_path, first.database_path);
        assert_eq!(second.settings, first.settings);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn broken_config_fails_bootstrap() {
        let root = std::env::temp_dir().join(format!(
            "timetable-bootstrap-broken-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        fs::create_dir_all(root.join("config")).expect("create config dir");
        fs::write(root.join("config").join("app.json"), r#"{"schema": 9}"#).expect("write app.json");

        assert!(matches!(
            bootstrap_workspace(&root),
            Err(InfraError::InvalidConfig(_))
        ));
        let _ = fs::remove_dir_all(&root);
    }
}
