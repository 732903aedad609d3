use cartwheel_session::config::RawSessionConfig;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `cartwheel.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CliConfig {
    /// Where saves are kept. Defaults to [`default_data_dir`].
    pub storage_dir: Option<PathBuf>,
    /// Disable audio output even when not headless.
    pub mute: bool,
    pub session: RawSessionConfig,
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata)
                .join("cartwheel")
                .join("cartwheel.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("cartwheel").join("cartwheel.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("cartwheel")
            .join("cartwheel.toml");
    }

    PathBuf::from("cartwheel.toml")
}

pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("cartwheel").join("saves");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("cartwheel");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("cartwheel");
    }

    PathBuf::from("saves")
}

/// A missing file yields defaults; a malformed one is reported and ignored.
pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return CliConfig::default(),
    };

    match toml::from_str::<CliConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_from_file(&dir.path().join("absent.toml")),
            CliConfig::default()
        );
    }

    #[test]
    fn session_table_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartwheel.toml");
        std::fs::write(
            &path,
            r#"
storage-dir = "/srv/saves"

[session]
type = "vba-m-gba"
rotation = "270"
flash-size = "131072"
rtc = true
autosave-secs = 30
"#,
        )
        .unwrap();

        let cfg = load_from_file(&path);
        assert_eq!(cfg.storage_dir, Some(PathBuf::from("/srv/saves")));
        assert!(!cfg.mute);
        let session = cfg.session.resolve().unwrap();
        assert_eq!(session.rotation.quadrant(), 3);
        assert_eq!(session.cartridge.flash_size, 131_072);
        assert!(session.cartridge.rtc);
        assert_eq!(
            session.autosave_interval,
            Some(std::time::Duration::from_secs(30))
        );
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartwheel.toml");
        std::fs::write(&path, "session = 5").unwrap();
        assert_eq!(load_from_file(&path), CliConfig::default());
    }
}
