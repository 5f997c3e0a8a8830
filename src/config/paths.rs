//! Where phrase-cards keeps its settings and pending audio.
//!
//! | What | Location |
//! |---|---|
//! | `settings.toml` | `<config dir>/phrase-cards/` |
//! | synthesized MP3s | `<local data dir>/phrase-cards/user_files/` |
//!
//! Audio files only live in `user_files/` between synthesis and the card
//! store taking a copy; anything left there is an orphan from a crash.
//!
//! [`AppPaths::rooted`] puts both under one directory, which is what a
//! settings file passed on the command line uses.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "phrase-cards";
const SETTINGS_FILE: &str = "settings.toml";
const AUDIO_DIR: &str = "user_files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Pending audio artifacts.
    pub audio_dir: PathBuf,
}

impl AppPaths {
    /// Platform locations from `dirs`; `.` stands in for a missing one.
    pub fn new() -> Self {
        let platform = |dir: Option<PathBuf>| {
            dir.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
        };
        let config_dir = platform(dirs::config_dir());
        let audio_dir = platform(dirs::data_local_dir()).join(AUDIO_DIR);

        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            config_dir,
            audio_dir,
        }
    }

    /// Settings and audio side by side under `root`.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.to_path_buf(),
            settings_file: root.join(SETTINGS_FILE),
            audio_dir: root.join(AUDIO_DIR),
        }
    }

    /// Layout for an explicit settings file: audio goes next to it.
    pub fn beside(settings_file: impl AsRef<Path>) -> Self {
        let settings_file = settings_file.as_ref();
        let root = settings_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self {
            settings_file: settings_file.to_path_buf(),
            ..Self::rooted(root)
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_layout() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert_eq!(paths.settings_file, paths.config_dir.join("settings.toml"));
        assert!(paths.audio_dir.ends_with("phrase-cards/user_files"));
    }

    #[test]
    fn rooted_keeps_everything_together() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        assert_eq!(paths.settings_file, dir.path().join("settings.toml"));
        assert_eq!(paths.audio_dir, dir.path().join("user_files"));
    }

    #[test]
    fn explicit_settings_file_gets_audio_beside_it() {
        let paths = AppPaths::beside("/srv/cards/german.toml");
        assert_eq!(paths.settings_file, PathBuf::from("/srv/cards/german.toml"));
        assert_eq!(paths.audio_dir, PathBuf::from("/srv/cards/user_files"));

        let bare = AppPaths::beside("german.toml");
        assert_eq!(bare.audio_dir, PathBuf::from("./user_files"));
    }
}
