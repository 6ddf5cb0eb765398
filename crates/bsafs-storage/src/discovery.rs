//! Locating installed games and their archives
//!
//! Discovery looks at the install directories named by per-title
//! environment variables, at configured search roots and at the usual
//! Steam and retail install locations. Every existing data directory found
//! that way is scanned (non-recursively) for `*.bsa` files that pass
//! [`Archive::can_open`](crate::Archive::can_open).

use crate::archive::{Archive, mount_key};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Roots searched when none are configured
pub const DEFAULT_SEARCH_ROOTS: &[&str] = &[
    "~/.steam/steam/steamapps/common",
    "~/.local/share/Steam/steamapps/common",
    "C:/Program Files (x86)/Steam/steamapps/common",
    "C:/Program Files (x86)/Bethesda Softworks",
    "C:/Program Files/Bethesda Softworks",
];

/// Games whose archives this crate reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameTitle {
    /// Legacy-format archives
    Morrowind,
    /// Version 0x67 archives
    Oblivion,
    /// Version 0x68 archives
    Fallout3,
    /// Version 0x68 archives
    FalloutNewVegas,
}

impl GameTitle {
    /// Every known title
    pub const ALL: [Self; 4] = [
        Self::Morrowind,
        Self::Oblivion,
        Self::Fallout3,
        Self::FalloutNewVegas,
    ];

    /// Human-readable name
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Morrowind => "Morrowind",
            Self::Oblivion => "Oblivion",
            Self::Fallout3 => "Fallout 3",
            Self::FalloutNewVegas => "Fallout: New Vegas",
        }
    }

    /// Environment variable naming the install directory
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Morrowind => "BSAFS_MORROWIND_DIR",
            Self::Oblivion => "BSAFS_OBLIVION_DIR",
            Self::Fallout3 => "BSAFS_FALLOUT3_DIR",
            Self::FalloutNewVegas => "BSAFS_FALLOUTNV_DIR",
        }
    }

    /// Sub-directory of the install directory holding the archives
    pub const fn data_dir(self) -> &'static str {
        match self {
            Self::Morrowind => "Data Files",
            Self::Oblivion | Self::Fallout3 | Self::FalloutNewVegas => "Data",
        }
    }

    /// Install directory names used by the common distributions
    pub const fn install_dir_names(self) -> &'static [&'static str] {
        match self {
            Self::Morrowind => &["Morrowind"],
            Self::Oblivion => &["Oblivion"],
            Self::Fallout3 => &["Fallout 3", "Fallout 3 goty"],
            Self::FalloutNewVegas => &["Fallout New Vegas", "FalloutNV"],
        }
    }

    /// Data directory from this title's environment variable, if set
    pub fn data_dir_from_env(self) -> Option<PathBuf> {
        let install = env::var_os(self.env_var())?;
        Some(PathBuf::from(install).join(self.data_dir()))
    }
}

impl std::fmt::Display for GameTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where to look for archives
#[derive(Debug, Clone)]
pub struct Discovery {
    search_roots: Vec<String>,
    default_roots: bool,
    environment: bool,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            default_roots: true,
            environment: true,
        }
    }
}

impl Discovery {
    /// Search configured roots, the default roots and the environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add search roots; `~` is expanded
    #[must_use]
    pub fn with_search_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Configured search roots, unexpanded
    pub fn search_roots(&self) -> &[String] {
        &self.search_roots
    }

    /// Include [`DEFAULT_SEARCH_ROOTS`]
    #[must_use]
    pub fn with_default_roots(mut self, enabled: bool) -> Self {
        self.default_roots = enabled;
        self
    }

    /// Consult the per-title environment variables
    #[must_use]
    pub fn with_environment(mut self, enabled: bool) -> Self {
        self.environment = enabled;
        self
    }

    /// Existing directories that may hold archives, without duplicates
    ///
    /// Each search root contributes itself and every title's data directory
    /// below each of the title's install directory names.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if self.environment {
            candidates.extend(GameTitle::ALL.iter().filter_map(|t| t.data_dir_from_env()));
        }

        let defaults: &[&str] = if self.default_roots {
            DEFAULT_SEARCH_ROOTS
        } else {
            &[]
        };
        let roots = self
            .search_roots
            .iter()
            .map(String::as_str)
            .chain(defaults.iter().copied());

        for root in roots {
            let root = PathBuf::from(shellexpand::tilde(root).into_owned());
            candidates.push(root.clone());
            for title in GameTitle::ALL {
                for install in title.install_dir_names() {
                    candidates.push(root.join(install).join(title.data_dir()));
                }
            }
        }

        let mut seen = Vec::new();
        candidates.retain(|dir| {
            let key = mount_key(dir);
            if dir.is_dir() && !seen.contains(&key) {
                seen.push(key);
                true
            } else {
                false
            }
        });
        candidates
    }

    /// Openable archives in every candidate directory, sorted
    pub fn archives(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = self
            .candidate_dirs()
            .iter()
            .flat_map(|dir| archives_in(dir))
            .collect();
        found.sort();
        found.dedup();
        debug!("Discovered {} archives", found.len());
        found
    }
}

/// Openable `*.bsa` files directly inside `dir`, sorted
pub fn archives_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut archives: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("bsa"))
        })
        .filter(|path| {
            let ok = Archive::can_open(path);
            if !ok {
                debug!("Skipping {}: not an archive", path.display());
            }
            ok
        })
        .collect();
    archives.sort();
    archives
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use bsafs_test_utils::{LegacyArchiveBuilder, sword_archive, write_archive};
    use pretty_assertions::assert_eq;

    fn isolated(root: &Path) -> Discovery {
        Discovery::new()
            .with_default_roots(false)
            .with_environment(false)
            .with_search_roots([root.to_string_lossy().into_owned()])
    }

    #[test]
    fn test_title_tables() {
        assert_eq!(GameTitle::Morrowind.data_dir(), "Data Files");
        assert_eq!(GameTitle::FalloutNewVegas.data_dir(), "Data");
        assert_eq!(GameTitle::Fallout3.to_string(), "Fallout 3");
        assert!(GameTitle::ALL.iter().all(|t| t.env_var().starts_with("BSAFS_")));
    }

    #[test]
    fn test_archives_in_filters_by_extension_and_magic() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "B.BSA", &sword_archive()).unwrap();
        write_archive(dir.path(), "a.bsa", &LegacyArchiveBuilder::new().file("x\\y.nif", b"y").build())
            .unwrap();
        write_archive(dir.path(), "fake.bsa", b"definitely not").unwrap();
        write_archive(dir.path(), "sword.esp", &sword_archive()).unwrap();

        let names: Vec<String> = archives_in(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["B.BSA", "a.bsa"]);
    }

    #[test]
    fn test_search_root_layouts() {
        let root = tempfile::tempdir().unwrap();
        let morrowind = root.path().join("Morrowind").join("Data Files");
        let oblivion = root.path().join("Oblivion").join("Data");
        fs::create_dir_all(&morrowind).unwrap();
        fs::create_dir_all(&oblivion).unwrap();
        write_archive(&morrowind, "Morrowind.bsa", &LegacyArchiveBuilder::new().file("a\\b.nif", b"b").build())
            .unwrap();
        write_archive(&oblivion, "Oblivion - Meshes.bsa", &sword_archive()).unwrap();
        write_archive(root.path(), "Loose.bsa", &sword_archive()).unwrap();

        let discovery = isolated(root.path());
        assert_eq!(discovery.candidate_dirs().len(), 3);

        let found = discovery.archives();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&morrowind.join("Morrowind.bsa")));
        assert!(found.contains(&oblivion.join("Oblivion - Meshes.bsa")));
        assert!(found.contains(&root.path().join("Loose.bsa")));
    }

    #[test]
    fn test_duplicate_roots_collapse() {
        let root = tempfile::tempdir().unwrap();
        write_archive(root.path(), "one.bsa", &sword_archive()).unwrap();
        let discovery = isolated(root.path()).with_search_roots([root.path().to_string_lossy().into_owned()]);
        assert_eq!(discovery.candidate_dirs().len(), 1);
        assert_eq!(discovery.archives().len(), 1);
    }

    #[test]
    fn test_missing_root_finds_nothing() {
        let root = tempfile::tempdir().unwrap();
        let discovery = isolated(&root.path().join("absent"));
        assert!(discovery.candidate_dirs().is_empty());
        assert!(discovery.archives().is_empty());
    }
}
