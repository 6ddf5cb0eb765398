//! Directory → mounted archive names index

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<OverlayDirs> = LazyLock::new(OverlayDirs::default);

/// Which archive files are mounted in which real directory
///
/// Keys are case-folded directory keys and values are case-folded archive
/// file names. A real-directory listing consults this to report mounted
/// archives as pseudo-directories. Clones share the same index.
#[derive(Debug, Clone, Default)]
pub struct OverlayDirs {
    inner: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
}

impl OverlayDirs {
    /// Fresh, unshared index
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide index
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Record `name` as mounted under `base`
    pub fn register(&self, base: &str, name: &str) {
        self.inner
            .lock()
            .entry(base.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Remove one registration of `name` under `base`
    pub fn unregister(&self, base: &str, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(names) = inner.get_mut(base) {
            if let Some(i) = names.iter().position(|n| n == name) {
                names.remove(i);
            }
            if names.is_empty() {
                inner.remove(base);
            }
        }
    }

    /// Archive names mounted under `base`, without duplicates
    pub fn names(&self, base: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut unique: Vec<String> = Vec::new();
        for name in inner.get(base).into_iter().flatten() {
            if !unique.contains(name) {
                unique.push(name.clone());
            }
        }
        unique
    }

    /// Whether `name` is mounted under `base`
    pub fn contains(&self, base: &str, name: &str) -> bool {
        self.inner
            .lock()
            .get(base)
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
