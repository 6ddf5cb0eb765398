//! In-memory directory index
//!
//! Folders live in an arena addressed by [`FolderId`]. Each node owns the
//! names of its children and its file entries; parent links are plain ids, so
//! there are no ownership cycles. The tree is built once by the parser and is
//! read-only afterwards.
//!
//! Every path is normalized before use: backslashes become `/`, letters are
//! lowercased and empty segments are dropped. The root folder has the empty
//! path.

use crate::filter::EntryFilter;
use crate::records::SizeFlags;
use std::collections::{BTreeMap, HashMap};

/// Stable index of a folder inside a [`DirectoryTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(usize);

impl FolderId {
    /// The root folder
    pub const ROOT: Self = Self(0);

    /// Arena index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One file inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// Stored size and compression toggle
    pub size_flags: SizeFlags,
    /// Absolute offset of the payload in the archive file
    pub offset: u64,
}

impl FileEntry {
    /// Create an entry
    pub const fn new(size_flags: SizeFlags, offset: u64) -> Self {
        Self { size_flags, offset }
    }

    /// Stored size in bytes
    pub const fn size(&self) -> u32 {
        self.size_flags.size()
    }

    /// Entry toggles the archive's compression default
    pub const fn compressed(&self) -> bool {
        self.size_flags.compressed()
    }
}

/// A folder node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    name: String,
    path: String,
    parent: Option<FolderId>,
    children: BTreeMap<String, FolderId>,
    files: BTreeMap<String, FileEntry>,
}

impl FolderNode {
    fn new(name: &str, path: String, parent: Option<FolderId>) -> Self {
        Self {
            name: name.to_string(),
            path,
            parent,
            children: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Last path segment, empty for the root
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full normalized path, empty for the root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parent folder, `None` only for the root
    pub fn parent(&self) -> Option<FolderId> {
        self.parent
    }

    /// Child folders by name, sorted
    pub fn children(&self) -> impl Iterator<Item = (&str, FolderId)> {
        self.children.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Files by name, sorted
    pub fn files(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.files.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Look up a file directly in this folder
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    /// Number of files directly in this folder
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Folder tree of one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    nodes: Vec<FolderNode>,
    by_path: HashMap<String, FolderId>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize an archive-relative path
///
/// Backslashes become slashes, letters are lowercased and empty segments
/// (leading, trailing or doubled separators) are removed.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .to_lowercase()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a normalized path on its last `/` into (folder, leaf)
fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

impl DirectoryTree {
    /// Tree holding only the root folder
    pub fn new() -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(String::new(), FolderId::ROOT);
        Self {
            nodes: vec![FolderNode::new("", String::new(), None)],
            by_path,
        }
    }

    /// Return the folder for `name`, creating it and any missing ancestors
    ///
    /// An empty name yields the root.
    pub fn insert_folder(&mut self, name: &str) -> FolderId {
        self.ensure_folder(normalize_path(name))
    }

    fn ensure_folder(&mut self, path: String) -> FolderId {
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }

        let (parent_path, leaf) = split_last(&path);
        let parent = self.ensure_folder(parent_path.to_string());
        let id = FolderId(self.nodes.len());
        let leaf = leaf.to_string();

        self.nodes
            .push(FolderNode::new(&leaf, path.clone(), Some(parent)));
        self.nodes[parent.0].children.insert(leaf, id);
        self.by_path.insert(path, id);
        id
    }

    /// Store a file under `folder`, replacing any entry with the same name
    pub fn insert_file(&mut self, folder: FolderId, name: &str, entry: FileEntry) {
        if let Some(node) = self.nodes.get_mut(folder.0) {
            node.files.insert(name.to_lowercase(), entry);
        }
    }

    /// The root folder
    pub fn root(&self) -> &FolderNode {
        &self.nodes[0]
    }

    /// Folder by id
    pub fn node(&self, id: FolderId) -> Option<&FolderNode> {
        self.nodes.get(id.0)
    }

    /// Folder id for a path
    pub fn folder_id(&self, path: &str) -> Option<FolderId> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    /// Folder for a path
    pub fn folder(&self, path: &str) -> Option<&FolderNode> {
        self.folder_id(path).and_then(|id| self.node(id))
    }

    /// File entry for a path such as `textures/armor/steel.dds`
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        let normalized = normalize_path(path);
        let (folder, leaf) = split_last(&normalized);
        self.by_path
            .get(folder)
            .and_then(|id| self.node(*id))
            .and_then(|node| node.files.get(leaf))
    }

    /// Path names a file
    pub fn has_file(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    /// Path names a folder (the empty path is the root)
    pub fn has_folder(&self, path: &str) -> bool {
        self.folder_id(path).is_some()
    }

    /// Names inside a folder: child folders first, then files
    ///
    /// Missing folders yield an empty list.
    pub fn entry_list(&self, path: &str, filter: &EntryFilter) -> Vec<String> {
        let Some(node) = self.folder(path) else {
            return Vec::new();
        };

        let mut names = Vec::new();
        if filter.includes_dirs() {
            names.extend(node.children.keys().cloned());
        }
        if filter.includes_files() {
            names.extend(
                node.files
                    .keys()
                    .filter(|name| filter.matches_name(name))
                    .cloned(),
            );
        }
        names
    }

    /// The folder itself followed by each ancestor up to the root
    pub fn ancestors(&self, id: FolderId) -> impl Iterator<Item = &FolderNode> {
        std::iter::successors(self.node(id), |node| {
            node.parent.and_then(|parent| self.node(parent))
        })
    }

    /// Number of folders, including the root
    pub fn folder_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of files across all folders
    pub fn file_count(&self) -> usize {
        self.nodes.iter().map(FolderNode::file_count).sum()
    }

    /// Every folder in creation order, root first
    pub fn folders(&self) -> impl Iterator<Item = &FolderNode> {
        self.nodes.iter()
    }

    /// Every file as (full path, entry), ordered by folder creation then name
    pub fn walk_files(&self) -> Vec<(String, FileEntry)> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.files.iter().map(move |(name, entry)| {
                    let path = if node.path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}/{name}", node.path)
                    };
                    (path, *entry)
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(size: u32) -> FileEntry {
        FileEntry::new(SizeFlags::new(size), 0)
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("Textures\\Armor\\Steel"), "textures/armor/steel");
        assert_eq!(normalize_path("/meshes//a/"), "meshes/a");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("\\"), "");
    }

    #[test]
    fn test_insert_folder_creates_ancestors() {
        let mut tree = DirectoryTree::new();
        let steel = tree.insert_folder("textures\\armor\\steel");

        assert!(tree.has_folder("textures"));
        assert!(tree.has_folder("Textures/Armor"));
        assert_eq!(tree.folder_count(), 4);
        assert_eq!(tree.insert_folder("TEXTURES/armor/steel"), steel);
        assert_eq!(tree.folder_count(), 4);
    }

    #[test]
    fn test_empty_folder_is_root() {
        let mut tree = DirectoryTree::new();
        assert_eq!(tree.insert_folder(""), FolderId::ROOT);
        assert!(tree.root().parent().is_none());
    }

    #[test]
    fn test_ancestor_chain() {
        let mut tree = DirectoryTree::new();
        let steel = tree.insert_folder("textures/armor/steel");
        let names: Vec<&str> = tree.ancestors(steel).map(FolderNode::name).collect();
        assert_eq!(names, vec!["steel", "armor", "textures", ""]);
    }

    #[test]
    fn test_file_lookup_and_overwrite() {
        let mut tree = DirectoryTree::new();
        let meshes = tree.insert_folder("meshes");
        tree.insert_file(meshes, "Sword.NIF", entry(10));
        tree.insert_file(meshes, "sword.nif", entry(20));

        assert_eq!(tree.file("MESHES\\sword.nif").map(FileEntry::size), Some(20));
        assert_eq!(tree.file_count(), 1);
        assert!(tree.file("meshes/missing.nif").is_none());
        assert!(tree.file("missing/sword.nif").is_none());
        assert!(!tree.has_file("meshes"));
    }

    #[test]
    fn test_root_files() {
        let mut tree = DirectoryTree::new();
        tree.insert_file(FolderId::ROOT, "readme.txt", entry(5));
        assert!(tree.has_file("readme.txt"));
        assert_eq!(tree.walk_files()[0].0, "readme.txt");
    }

    #[test]
    fn test_entry_list_dirs_then_files() {
        let mut tree = DirectoryTree::new();
        let textures = tree.insert_folder("textures");
        tree.insert_folder("textures/armor");
        tree.insert_file(textures, "b.dds", entry(1));
        tree.insert_file(textures, "a.txt", entry(1));

        assert_eq!(
            tree.entry_list("textures", &EntryFilter::all()),
            vec!["armor", "a.txt", "b.dds"]
        );
        assert_eq!(tree.entry_list("textures", &EntryFilter::dirs()), vec!["armor"]);
        assert_eq!(
            tree.entry_list("textures", &EntryFilter::files().with_name_filter("*.dds")),
            vec!["b.dds"]
        );
        assert!(tree.entry_list("nowhere", &EntryFilter::all()).is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn segment() -> impl Strategy<Value = String> {
            "[A-Za-z0-9_]{1,8}"
        }

        proptest! {
            #[test]
            fn ancestors_reconstruct_segments(segments in prop::collection::vec(segment(), 1..6)) {
                let mut tree = DirectoryTree::new();
                let id = tree.insert_folder(&segments.join("\\"));

                let mut names: Vec<String> = tree
                    .ancestors(id)
                    .map(|node| node.name().to_string())
                    .collect();
                prop_assert_eq!(names.pop(), Some(String::new()));
                names.reverse();

                let expected: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();
                prop_assert_eq!(names, expected);

                let parentless = tree.folders().filter(|n| n.parent().is_none()).count();
                prop_assert_eq!(parentless, 1);
            }

            #[test]
            fn normalize_is_idempotent(path in "[A-Za-z/\\\\]{0,24}") {
                let once = normalize_path(&path);
                prop_assert_eq!(normalize_path(&once), once.clone());
                prop_assert!(!once.contains('\\'));
                prop_assert!(!once.starts_with('/'));
            }
        }
    }
}
