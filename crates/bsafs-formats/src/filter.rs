//! Entry selection for directory listings
//!
//! Listings can be restricted to folders, files or both, and file names can be
//! matched against shell-style wildcards (`*`, `?` and `[...]` sets). Matching
//! ignores case, like every other archive lookup.

use regex::Regex;

/// Case-insensitive wildcard pattern
///
/// Compiled once into an anchored regex, so matching is linear in the name
/// length.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Option<Regex>,
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

impl NamePattern {
    /// Compile a pattern
    ///
    /// An unterminated `[` is treated as a literal bracket. A pattern the
    /// regex engine rejects matches only its own text.
    pub fn new(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            regex: Regex::new(&wildcard_to_regex(pattern)).ok(),
        }
    }

    /// Pattern text as given
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a whole name
    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => self.source.to_lowercase() == name.to_lowercase(),
        }
    }
}

/// Translate a wildcard into an anchored case-insensitive regex
fn wildcard_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex = String::from("(?is)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' => {
                if let Some((class, consumed)) = parse_set(&chars[i + 1..]) {
                    regex.push_str(&class);
                    i += consumed;
                } else {
                    regex.push_str(r"\[");
                }
            }
            c => regex.push_str(&escape_char(c)),
        }
        i += 1;
    }

    regex.push('$');
    regex
}

fn escape_char(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0; 4]))
}

/// Parse the body of a `[...]` set into a regex class and the chars consumed
fn parse_set(chars: &[char]) -> Option<(String, usize)> {
    let mut i = 0;
    let negated = matches!(chars.first(), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let mut class = String::from(if negated { "[^" } else { "[" });
    let start = i;
    while i < chars.len() {
        let c = chars[i];
        // A leading ']' is a member, not the terminator
        if c == ']' && i > start {
            class.push(']');
            return Some((class, i + 1));
        }
        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|n| *n != ']') {
            let (lo, hi) = (c.min(chars[i + 2]), c.max(chars[i + 2]));
            class.push_str(&escape_char(lo));
            class.push('-');
            class.push_str(&escape_char(hi));
            i += 3;
        } else {
            class.push_str(&escape_char(c));
            i += 1;
        }
    }
    None
}

/// Which entries a listing returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    dirs: bool,
    files: bool,
    name_filters: Vec<NamePattern>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl EntryFilter {
    /// Folders and files
    pub fn all() -> Self {
        Self {
            dirs: true,
            files: true,
            name_filters: Vec::new(),
        }
    }

    /// Folders only
    pub fn dirs() -> Self {
        Self {
            files: false,
            ..Self::all()
        }
    }

    /// Files only
    pub fn files() -> Self {
        Self {
            dirs: false,
            ..Self::all()
        }
    }

    /// Add a wildcard that file names may match
    ///
    /// With several patterns a name needs to match any one of them. Folder
    /// names are never filtered by pattern.
    pub fn with_name_filter(mut self, pattern: &str) -> Self {
        self.name_filters.push(NamePattern::new(pattern));
        self
    }

    /// This filter restricted to its folder selection
    pub fn dirs_part(&self) -> Self {
        Self {
            dirs: self.dirs,
            files: false,
            name_filters: Vec::new(),
        }
    }

    /// This filter restricted to its file selection, patterns kept
    pub fn files_part(&self) -> Self {
        Self {
            dirs: false,
            files: self.files,
            name_filters: self.name_filters.clone(),
        }
    }

    /// Folders are listed
    pub fn includes_dirs(&self) -> bool {
        self.dirs
    }

    /// Files are listed
    pub fn includes_files(&self) -> bool {
        self.files
    }

    /// Compiled name patterns
    pub fn name_filters(&self) -> &[NamePattern] {
        &self.name_filters
    }

    /// Name passes the wildcard patterns (always true without patterns)
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_filters.is_empty() || self.name_filters.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_question() {
        let pattern = NamePattern::new("*.dds");
        assert!(pattern.matches("sword.dds"));
        assert!(pattern.matches("SWORD.DDS"));
        assert!(pattern.matches(".dds"));
        assert!(!pattern.matches("sword.nif"));

        let pattern = NamePattern::new("sword_?.nif");
        assert!(pattern.matches("sword_a.nif"));
        assert!(!pattern.matches("sword_.nif"));
        assert!(!pattern.matches("sword_ab.nif"));
    }

    #[test]
    fn test_sets() {
        let pattern = NamePattern::new("lod[0-2].nif");
        assert!(pattern.matches("lod0.nif"));
        assert!(pattern.matches("LOD2.nif"));
        assert!(!pattern.matches("lod3.nif"));

        let negated = NamePattern::new("[!a]*");
        assert!(negated.matches("bow.nif"));
        assert!(!negated.matches("axe.nif"));

        let literal = NamePattern::new("[oops");
        assert!(literal.matches("[oops"));

        let members = NamePattern::new("[]a.]x");
        assert!(members.matches("]x"));
        assert!(members.matches(".x"));
        assert!(!members.matches("bx"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let pattern = NamePattern::new("a+b(1).{x}$");
        assert!(pattern.matches("A+B(1).{X}$"));
        assert!(!pattern.matches("aab(1).{x}$"));
        assert!(NamePattern::new("c:\\meshes\\*").matches("C:\\Meshes\\sword.nif"));
    }

    #[test]
    fn test_long_names_and_many_stars() {
        let long = format!("{}.dds", "x".repeat(250_000));
        assert!(NamePattern::new("*.dds").matches(&long));
        assert!(!NamePattern::new("*.nif").matches(&long));

        let starry = NamePattern::new("*a*a*a*a*a*a*a*a*b");
        assert!(!starry.matches(&"a".repeat(4_000)));
        assert!(starry.matches(&format!("{}b", "a".repeat(4_000))));
    }

    #[test]
    fn test_filter_selection() {
        let filter = EntryFilter::files()
            .with_name_filter("*.nif")
            .with_name_filter("*.kf");
        assert!(!filter.includes_dirs());
        assert!(filter.includes_files());
        assert!(filter.matches_name("idle.kf"));
        assert!(!filter.matches_name("idle.dds"));
        assert!(EntryFilter::dirs().matches_name("anything"));
    }

    #[test]
    fn test_split_parts() {
        let filter = EntryFilter::all().with_name_filter("*.nif");
        let dirs = filter.dirs_part();
        assert!(dirs.includes_dirs() && !dirs.includes_files());
        assert!(dirs.name_filters().is_empty());

        let files = filter.files_part();
        assert!(!files.includes_dirs() && files.includes_files());
        assert_eq!(files.name_filters().len(), 1);

        let none = EntryFilter::dirs().files_part();
        assert!(!none.includes_dirs() && !none.includes_files());
    }
}
