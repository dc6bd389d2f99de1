//! Label map: integer LBPH labels to person names.
//!
//! Persisted as `labels.txt`, one `name:label` line per entry.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("malformed label line {line}: {content:?}")]
    Malformed { line: usize, content: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: BTreeMap<i32, String>,
}

impl LabelMap {
    pub fn insert(&mut self, label: i32, name: impl Into<String>) {
        self.entries.insert(label, name.into());
    }

    pub fn name(&self, label: i32) -> Option<&str> {
        self.entries.get(&label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.entries.iter().map(|(l, n)| (*l, n.as_str()))
    }

    /// Parse `name:label` lines. The label is taken after the last `:` so
    /// names may themselves contain colons.
    pub fn parse(text: &str) -> Result<Self, LabelError> {
        let mut map = LabelMap::default();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || LabelError::Malformed {
                line: i + 1,
                content: raw.to_string(),
            };
            let (name, label) = line.rsplit_once(':').ok_or_else(malformed)?;
            let label: i32 = label.trim().parse().map_err(|_| malformed())?;
            if name.is_empty() {
                return Err(malformed());
            }
            map.insert(label, name);
        }
        Ok(map)
    }

    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(label, name)| format!("{name}:{label}\n"))
            .collect()
    }

    /// Load from disk. A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), LabelError> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let map = LabelMap::parse("alice:1\nbob:2\n\n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.name(1), Some("alice"));
        assert_eq!(map.name(2), Some("bob"));
        assert_eq!(map.name(3), None);
    }

    #[test]
    fn test_parse_name_with_colon() {
        let map = LabelMap::parse("dr: who:4").unwrap();
        assert_eq!(map.name(4), Some("dr: who"));
    }

    #[test]
    fn test_parse_malformed() {
        let err = LabelMap::parse("alice:1\nbob\n").unwrap_err();
        assert!(matches!(err, LabelError::Malformed { line: 2, .. }));
        assert!(LabelMap::parse("carol:x").is_err());
        assert!(LabelMap::parse(":3").is_err());
    }

    #[test]
    fn test_text_format() {
        let mut map = LabelMap::default();
        map.insert(2, "bob");
        map.insert(1, "alice");
        assert_eq!(map.to_text(), "alice:1\nbob:2\n");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = LabelMap::load(&dir.path().join("labels.txt")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        let mut map = LabelMap::default();
        map.insert(1, "alice");
        map.save(&path).unwrap();
        assert_eq!(LabelMap::load(&path).unwrap(), map);
    }
}
