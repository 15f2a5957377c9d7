//! Audio file discovery and category-id inference.
//!
//! Files named like `p<source_id>_<recording_id>.<ext>` carry a category id
//! (the source id). The catalog is built once at startup and is read-only
//! afterwards, so workers share it through an `Arc`.

use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No audio files with extensions {extensions:?} found in '{root}'")]
    EmptyCorpus {
        root: PathBuf,
        extensions: Vec<String>,
    },
    #[error("Category conditioning is enabled, but '{path}' does not match p<id>_<id>")]
    MissingCategoryId { path: PathBuf },
    #[error("No file carries a category id")]
    NoCategoryIds,
    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// A discovered audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    pub category_id: Option<u32>,
}

impl AudioFile {
    pub fn new(path: PathBuf) -> Self {
        let category_id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_category_id);
        Self { path, category_id }
    }
}

/// Range of category ids present in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryCardinality {
    pub min_id: u32,
    pub max_id: u32,
}

impl CategoryCardinality {
    /// Size of a zero-indexed embedding table covering every id.
    ///
    /// Ids below `min_id` stay unused so that ids in file names map to table
    /// rows unchanged.
    pub fn table_size(&self) -> u32 {
        self.max_id + 1
    }
}

fn category_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"p(\d+)_(\d+)").expect("category pattern must compile"))
}

/// Extract the source id from a file name, if it contains `p<digits>_<digits>`.
pub fn parse_category_id(filename: &str) -> Option<u32> {
    let caps = category_pattern().captures(filename)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Immutable set of audio files.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
    files: Vec<AudioFile>,
}

impl FileCatalog {
    /// Recursively list files under `root` whose extension is in `extensions`
    /// (case-insensitive). The list is sorted by path.
    pub fn discover<P: AsRef<Path>>(root: P, extensions: &[String]) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let mut paths = Vec::new();
        for ext in extensions {
            let pattern = format!("{}/**/*.{}", escaped_root, Pattern::escape(ext));
            for entry in glob::glob_with(&pattern, options)? {
                match entry {
                    Ok(path) if path.is_file() => paths.push(path),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("skipping unreadable path: {}", e),
                }
            }
        }
        paths.sort();
        paths.dedup();

        if paths.is_empty() {
            return Err(CatalogError::EmptyCorpus {
                root,
                extensions: extensions.to_vec(),
            });
        }

        let files = paths.into_iter().map(AudioFile::new).collect();
        Ok(Self { root, files })
    }

    /// Build a catalog from an explicit file list.
    pub fn from_files(root: PathBuf, files: Vec<AudioFile>) -> Result<Self, CatalogError> {
        if files.is_empty() {
            return Err(CatalogError::EmptyCorpus {
                root,
                extensions: Vec::new(),
            });
        }
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[AudioFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AudioFile> {
        self.files.get(index)
    }

    /// Fails on the first file without a category id.
    pub fn validate_for_conditioning(&self) -> Result<(), CatalogError> {
        match self.files.iter().find(|f| f.category_id.is_none()) {
            Some(file) => Err(CatalogError::MissingCategoryId {
                path: file.path.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Smallest and largest category id over all files that carry one.
    pub fn cardinality(&self) -> Result<CategoryCardinality, CatalogError> {
        let mut ids = self.files.iter().filter_map(|f| f.category_id);
        let first = ids.next().ok_or(CatalogError::NoCategoryIds)?;
        let (min_id, max_id) = ids.fold((first, first), |(lo, hi), id| (lo.min(id), hi.max(id)));
        Ok(CategoryCardinality { min_id, max_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"").unwrap();
        path
    }

    fn files_with_ids(ids: &[Option<u32>]) -> FileCatalog {
        let files = ids
            .iter()
            .enumerate()
            .map(|(i, &category_id)| AudioFile {
                path: PathBuf::from(format!("f{i}.wav")),
                category_id,
            })
            .collect();
        FileCatalog::from_files(PathBuf::from("."), files).unwrap()
    }

    #[test]
    fn test_parse_category_id() {
        assert_eq!(parse_category_id("p7_3.wav"), Some(7));
        assert_eq!(parse_category_id("recording.wav"), None);
        assert_eq!(parse_category_id("take2_p225_001.flac"), Some(225));
        assert_eq!(parse_category_id("p12.wav"), None);
        assert_eq!(parse_category_id("p99999999999_1.wav"), None);
    }

    #[test]
    fn test_id_comes_from_file_name_only() {
        let file = AudioFile::new(PathBuf::from("/data/p1_1/recording.wav"));
        assert_eq!(file.category_id, None);

        let file = AudioFile::new(PathBuf::from("/data/p1_1/p4_2.wav"));
        assert_eq!(file.category_id, Some(4));
    }

    #[test]
    fn test_cardinality() {
        let catalog = files_with_ids(&[Some(5), Some(2), Some(9)]);
        let card = catalog.cardinality().unwrap();
        assert_eq!(card, CategoryCardinality { min_id: 2, max_id: 9 });
        assert_eq!(card.table_size(), 10);
    }

    #[test]
    fn test_cardinality_ignores_missing_ids() {
        let catalog = files_with_ids(&[None, Some(3), None]);
        assert_eq!(
            catalog.cardinality().unwrap(),
            CategoryCardinality { min_id: 3, max_id: 3 }
        );

        let catalog = files_with_ids(&[None, None]);
        assert!(matches!(catalog.cardinality(), Err(CatalogError::NoCategoryIds)));
    }

    #[test]
    fn test_validate_for_conditioning() {
        assert!(files_with_ids(&[Some(1), Some(2)]).validate_for_conditioning().is_ok());

        let err = files_with_ids(&[Some(1), None]).validate_for_conditioning().unwrap_err();
        match err {
            CatalogError::MissingCategoryId { path } => assert_eq!(path, PathBuf::from("f1.wav")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discover_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "p1_1.wav");
        let b = touch(dir.path(), "nested/deeper/p3_2.WAV");
        let c = touch(dir.path(), "nested/other.wav");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "nested/p4_4.flac");

        let catalog = FileCatalog::discover(dir.path(), &["wav".to_string()]).unwrap();
        let mut expected = vec![a, b, c];
        expected.sort();
        let found: Vec<_> = catalog.files().iter().map(|f| f.path.clone()).collect();
        assert_eq!(found, expected);

        let ids: Vec<_> = catalog.files().iter().map(|f| f.category_id).collect();
        assert_eq!(ids.iter().filter(|id| id.is_some()).count(), 2);
    }

    #[test]
    fn test_discover_multiple_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "p1_1.wav");
        touch(dir.path(), "p2_1.flac");
        touch(dir.path(), "p3_1.mp3");

        let exts = vec!["wav".to_string(), "flac".to_string()];
        let catalog = FileCatalog::discover(dir.path(), &exts).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_discover_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");

        let err = FileCatalog::discover(dir.path(), &["wav".to_string()]).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyCorpus { .. }));

        let err = FileCatalog::discover(dir.path().join("missing"), &["wav".to_string()]).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyCorpus { .. }));
    }
}
