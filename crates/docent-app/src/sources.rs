//! Reads text files from disk into source documents.

use std::path::{Path, PathBuf};

use docent_core::error::{DocentError, Result};
use docent_core::types::SourceDocument;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Load every given file, and every `.txt`/`.md` file below every given
/// directory, in sorted path order.
///
/// Files named explicitly are read whatever their extension.
pub fn load_sources(paths: &[PathBuf]) -> Result<Vec<SourceDocument>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_dir(path, &mut files)?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(DocentError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file or directory: {}", path.display()),
            )));
        }
    }
    files.sort();
    files.dedup();

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(&file)?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        documents.push(
            SourceDocument::new(file.to_string_lossy().to_string(), text).with_metadata("file_name", name),
        );
    }
    tracing::debug!(documents = documents.len(), "Sources loaded");
    Ok(documents)
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(&path, files)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
        {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_walk_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("image.png"), "skip me").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.md"), "third").unwrap();

        let documents = load_sources(&[dir.path().to_path_buf()]).unwrap();
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(documents[0].metadata["file_name"], "a.txt");
    }

    #[test]
    fn test_explicit_file_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.rst");
        std::fs::write(&file, "restructured").unwrap();

        let documents = load_sources(&[file.clone(), file]).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "restructured");
    }

    #[test]
    fn test_missing_path() {
        let err = load_sources(&[PathBuf::from("/definitely/not/here.md")]).unwrap_err();
        assert!(matches!(err, DocentError::Io(_)));
    }
}
