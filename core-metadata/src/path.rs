//! Path normalization for player-reported track locations.

use std::path::{Component, Path, PathBuf};

use crate::error::{MetadataError, Result};

const FILE_SCHEME: &str = "file://";

/// Container format as far as tag dispatch is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// RIFF WAVE, read through the fixed-schema reader
    Wave,
    /// Anything else, read through the generic extractor
    Generic,
}

impl SourceFormat {
    pub fn classify(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave") => {
                SourceFormat::Wave
            }
            _ => SourceFormat::Generic,
        }
    }
}

/// Strip a `file://` scheme and collapse redundant separators and `.`
/// components. No filesystem access.
pub fn lexical_normalize(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    let without_scheme = match trimmed.get(..FILE_SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(FILE_SCHEME) => {
            let rest = &trimmed[FILE_SCHEME.len()..];
            // Percent-encoded URLs decode to plain paths; a bad escape keeps the raw text.
            urlencoding::decode(rest)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| rest.to_string())
        }
        _ => trimmed.to_string(),
    };

    if without_scheme.is_empty() {
        return Err(MetadataError::EmptyPath);
    }

    let normalized: PathBuf = Path::new(&without_scheme)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if normalized.as_os_str().is_empty() {
        return Err(MetadataError::EmptyPath);
    }
    Ok(normalized)
}

/// Normalize and resolve symlinks.
///
/// # Errors
///
/// [`MetadataError::PathNotFound`] when the file does not exist,
/// [`MetadataError::PathIo`] for any other filesystem failure.
pub async fn normalize(raw: &str) -> Result<PathBuf> {
    let path = lexical_normalize(raw)?;

    match tokio::fs::canonicalize(&path).await {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MetadataError::PathNotFound(path))
        }
        Err(source) => Err(MetadataError::PathIo { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_normalize_strips_scheme() {
        let path = lexical_normalize("file:///Music/Low/01%20Words.flac").unwrap();
        assert_eq!(path, PathBuf::from("/Music/Low/01 Words.flac"));
    }

    #[test]
    fn test_lexical_normalize_collapses_separators() {
        let path = lexical_normalize("/Music//Low/./01.flac").unwrap();
        assert_eq!(path, PathBuf::from("/Music/Low/01.flac"));
    }

    #[test]
    fn test_lexical_normalize_rejects_empty() {
        assert!(matches!(lexical_normalize("  "), Err(MetadataError::EmptyPath)));
        assert!(matches!(lexical_normalize("file://"), Err(MetadataError::EmptyPath)));
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(SourceFormat::classify(Path::new("a/b.WAV")), SourceFormat::Wave);
        assert_eq!(SourceFormat::classify(Path::new("a/b.wav")), SourceFormat::Wave);
        assert_eq!(SourceFormat::classify(Path::new("a/b.flac")), SourceFormat::Generic);
        assert_eq!(SourceFormat::classify(Path::new("a/noext")), SourceFormat::Generic);
    }

    #[tokio::test]
    async fn test_normalize_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.flac");

        let err = normalize(missing.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, MetadataError::PathNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_normalize_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.flac");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link.flac");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let url = format!("file://{}", link.display());
        let resolved = normalize(&url).await.unwrap();
        assert_eq!(resolved, std::fs::canonicalize(&target).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_normalize_other_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.flac");
        std::fs::write(&file, b"x").unwrap();

        // A regular file used as a directory is ENOTDIR, not ENOENT.
        let bogus = file.join("child.flac");
        let err = normalize(bogus.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, MetadataError::PathIo { .. }));
    }
}
