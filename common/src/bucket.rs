//! Mapping of file paths to the per-extension directory ("bucket") they are copied into.

/// Bucket used for files whose name carries no extension.
pub const NO_EXTENSION: &str = "no_extension";

/// Name of the first-level directory under the output root that a file is copied into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket(String);

impl Bucket {
    #[must_use]
    pub fn no_extension() -> Self {
        Self(NO_EXTENSION.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_no_extension(&self) -> bool {
        self.0 == NO_EXTENSION
    }
}

impl AsRef<std::path::Path> for Bucket {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classify a path by the lowercased text after the final `.` of its file name.
///
/// Dotfiles (`.gitignore`), names ending in a dot (`name.`) and names without any dot map to
/// [`NO_EXTENSION`]. Only the last segment counts, so `a.tar.GZ` lands in `gz`. Non UTF-8
/// extensions are converted lossily.
#[must_use]
pub fn classify(path: &std::path::Path) -> Bucket {
    match path.extension() {
        Some(ext) if !ext.is_empty() => Bucket(ext.to_string_lossy().to_lowercase()),
        _ => Bucket::no_extension(),
    }
}
