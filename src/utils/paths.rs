//! Output path generation

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension used for every recorded or exported movie.
pub const MOVIE_EXTENSION: &str = "mov";

/// Build a fresh movie path inside `dir`.
///
/// Names come from a random UUID; collisions are not checked for.
pub fn unique_movie_path(dir: &Path) -> PathBuf {
    let name = Uuid::new_v4().to_string().to_uppercase();
    dir.join(format!("{}.{}", name, MOVIE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_paths_differ() {
        let dir = Path::new("/tmp/squarecam");
        let a = unique_movie_path(dir);
        let b = unique_movie_path(dir);
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("mov"));
    }
}
