//! Filesystem helpers shared across modules.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{} '{}': {}", op, path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dir_all_creates_nested() {
        let base = std::env::temp_dir().join(format!("printwatch-fs-{}", uuid::Uuid::new_v4()));
        let nested = base.join("a").join("b");

        ensure_dir_all_sync_with_op("creating test directory", &nested).unwrap();
        assert!(nested.is_dir());

        // Existing directories are fine.
        ensure_dir_all_sync_with_op("creating test directory", &nested).unwrap();

        std::fs::remove_dir_all(&base).unwrap();
    }
}
