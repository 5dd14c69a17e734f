//! Symlink helpers
//!
//! The manager only ever creates links to directories (`in_use`, the alias)
//! and links to files (template blobs); the platform split lives here.

use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
pub(crate) fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// What currently sits at a path, without following symlinks
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Occupant {
    Nothing,
    /// A symlink and its target, resolved against the link's directory
    Link(PathBuf),
    Other,
}

pub(crate) fn occupant(path: &Path) -> io::Result<Occupant> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = std::fs::read_link(path)?;
            let resolved = if target.is_absolute() {
                target
            } else {
                path.parent()
                    .map(|parent| parent.join(&target))
                    .unwrap_or(target)
            };
            Ok(Occupant::Link(resolved))
        }
        Ok(_) => Ok(Occupant::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Occupant::Nothing),
        Err(e) => Err(e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_occupant_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("file"), "x").unwrap();
        symlink_file(Path::new("file"), &dir.join("relative")).unwrap();
        symlink_file(&dir.join("missing"), &dir.join("dangling")).unwrap();

        assert_eq!(occupant(&dir.join("nothing")).unwrap(), Occupant::Nothing);
        assert_eq!(occupant(&dir.join("file")).unwrap(), Occupant::Other);
        assert_eq!(
            occupant(&dir.join("relative")).unwrap(),
            Occupant::Link(dir.join("file"))
        );
        assert_eq!(
            occupant(&dir.join("dangling")).unwrap(),
            Occupant::Link(dir.join("missing"))
        );
    }
}
