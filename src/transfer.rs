//! Artifact handoff between stages: copying into the workspace.
//!
//! Copies land through a temporary sibling and a rename, so a stage never
//! sees a half-written query image or tile.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Copy `source` into `dest_dir`, keeping its file name. Returns the new path.
pub fn copy_into_dir(source: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;
    let dest = dest_dir.join(file_name);
    publish_file(source, &dest)?;
    Ok(dest)
}

/// Copy every file under `source_root` into `dest_root`, preserving relative paths.
///
/// A missing `source_root` copies nothing and is not an error.
pub fn copy_tree_files(source_root: &Path, dest_root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for file in collect_files_recursive(source_root)? {
        let rel = file
            .strip_prefix(source_root)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let dest = dest_root.join(rel);
        publish_file(&file, &dest)?;
        copied.push(dest);
    }
    Ok(copied)
}

/// All regular files below `root`, sorted. Missing roots yield nothing.
///
/// Symlinked directories are not descended into; symlinks to files are kept.
pub fn collect_files_recursive(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            files.extend(collect_files_recursive(&path)?);
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn publish_file(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");
    let tmp_path = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    if let Err(err) = fs::copy(source, &tmp_path).and_then(|_| fs::rename(&tmp_path, dest)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_into_dir_keeps_name_and_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("drone.jpg");
        fs::write(&source, b"image bytes").expect("write source");
        let query = temp.path().join("ws/query");
        fs::create_dir_all(&query).expect("create query");

        let dest = copy_into_dir(&source, &query).expect("copy");
        assert_eq!(dest, query.join("drone.jpg"));
        assert_eq!(fs::read(&dest).expect("read dest"), b"image bytes");
        assert!(!query.join(".drone.jpg.tmp").exists());
    }

    #[test]
    fn copy_into_dir_overwrites_previous_copy() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("a.png");
        fs::write(&source, b"new").expect("write source");
        let dest_dir = temp.path().join("query");
        fs::create_dir_all(&dest_dir).expect("create dest");
        fs::write(dest_dir.join("a.png"), b"old").expect("write old");

        copy_into_dir(&source, &dest_dir).expect("copy");
        assert_eq!(fs::read(dest_dir.join("a.png")).expect("read"), b"new");
    }

    #[test]
    fn copy_tree_files_preserves_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stitched = temp.path().join("stitched");
        fs::create_dir_all(stitched.join("z18")).expect("create stitched");
        fs::write(stitched.join("overview.png"), b"o").expect("write");
        fs::write(stitched.join("z18/tile_0_0.png"), b"t").expect("write");

        let map = temp.path().join("map");
        let copied = copy_tree_files(&stitched, &map).expect("copy tree");
        assert_eq!(copied.len(), 2);
        assert!(map.join("overview.png").is_file());
        assert!(map.join("z18/tile_0_0.png").is_file());
    }

    #[test]
    fn copy_tree_files_tolerates_missing_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        let copied = copy_tree_files(&temp.path().join("absent"), &temp.path().join("map"))
            .expect("missing source is fine");
        assert!(copied.is_empty());
        assert!(!temp.path().join("map").exists());
    }

    #[test]
    fn copy_into_dir_missing_source_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = copy_into_dir(&temp.path().join("nope.jpg"), temp.path()).expect_err("missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stitched = temp.path().join("stitched");
        fs::create_dir_all(stitched.join("zoom_17")).expect("create tiles dir");
        fs::write(stitched.join("zoom_17").join("tile_0.png"), b"tile").expect("write tile");
        std::os::unix::fs::symlink(&stitched, stitched.join("zoom_17").join("loop"))
            .expect("create loop");

        let files = collect_files_recursive(&stitched).expect("collect");
        assert_eq!(files, [stitched.join("zoom_17").join("tile_0.png")]);
    }
}
