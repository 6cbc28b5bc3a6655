//! Typed paths into the VGL workspace and the ODM project layout.
//!
//! The relative layout is an on-disk contract with the containerized stages,
//! so every path is derived here and nowhere else.
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the run manifest written under `output/`.
pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";

/// Convenience wrapper for locating workspace directories.
#[derive(Debug, Clone)]
pub struct VglWorkspace {
    root: PathBuf,
}

impl VglWorkspace {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `query/` directory path.
    pub fn query_dir(&self) -> PathBuf {
        self.root.join("query")
    }

    /// Return the `map/` directory path.
    pub fn map_dir(&self) -> PathBuf {
        self.root.join("map")
    }

    /// Return the `output/` directory path.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Return the `output/stitched/` directory the satellite stage fills.
    pub fn stitched_dir(&self) -> PathBuf {
        self.output_dir().join("stitched")
    }

    /// Return the `output/run_manifest.json` path.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir().join(RUN_MANIFEST_FILE)
    }

    /// Directories that must exist before matching, in creation order.
    pub fn required_dirs(&self) -> [PathBuf; 3] {
        [self.query_dir(), self.map_dir(), self.output_dir()]
    }

    /// Create every required directory. Safe to call repeatedly.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in self.required_dirs() {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Required directories that do not exist yet.
    pub fn missing_dirs(&self) -> Vec<PathBuf> {
        self.required_dirs()
            .into_iter()
            .filter(|dir| !dir.is_dir())
            .collect()
    }
}

/// An ODM project directory supplied by the operator.
#[derive(Debug, Clone)]
pub struct OdmProject {
    root: PathBuf,
}

impl OdmProject {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project name ODM expects: the basename of the project directory.
    pub fn name(&self) -> Option<String> {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    /// Return the `images/` directory with the raw captures.
    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Return the `odm_orthophoto/` directory ODM writes into.
    pub fn orthophoto_dir(&self) -> PathBuf {
        self.root.join("odm_orthophoto")
    }

    /// Return the GeoTIFF ODM must leave behind on success.
    pub fn orthophoto_path(&self) -> PathBuf {
        self.orthophoto_dir().join("odm_orthophoto.tif")
    }

    /// Return the viewable PNG produced by conversion.
    pub fn converted_path(&self) -> PathBuf {
        self.orthophoto_dir().join("odm_orthophoto.png")
    }
}

/// Anchor a path at the current directory without requiring it to exist.
///
/// Container mounts need absolute host paths.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = VglWorkspace::new(temp.path().join("ws"));
        assert_eq!(workspace.missing_dirs().len(), 3);

        workspace.ensure().expect("first ensure");
        workspace.ensure().expect("second ensure");

        assert!(workspace.missing_dirs().is_empty());
        let mut entries: Vec<String> = fs::read_dir(workspace.root())
            .expect("read workspace")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["map", "output", "query"]);
    }

    #[test]
    fn ensure_keeps_existing_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = VglWorkspace::new(temp.path().to_path_buf());
        workspace.ensure().expect("ensure");
        let tile = workspace.map_dir().join("tile.png");
        fs::write(&tile, b"png").expect("write tile");

        workspace.ensure().expect("ensure again");
        assert!(tile.is_file());
    }

    #[test]
    fn odm_project_layout() {
        let project = OdmProject::new(PathBuf::from("/data/survey-7"));
        assert_eq!(project.name().as_deref(), Some("survey-7"));
        assert_eq!(project.images_dir(), PathBuf::from("/data/survey-7/images"));
        assert_eq!(
            project.orthophoto_path(),
            PathBuf::from("/data/survey-7/odm_orthophoto/odm_orthophoto.tif")
        );
    }

    #[test]
    fn absolutize_leaves_absolute_paths() {
        let path = PathBuf::from("/srv/ws");
        assert_eq!(absolutize(&path).expect("absolute"), path);
        assert!(absolutize(Path::new("ws")).expect("relative").is_absolute());
    }
}
