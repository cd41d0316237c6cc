use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory for job files, firmware images and clone output.
/// Removed when dropped.
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path for `relative`, without creating anything.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        self.create_file_bytes(relative_path, content.as_bytes())
    }

    pub fn create_file_bytes(&self, relative_path: &str, content: &[u8]) -> PathBuf {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dirs");
        }
        fs::write(&path, content).expect("write test file");
        path
    }

    /// Firmware image of `size` bytes with a recognisable repeating pattern.
    pub fn firmware(&self, name: &str, size: usize) -> PathBuf {
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        self.create_file_bytes(name, &content)
    }

    pub fn create_dir(&self, relative_path: &str) -> PathBuf {
        let path = self.path(relative_path);
        fs::create_dir_all(&path).expect("create test dir");
        path
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("read test file")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
