//! Shared helpers for integration tests.

use std::path::Path;

use laze_lib::build::{BuildConfig, BuildError, BuildOutcome, Builder};
use laze_lib::value::Value;
use tempfile::TempDir;

/// A source tree in a temporary directory.
pub struct TestTree {
  pub temp: TempDir,
}

impl TestTree {
  pub fn new(files: &[(&str, &str)]) -> Self {
    let tree = Self {
      temp: TempDir::new().unwrap(),
    };
    for (path, content) in files {
      tree.write_file(path, content);
    }
    tree
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the tree root, creating parent directories.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn config(&self) -> BuildConfig {
    BuildConfig::new(self.root())
  }

  pub fn builder(&self) -> Builder {
    Builder::new(self.config()).unwrap()
  }

  pub async fn build(&self, label: &str) -> Result<BuildOutcome, BuildError> {
    self.builder().build(label).await
  }

  /// Build `label` and return its value, panicking on any failure.
  pub async fn value(&self, label: &str) -> Value {
    let outcome = self.build(label).await.unwrap_or_else(|e| panic!("{}: {}", label, e));
    match outcome.result {
      Ok(value) => value,
      Err(e) => panic!("{} failed: {}", label, e),
    }
  }
}

pub fn string(value: &str) -> Value {
  Value::String(value.to_string())
}
