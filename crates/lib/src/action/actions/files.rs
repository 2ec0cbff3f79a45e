//! File capabilities: stat, write, declare.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::WriteOpts;
use crate::action::ActionError;
use crate::label;
use crate::value::FileInfo;

pub(super) fn stat(path: &Path, name: &str) -> Result<FileInfo, ActionError> {
  let meta = fs::metadata(path).map_err(|e| ActionError::io(name, &e))?;
  Ok(FileInfo::from_metadata(name, path, &meta))
}

pub(super) fn write(path: &Path, opts: &WriteOpts) -> Result<FileInfo, ActionError> {
  debug!(path = %path.display(), bytes = opts.content.len(), "writing file");
  fs::write(path, &opts.content).map_err(|e| ActionError::io(&opts.name, &e))?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(opts.mode)).map_err(|e| ActionError::io(&opts.name, &e))?;
  }

  stat(path, &opts.name)
}

pub(super) fn declare(root: &Path, parts: &[String]) -> Result<String, ActionError> {
  if parts.is_empty() {
    return Err(ActionError::InvalidArgument("declare requires at least one path element".to_string()));
  }

  let joined = parts.iter().fold(String::new(), |acc, part| label::join(&acc, part));
  let path = if joined.starts_with('/') {
    Path::new(&joined).to_path_buf()
  } else {
    root.join(&joined)
  };
  let path = std::path::absolute(&path).map_err(|e| ActionError::io(&joined, &e))?;

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| ActionError::io(parent.display().to_string(), &e))?;
  }

  Ok(path.to_string_lossy().into_owned())
}
