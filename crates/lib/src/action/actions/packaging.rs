//! Tarball assembly.

use std::fs::{self, File};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};
use tracing::{debug, info};

use super::{Actions, TarOpts};
use crate::action::ActionError;
use crate::label;
use crate::value::FileInfo;

/// Write a gzip-compressed tarball of `opts.files`.
///
/// Entries get a fixed mode and a zero modification time so the archive does not depend on the
/// umask or clock of the machine producing it.
pub(super) fn write_tar(actions: &Actions, opts: &TarOpts) -> Result<FileInfo, ActionError> {
  let out = actions.resolve(&opts.name);
  let io_err = |e: std::io::Error| ActionError::io(&opts.name, &e);

  if let Some(parent) = out.parent() {
    fs::create_dir_all(parent).map_err(io_err)?;
  }

  info!(archive = %out.display(), files = opts.files.len(), "writing tarball");
  let file = File::create(&out).map_err(io_err)?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

  for name in &opts.files {
    if actions.cancel_token().is_cancelled() {
      return Err(ActionError::Cancelled);
    }

    let src = actions.resolve(name);
    let mut input = File::open(&src).map_err(|e| ActionError::io(name, &e))?;
    let meta = input.metadata().map_err(|e| ActionError::io(name, &e))?;
    if meta.is_dir() {
      return Err(ActionError::InvalidArgument(format!("cannot add directory {} to tarball", name)));
    }

    let entry = entry_name(name, opts.strip_prefix.as_deref(), opts.package_dir.as_deref());
    debug!(file = %name, entry = %entry, "adding tar entry");

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(meta.len());
    header.set_mode(opts.mode);
    header.set_mtime(0);
    builder
      .append_data(&mut header, &entry, &mut input)
      .map_err(|e| ActionError::io(name, &e))?;
  }

  let encoder = builder.into_inner().map_err(io_err)?;
  encoder.finish().map_err(io_err)?;

  let meta = fs::metadata(&out).map_err(io_err)?;
  Ok(FileInfo::from_metadata(&opts.name, &out, &meta))
}

/// Archive path for `name`: strip the prefix, prepend the package directory, keep it relative.
fn entry_name(name: &str, strip_prefix: Option<&str>, package_dir: Option<&str>) -> String {
  let stripped = match strip_prefix {
    Some(prefix) if !prefix.is_empty() => name.strip_prefix(prefix).unwrap_or(name),
    _ => name,
  };
  let joined = match package_dir {
    Some(dir) => label::join(dir, stripped.trim_start_matches('/')),
    None => label::clean(stripped),
  };
  joined.trim_start_matches('/').to_string()
}
