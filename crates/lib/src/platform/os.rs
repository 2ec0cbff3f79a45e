use std::fmt;

/// Operating system of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  /// Any other system, named as `std::env::consts::OS` reports it.
  Other(&'static str),
}

impl Os {
  pub fn current() -> Self {
    Self::from_std(std::env::consts::OS)
  }

  pub fn from_std(os: &'static str) -> Self {
    match os {
      "linux" => Self::Linux,
      "macos" => Self::MacOs,
      "windows" => Self::Windows,
      other => Self::Other(other),
    }
  }

  /// Lowercase identifier; macOS is reported as `darwin`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
      Self::Other(name) => name,
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
