use std::fmt;

/// CPU architecture of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  /// Any other architecture, named as `std::env::consts::ARCH` reports it.
  Other(&'static str),
}

impl Arch {
  pub fn current() -> Self {
    Self::from_std(std::env::consts::ARCH)
  }

  pub fn from_std(arch: &'static str) -> Self {
    match arch {
      "x86_64" => Self::X86_64,
      "aarch64" => Self::Aarch64,
      other => Self::Other(other),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::Other(name) => name,
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_arch_passes_through() {
    assert_eq!(Arch::from_std("riscv64").as_str(), "riscv64");
    assert_eq!(Arch::from_std("aarch64"), Arch::Aarch64);
  }
}
