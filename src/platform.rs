use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Other(String),
}

impl Os {
    pub fn from_rust_os(os: &str) -> Self {
        match os {
            "linux" => Os::Linux,
            "macos" | "darwin" => Os::Darwin,
            "windows" | "win32" => Os::Windows,
            other => Os::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    Other(String),
}

impl Arch {
    pub fn from_rust_arch(arch: &str) -> Self {
        match arch {
            "x86_64" | "amd64" | "x64" => Arch::Amd64,
            "aarch64" | "arm64" => Arch::Arm64,
            other => Arch::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveExt {
    TarGz,
    Zip,
}

impl ArchiveExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveExt::TarGz => "tar.gz",
            ArchiveExt::Zip => "zip",
        }
    }

    /// Format actually used for extraction, decided from the asset's own name
    /// rather than from the platform.
    pub fn from_file_name(name: &str) -> Self {
        if name.to_lowercase().ends_with(".zip") {
            ArchiveExt::Zip
        } else {
            ArchiveExt::TarGz
        }
    }
}

/// The host platform as release assets spell it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    pub os: Os,
    pub arch: Arch,
    pub archive_ext: ArchiveExt,
}

impl PlatformTarget {
    pub fn new(os: Os, arch: Arch) -> Self {
        let archive_ext = if os == Os::Windows {
            ArchiveExt::Zip
        } else {
            ArchiveExt::TarGz
        };
        PlatformTarget {
            os,
            arch,
            archive_ext,
        }
    }

    pub fn current() -> Self {
        let target = Self::new(
            Os::from_rust_os(std::env::consts::OS),
            Arch::from_rust_arch(std::env::consts::ARCH),
        );
        tracing::debug!("Detected platform {}", target);
        target
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// Name of an executable file on this platform.
    pub fn executable_file_name(&self, name: &str) -> String {
        if self.is_windows() {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}
