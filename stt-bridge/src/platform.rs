//! Platform resolution
//!
//! Maps the running OS and CPU onto the identifier of a prebuilt native
//! artifact. The decision itself is a pure function of a [`PlatformDescriptor`]
//! so every mapping can be exercised without the matching hardware.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Pseudo-file exposing CPU identification on Linux.
pub const CPU_INFO_PATH: &str = "/proc/cpuinfo";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Unsupported CPU architecture `{arch}` on {os}")]
    UnsupportedArch { os: String, arch: String },

    #[error("Unsupported CPU part: {0}")]
    UnsupportedCpu(String),

    #[error("CPU identification unavailable: {0}")]
    CpuInfoUnavailable(String),
}

/// Operating system family of a prebuilt artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetOs {
    Mac,
    Linux,
    Windows,
    RaspberryPi,
    Jetson,
}

impl TargetOs {
    pub fn name(&self) -> &'static str {
        match self {
            TargetOs::Mac => "mac",
            TargetOs::Linux => "linux",
            TargetOs::Windows => "windows",
            TargetOs::RaspberryPi => "raspberry-pi",
            TargetOs::Jetson => "jetson",
        }
    }

    /// Shared-library file extension used by this family.
    pub fn library_extension(&self) -> &'static str {
        match self {
            TargetOs::Mac => "dylib",
            TargetOs::Windows => "dll",
            TargetOs::Linux | TargetOs::RaspberryPi | TargetOs::Jetson => "so",
        }
    }
}

/// CPU family of a prebuilt artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuFamily {
    X86_64,
    Amd64,
    Arm64,
    CortexA53,
    CortexA53Aarch64,
    CortexA57,
    CortexA57Aarch64,
    CortexA72,
    CortexA72Aarch64,
    CortexA76,
    CortexA76Aarch64,
}

impl CpuFamily {
    pub fn name(&self) -> &'static str {
        match self {
            CpuFamily::X86_64 => "x86_64",
            CpuFamily::Amd64 => "amd64",
            CpuFamily::Arm64 => "arm64",
            CpuFamily::CortexA53 => "cortex-a53",
            CpuFamily::CortexA53Aarch64 => "cortex-a53-aarch64",
            CpuFamily::CortexA57 => "cortex-a57",
            CpuFamily::CortexA57Aarch64 => "cortex-a57-aarch64",
            CpuFamily::CortexA72 => "cortex-a72",
            CpuFamily::CortexA72Aarch64 => "cortex-a72-aarch64",
            CpuFamily::CortexA76 => "cortex-a76",
            CpuFamily::CortexA76Aarch64 => "cortex-a76-aarch64",
        }
    }
}

/// Identifier of one prebuilt library/model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub os: TargetOs,
    pub cpu: CpuFamily,
}

static CURRENT_TARGET: OnceCell<TargetId> = OnceCell::new();

impl TargetId {
    pub fn new(os: TargetOs, cpu: CpuFamily) -> Self {
        Self { os, cpu }
    }

    /// Target of the running process, resolved once and cached.
    pub fn current() -> Result<Self, PlatformError> {
        CURRENT_TARGET
            .get_or_try_init(|| {
                let target = resolve(&PlatformDescriptor::detect()?)?;
                info!("Resolved native target: {}", target);
                Ok(target)
            })
            .copied()
    }

    /// Logical path of this target's shared library inside the asset bundle.
    pub fn library_asset_path(&self) -> String {
        format!(
            "lib/{}/{}/libpv_leopard.{}",
            self.os.name(),
            self.cpu.name(),
            self.os.library_extension()
        )
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.name(), self.cpu.name())
    }
}

/// Environment facts the resolver decides on.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformDescriptor {
    /// OS name in `std::env::consts::OS` vocabulary
    pub os: String,

    /// Architecture in `std::env::consts::ARCH` vocabulary
    pub arch: String,

    /// Contents of the CPU identification pseudo-file, when relevant
    pub cpu_info: Option<String>,
}

impl PlatformDescriptor {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            cpu_info: None,
        }
    }

    pub fn with_cpu_info(mut self, cpu_info: impl Into<String>) -> Self {
        self.cpu_info = Some(cpu_info.into());
        self
    }

    /// Describe the running process.
    ///
    /// CPU identification is only read on Linux ARM, the one case where the
    /// OS/arch pair does not already pick the artifact.
    pub fn detect() -> Result<Self, PlatformError> {
        let descriptor = Self::new(env::consts::OS, env::consts::ARCH);

        if descriptor.os == "linux" && is_arm(&descriptor.arch) {
            let cpu_info = std::fs::read_to_string(CPU_INFO_PATH)
                .map_err(|e| PlatformError::CpuInfoUnavailable(format!("{}: {}", CPU_INFO_PATH, e)))?;
            return Ok(descriptor.with_cpu_info(cpu_info));
        }

        Ok(descriptor)
    }
}

fn is_arm(arch: &str) -> bool {
    matches!(arch, "arm" | "aarch64")
}

/// Map an environment description onto a target identifier.
pub fn resolve(descriptor: &PlatformDescriptor) -> Result<TargetId, PlatformError> {
    let os = descriptor.os.as_str();
    let arch = descriptor.arch.as_str();

    let unsupported_arch = || PlatformError::UnsupportedArch {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    match os {
        "macos" => match arch {
            "x86_64" => Ok(TargetId::new(TargetOs::Mac, CpuFamily::X86_64)),
            "aarch64" => Ok(TargetId::new(TargetOs::Mac, CpuFamily::Arm64)),
            _ => Err(unsupported_arch()),
        },
        "windows" => match arch {
            "x86_64" => Ok(TargetId::new(TargetOs::Windows, CpuFamily::Amd64)),
            "aarch64" => Ok(TargetId::new(TargetOs::Windows, CpuFamily::Arm64)),
            _ => Err(unsupported_arch()),
        },
        "linux" => match arch {
            "x86_64" => Ok(TargetId::new(TargetOs::Linux, CpuFamily::X86_64)),
            "arm" | "aarch64" => {
                let cpu_info = descriptor.cpu_info.as_deref().ok_or_else(|| {
                    PlatformError::CpuInfoUnavailable("no CPU identification provided".to_string())
                })?;
                let part = cpu_part(cpu_info).ok_or_else(|| {
                    PlatformError::CpuInfoUnavailable("no `CPU part` field".to_string())
                })?;
                debug!("CPU part: {}", part);
                board_target(&part, arch == "aarch64")
            }
            _ => Err(unsupported_arch()),
        },
        other => Err(PlatformError::UnsupportedOs(other.to_string())),
    }
}

/// Extract the lowercase `CPU part` value from CPU identification text.
pub fn cpu_part(cpu_info: &str) -> Option<String> {
    cpu_info
        .lines()
        .find(|line| line.trim_start().starts_with("CPU part"))
        .and_then(|line| line.split_whitespace().last())
        .map(|part| part.to_lowercase())
}

fn board_target(part: &str, aarch64: bool) -> Result<TargetId, PlatformError> {
    let (os, cpu32, cpu64) = match part {
        "0xd03" => (TargetOs::RaspberryPi, CpuFamily::CortexA53, CpuFamily::CortexA53Aarch64),
        "0xd07" => (TargetOs::Jetson, CpuFamily::CortexA57, CpuFamily::CortexA57Aarch64),
        "0xd08" => (TargetOs::RaspberryPi, CpuFamily::CortexA72, CpuFamily::CortexA72Aarch64),
        "0xd0b" => (TargetOs::RaspberryPi, CpuFamily::CortexA76, CpuFamily::CortexA76Aarch64),
        other => return Err(PlatformError::UnsupportedCpu(other.to_string())),
    };

    Ok(TargetId::new(os, if aarch64 { cpu64 } else { cpu32 }))
}
