//! Platform tags
//!
//! Generation-3 manifests name platforms as `<os>-<arch>` (`win-x64`,
//! `linux-arm64`). Older generations used Go's GOOS/GOARCH pair.

use super::MigrationError;

/// Map a GOOS/GOARCH pair to a platform tag.
///
/// A missing GOARCH yields an architecture wildcard (`win-*`). Values outside
/// the known table are rejected.
pub fn from_go(goos: &str, goarch: Option<&str>) -> Result<String, MigrationError> {
    let unsupported = || MigrationError::UnsupportedPlatform {
        goos: goos.to_string(),
        goarch: goarch.map(str::to_string),
    };

    let os = match goos {
        "windows" => "win",
        "darwin" => "osx",
        "linux" => "linux",
        "ios" => "ios",
        "android" => "android",
        _ => return Err(unsupported()),
    };
    let arch = match goarch {
        None => "*",
        Some("amd64") => "x64",
        Some("386") => "x86",
        Some("arm64") => "arm64",
        Some("arm") => "arm",
        Some("loong64") => "loongarch64",
        Some(_) => return Err(unsupported()),
    };
    Ok(format!("{os}-{arch}"))
}

/// Platform tag of the machine running this process.
pub fn host_platform() -> String {
    let os = match std::env::consts::OS {
        "windows" => "win",
        "macos" => "osx",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "x86",
        "aarch64" => "arm64",
        "loongarch64" => "loongarch64",
        other => other,
    };
    format!("{os}-{arch}")
}
