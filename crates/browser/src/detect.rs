//! Chromium detection and install guidance.

use std::path::PathBuf;

use crate::error::BrowserError;

/// Chromium-based executables that speak CDP, searched in `PATH`.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "chrome-browser",
    "msedge",
    "microsoft-edge",
    "microsoft-edge-stable",
    "brave",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const PLATFORM_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const PLATFORM_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_PATHS: &[&str] = &[];

/// Locate a Chromium executable.
///
/// Order: configured path, `CHROME` env var, platform install locations,
/// then `PATH`. Platform locations go before `PATH` because `PATH` may hold
/// stale wrapper scripts.
pub fn detect_browser(custom_path: Option<&str>) -> Result<PathBuf, BrowserError> {
    let configured = custom_path
        .map(PathBuf::from)
        .into_iter()
        .chain(std::env::var_os("CHROME").map(PathBuf::from));
    let platform = PLATFORM_PATHS.iter().map(PathBuf::from);

    if let Some(path) = configured.chain(platform).find(|p| p.exists()) {
        return Ok(path);
    }

    CHROMIUM_EXECUTABLES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| BrowserError::NotFound {
            install_hint: install_instructions(),
        })
}

/// Platform-specific install instructions.
pub fn install_instructions() -> String {
    let instructions = if cfg!(target_os = "macos") {
        "  brew install --cask chromium"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else if cfg!(target_os = "linux") {
        "  Debian/Ubuntu: sudo apt install chromium\n  \
         Fedora:        sudo dnf install chromium\n  \
         Arch:          sudo pacman -S chromium"
    } else {
        "  Download from https://www.chromium.org/getting-involved/download-chromium/"
    };

    format!(
        "Install a Chromium-based browser:\n\n{instructions}\n\n\
         Or point pagewatch at one:\n  \
         [browser]\n  \
         chrome_path = \"/path/to/chromium\"\n\n\
         or set the CHROME environment variable."
    )
}
