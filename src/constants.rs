//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Persistent state locations
pub mod config {
    /// Subdirectory under the platform data dir holding persisted records
    pub const APP_DIR: &str = "coredesk";

    /// Installation-complete marker file (existence is the authoritative bit)
    pub const INSTALL_MARKER: &str = "installed.json";

    /// Setup-configuration record written by the installer's setup step
    pub const SETUP_CONFIG: &str = "setup.json";
}

/// Installer sequence timings and setup-surface geometry
pub mod install {
    /// Boot screen → logo screen delay (milliseconds)
    pub const LOGO_DELAY_MS: u64 = 4_000;

    /// Boot screen → license screen delay (milliseconds)
    pub const LICENSE_DELAY_MS: u64 = 8_000;

    /// Boot screen → interactive setup screen delay (milliseconds)
    pub const SETUP_DELAY_MS: u64 = 12_000;

    /// Delay between the reboot screen and the hand-off to the desktop (milliseconds)
    pub const REBOOT_DELAY_MS: u64 = 3_500;

    /// Fixed setup-surface width (not bound to any display)
    pub const SETUP_WIDTH: u32 = 1_100;

    /// Fixed setup-surface height
    pub const SETUP_HEIGHT: u32 = 700;
}

/// Cross-display migration constants
pub mod migration {
    /// Offset applied to the cursor position toward the drag direction so the
    /// probe point lands on the adjacent display rather than the current one
    pub const CURSOR_OFFSET: i32 = 50;
}

/// Virtual filesystem constants
pub mod vfs {
    /// Sentinel path representing the synthetic drives/volumes root
    pub const VIRTUAL_ROOT: &str = "__ROOT__";

    /// Entries whose name starts with this marker are excluded from listings
    pub const HIDDEN_PREFIX: char = '.';

    /// Extensions refused by `open_path` when the host is not Windows
    pub const WINDOWS_EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "msi"];
}

/// IPC transport constants
pub mod ipc {
    /// Maximum message size (10 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

    /// Socket file path relative to the runtime dir
    pub const SOCKET_FILE: &str = "coredesk/shell.sock";
}
