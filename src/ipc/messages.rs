//! Message types exchanged with hosted content over the shell socket
//!
//! Closed sets of tagged variants so the lifecycle and migration protocols are
//! handled exhaustively. Notifications are fire-and-forget; requests always
//! carry a correlation id answered by exactly one response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::lifecycle::InstallScreen;
use crate::store::SetupConfig;
use crate::types::{Direction, SurfaceId};

/// Tagged error result for virtual filesystem operations
///
/// Every provider operation catches failures locally and returns one of these
/// over the wire; none propagate as process faults.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FsError {
    #[error("path does not exist: {path}")]
    NotFound { path: String },

    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    #[error("protected path: {path}")]
    Protected { path: String },

    #[error("refusing to open {path}: {reason}")]
    PlatformUnsupported { path: String, reason: String },

    #[error("filesystem operation failed: {message}")]
    Io { message: String },

    #[error("configuration record unreadable: {message}")]
    ConfigUnreadable { message: String },
}

impl FsError {
    pub fn io(e: impl std::fmt::Display) -> Self {
        FsError::Io {
            message: e.to_string(),
        }
    }
}

/// Directory listing entry produced by the virtual filesystem provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    pub name: String,
    pub is_directory: bool,
    pub path: String,
    /// File size in bytes; zero for directories and synthetic drive entries
    pub size: u64,
    /// Modified time as Unix milliseconds; absent for drives and stat failures
    pub modified_ms: Option<u64>,
}

/// Minimal metadata answer for `StatPath`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub name: String,
    pub is_directory: bool,
    pub path: String,
}

/// Well-known directory paths resolved from the host OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialPaths {
    /// Virtual-root sentinel, not a real directory
    pub root: String,
    pub home: String,
    pub downloads: String,
    pub documents: String,
    pub desktop: String,
}

/// Fire-and-forget messages from hosted content (no response is produced)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellNotification {
    /// Hosted content verified credentials; unlocks the session everywhere
    LoginSuccess,

    /// An application instance was dragged past a screen edge
    MigrateApp {
        app_id: String,
        state: Value,
        direction: Direction,
    },
}

/// Request messages from hosted content, each answered by one [`ShellResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellRequest {
    GetAuthState,
    CompleteInstaller { setup: SetupConfig },
    GetInstallerConfig,
    ResetInstallation,
    ListDirectory { path: String },
    CreateFolder { path: String },
    CreateFile { path: String, content: String },
    Delete { path: String },
    StatPath { path: String },
    OpenPath { path: String },
    GetSpecialPaths,
}

/// Responses to [`ShellRequest`] messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellResponse {
    AuthState { unlocked: bool },
    Ack,
    InstallerConfig { setup: Option<SetupConfig> },
    Listing { path: String, entries: Vec<FsEntry> },
    PathInfo { info: Option<PathInfo> },
    SpecialPaths { paths: SpecialPaths },
    Error { error: FsError },
}

/// Notifications pushed from the orchestrator to a surface's hosted content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// Session transitioned locked → unlocked (broadcast to every surface)
    UnlockSession,

    /// An application instance is migrating onto this surface
    IncomingApp {
        app_id: String,
        state: Value,
        edge: Direction,
    },

    /// The instance this surface migrated away was accepted; discard the local
    /// copy
    MigrationAck { app_id: String },

    /// Installer screen transition for the setup surface
    ShowScreen { screen: InstallScreen },
}

/// Frames sent by hosted content to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Connection handshake binding this stream to a surface's hosted content.
    /// The surface id is handed to the content host out-of-band at launch.
    Hello { surface: SurfaceId },
    Notify { notification: ShellNotification },
    Request { id: u64, request: ShellRequest },
}

/// Frames sent by the orchestrator to hosted content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    Response { id: u64, response: ShellResponse },
    Event { event: SurfaceEvent },
}
