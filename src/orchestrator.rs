//! Single-threaded orchestration loop
//!
//! All orchestration logic - lifecycle transitions, unlock broadcasts,
//! migration resolution, filesystem requests - runs as short-lived handlers on
//! one control thread, fed by an mpsc channel that IPC reader threads forward
//! into. Handlers run to completion without preemption; filesystem calls are
//! synchronous from the handler, an accepted stall tradeoff. The loop sleeps
//! until the next scheduler deadline so installer timers fire without
//! dedicated timer threads.

use anyhow::Result;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;
use tracing::info;

use crate::ipc::messages::{
    FsError, ServerFrame, ShellNotification, ShellRequest, ShellResponse,
};
use crate::lifecycle::{LifecycleController, Scheduler};
use crate::migration;
use crate::screens::ScreenTopology;
use crate::store::StateStore;
use crate::surface::{ContentLink, SurfaceHost, SurfaceManager};
use crate::types::SurfaceId;
use crate::vfs::Vfs;

/// Inbound work for the control thread
pub enum OrchestratorEvent {
    /// A content process completed its handshake for `surface`
    Attach {
        surface: SurfaceId,
        link: Box<dyn ContentLink>,
    },
    Notify {
        surface: SurfaceId,
        notification: ShellNotification,
    },
    Request {
        surface: SurfaceId,
        id: u64,
        request: ShellRequest,
    },
    Disconnected {
        surface: SurfaceId,
    },
}

impl std::fmt::Debug for OrchestratorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorEvent::Attach { surface, .. } => f
                .debug_struct("Attach")
                .field("surface", surface)
                .finish_non_exhaustive(),
            OrchestratorEvent::Notify {
                surface,
                notification,
            } => f
                .debug_struct("Notify")
                .field("surface", surface)
                .field("notification", notification)
                .finish(),
            OrchestratorEvent::Request {
                surface,
                id,
                request,
            } => f
                .debug_struct("Request")
                .field("surface", surface)
                .field("id", id)
                .field("request", request)
                .finish(),
            OrchestratorEvent::Disconnected { surface } => f
                .debug_struct("Disconnected")
                .field("surface", surface)
                .finish(),
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Event channel closed; process is done
    Shutdown,
    /// Installation was reset; the caller restarts the whole process
    Restart,
}

pub struct Orchestrator {
    lifecycle: LifecycleController,
    surfaces: SurfaceManager,
    scheduler: Scheduler,
    screens: Box<dyn ScreenTopology>,
    vfs: Vfs,
    restart_requested: bool,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        screens: Box<dyn ScreenTopology>,
        host: Box<dyn SurfaceHost>,
        vfs: Vfs,
    ) -> Self {
        Self {
            lifecycle: LifecycleController::new(store),
            surfaces: SurfaceManager::new(host),
            scheduler: Scheduler::new(),
            screens,
            vfs,
            restart_requested: false,
        }
    }

    /// Consult the install marker and bring up either the installer or the
    /// desktop surfaces
    pub fn start(&mut self) -> Result<()> {
        self.lifecycle
            .start(&mut self.surfaces, &mut self.scheduler, self.screens.as_ref())
    }

    /// Run until the channel closes or a reset demands a process restart
    pub fn run(&mut self, events: &Receiver<OrchestratorEvent>) -> Result<LoopOutcome> {
        loop {
            self.fire_due_timers()?;
            let event = match self.scheduler.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match events.recv_timeout(timeout) {
                        Ok(event) => event,
                        // Deadline reached; timers fire at the top of the loop
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => return Ok(LoopOutcome::Shutdown),
                    }
                }
                None => match events.recv() {
                    Ok(event) => event,
                    Err(_) => return Ok(LoopOutcome::Shutdown),
                },
            };
            self.handle_event(event)?;
            if self.restart_requested {
                info!("Restart requested, leaving event loop");
                return Ok(LoopOutcome::Restart);
            }
        }
    }

    fn fire_due_timers(&mut self) -> Result<()> {
        for timer in self.scheduler.pop_due(Instant::now()) {
            self.lifecycle
                .handle_timer(timer, &mut self.surfaces, self.screens.as_ref())?;
        }
        Ok(())
    }

    /// Dispatch one inbound event to completion
    pub fn handle_event(&mut self, event: OrchestratorEvent) -> Result<()> {
        match event {
            OrchestratorEvent::Attach { surface, link } => {
                self.surfaces.attach_content(surface, link);
            }
            OrchestratorEvent::Disconnected { surface } => {
                self.surfaces.detach_content(surface);
            }
            OrchestratorEvent::Notify {
                surface,
                notification,
            } => self.handle_notification(surface, notification),
            OrchestratorEvent::Request {
                surface,
                id,
                request,
            } => {
                let response = self.handle_request(request);
                self.surfaces
                    .send_frame(surface, &ServerFrame::Response { id, response });
            }
        }
        Ok(())
    }

    fn handle_notification(&mut self, surface: SurfaceId, notification: ShellNotification) {
        match notification {
            ShellNotification::LoginSuccess => self.surfaces.notify_login_success(),
            ShellNotification::MigrateApp {
                app_id,
                state,
                direction,
            } => {
                migration::migrate(
                    app_id,
                    state,
                    direction,
                    surface,
                    self.screens.as_ref(),
                    &self.surfaces,
                );
            }
        }
    }

    fn handle_request(&mut self, request: ShellRequest) -> ShellResponse {
        match request {
            ShellRequest::GetAuthState => ShellResponse::AuthState {
                unlocked: self.surfaces.is_unlocked(),
            },
            ShellRequest::CompleteInstaller { setup } => {
                self.lifecycle
                    .complete_setup(setup, &self.surfaces, &mut self.scheduler);
                ShellResponse::Ack
            }
            ShellRequest::GetInstallerConfig => ShellResponse::InstallerConfig {
                setup: self.lifecycle.setup_config(),
            },
            ShellRequest::ResetInstallation => match self.lifecycle.reset() {
                Ok(()) => {
                    self.restart_requested = true;
                    ShellResponse::Ack
                }
                Err(e) => ShellResponse::Error {
                    error: FsError::io(e),
                },
            },
            ShellRequest::ListDirectory { path } => match self.vfs.list_directory(&path) {
                Ok(entries) => ShellResponse::Listing { path, entries },
                Err(error) => ShellResponse::Error { error },
            },
            ShellRequest::CreateFolder { path } => ack_or_error(self.vfs.create_folder(&path)),
            ShellRequest::CreateFile { path, content } => {
                ack_or_error(self.vfs.create_file(&path, &content))
            }
            ShellRequest::Delete { path } => ack_or_error(self.vfs.delete(&path)),
            ShellRequest::StatPath { path } => ShellResponse::PathInfo {
                info: self.vfs.stat_path(&path),
            },
            ShellRequest::OpenPath { path } => ack_or_error(self.vfs.open_path(&path)),
            ShellRequest::GetSpecialPaths => ShellResponse::SpecialPaths {
                paths: self.vfs.special_paths(),
            },
        }
    }
}

fn ack_or_error(result: Result<(), FsError>) -> ShellResponse {
    match result {
        Ok(()) => ShellResponse::Ack,
        Err(error) => ShellResponse::Error { error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::SurfaceEvent;
    use crate::surface::testing::{FakeHost, FakeTopology};
    use crate::types::{Bounds, Direction, Display, Point};
    use serde_json::json;
    use std::sync::mpsc::{channel, Receiver};

    fn topology(origins: &[(i32, i32)], cursor: Point) -> Box<FakeTopology> {
        Box::new(FakeTopology {
            displays: origins
                .iter()
                .map(|&(x, y)| Display {
                    bounds: Bounds::new(x, y, 1920, 1080),
                })
                .collect(),
            cursor,
        })
    }

    fn installed_orchestrator(
        origins: &[(i32, i32)],
        cursor: Point,
    ) -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("coredesk"));
        store.write_install_marker().unwrap();
        let vfs = Vfs::with_parts(
            Box::new(crate::vfs::drives::MountedVolumes),
            dir.path().to_path_buf(),
        );
        let mut orchestrator = Orchestrator::new(
            store,
            topology(origins, cursor),
            Box::new(FakeHost::default()),
            vfs,
        );
        orchestrator.start().unwrap();
        (dir, orchestrator)
    }

    fn attach(orchestrator: &mut Orchestrator, surface: SurfaceId) -> Receiver<ServerFrame> {
        let (tx, rx) = channel();
        orchestrator
            .handle_event(OrchestratorEvent::Attach {
                surface,
                link: Box::new(tx),
            })
            .unwrap();
        rx
    }

    fn response_of(rx: &Receiver<ServerFrame>) -> ShellResponse {
        match rx.try_recv().unwrap() {
            ServerFrame::Response { response, .. } => response,
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[test]
    fn test_auth_state_is_shared_across_surfaces() {
        let (_dir, mut orchestrator) =
            installed_orchestrator(&[(0, 0), (1920, 0)], Point::new(0, 0));
        let ids = orchestrator.surfaces.ids();
        let rx_a = attach(&mut orchestrator, ids[0]);
        let rx_b = attach(&mut orchestrator, ids[1]);

        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: ids[1],
                id: 1,
                request: ShellRequest::GetAuthState,
            })
            .unwrap();
        assert_eq!(
            response_of(&rx_b),
            ShellResponse::AuthState { unlocked: false }
        );

        // Login from surface A unlocks everywhere
        orchestrator
            .handle_event(OrchestratorEvent::Notify {
                surface: ids[0],
                notification: ShellNotification::LoginSuccess,
            })
            .unwrap();
        for rx in [&rx_a, &rx_b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                ServerFrame::Event {
                    event: SurfaceEvent::UnlockSession
                }
            );
        }

        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: ids[1],
                id: 2,
                request: ShellRequest::GetAuthState,
            })
            .unwrap();
        assert_eq!(
            response_of(&rx_b),
            ShellResponse::AuthState { unlocked: true }
        );
    }

    #[test]
    fn test_migration_notification_performs_two_phase_handoff() {
        let (_dir, mut orchestrator) =
            installed_orchestrator(&[(0, 0), (1920, 0)], Point::new(1900, 500));
        let ids = orchestrator.surfaces.ids();
        let rx_origin = attach(&mut orchestrator, ids[0]);
        let rx_target = attach(&mut orchestrator, ids[1]);

        orchestrator
            .handle_event(OrchestratorEvent::Notify {
                surface: ids[0],
                notification: ShellNotification::MigrateApp {
                    app_id: "browser".to_string(),
                    state: json!({ "tab": 4 }),
                    direction: Direction::Right,
                },
            })
            .unwrap();

        assert_eq!(
            rx_target.try_recv().unwrap(),
            ServerFrame::Event {
                event: SurfaceEvent::IncomingApp {
                    app_id: "browser".to_string(),
                    state: json!({ "tab": 4 }),
                    edge: Direction::Right,
                }
            }
        );
        assert_eq!(
            rx_origin.try_recv().unwrap(),
            ServerFrame::Event {
                event: SurfaceEvent::MigrationAck {
                    app_id: "browser".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_reset_request_acks_and_demands_restart() {
        let (_dir, mut orchestrator) = installed_orchestrator(&[(0, 0)], Point::new(0, 0));
        let ids = orchestrator.surfaces.ids();
        let rx = attach(&mut orchestrator, ids[0]);

        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: ids[0],
                id: 9,
                request: ShellRequest::ResetInstallation,
            })
            .unwrap();
        assert_eq!(response_of(&rx), ShellResponse::Ack);
        assert!(orchestrator.restart_requested);
    }

    #[test]
    fn test_filesystem_errors_surface_as_tagged_results() {
        let (dir, mut orchestrator) = installed_orchestrator(&[(0, 0)], Point::new(0, 0));
        let ids = orchestrator.surfaces.ids();
        let rx = attach(&mut orchestrator, ids[0]);

        let missing = dir.path().join("missing").display().to_string();
        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: ids[0],
                id: 1,
                request: ShellRequest::ListDirectory {
                    path: missing.clone(),
                },
            })
            .unwrap();
        match response_of(&rx) {
            ShellResponse::Error {
                error: FsError::NotFound { path },
            } => assert_eq!(path, missing),
            other => panic!("expected NotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_installer_config_round_trips_through_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("coredesk"));
        let vfs = Vfs::with_parts(
            Box::new(crate::vfs::drives::MountedVolumes),
            dir.path().to_path_buf(),
        );
        let mut orchestrator = Orchestrator::new(
            store,
            topology(&[(0, 0)], Point::new(0, 0)),
            Box::new(FakeHost::default()),
            vfs,
        );
        orchestrator.start().unwrap();
        let setup_surface = orchestrator.surfaces.ids()[0];
        let rx = attach(&mut orchestrator, setup_surface);

        let mut setup = crate::store::SetupConfig::new();
        setup.insert("username".to_string(), json!("alice"));
        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: setup_surface,
                id: 1,
                request: ShellRequest::CompleteInstaller {
                    setup: setup.clone(),
                },
            })
            .unwrap();
        // Reboot screen pushed to the setup surface, then the Ack
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerFrame::Event {
                event: SurfaceEvent::ShowScreen {
                    screen: crate::lifecycle::InstallScreen::Rebooting
                }
            }
        );
        assert_eq!(response_of(&rx), ShellResponse::Ack);

        orchestrator
            .handle_event(OrchestratorEvent::Request {
                surface: setup_surface,
                id: 2,
                request: ShellRequest::GetInstallerConfig,
            })
            .unwrap();
        assert_eq!(
            response_of(&rx),
            ShellResponse::InstallerConfig { setup: Some(setup) }
        );
    }
}
