//! Installation lifecycle controller
//!
//! Finite state machine driving the one-time setup sequence:
//! `Uninstalled → Installing(boot → logo → license → setup) → Rebooting →
//! Installed`, terminal at `Installed` for the process lifetime. The scripted
//! screen transitions are an explicit list of (delay, timer) entries
//! interpreted by the orchestrator's scheduler, so pending transitions are
//! dropped cleanly if the setup surface disappears instead of firing blind.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::constants::install;
use crate::ipc::messages::SurfaceEvent;
use crate::screens::ScreenTopology;
use crate::store::{SetupConfig, StateStore};
use crate::surface::SurfaceManager;
use crate::types::SurfaceId;

/// Screens of the scripted installer sequence, in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallScreen {
    Boot,
    Logo,
    License,
    Setup,
    Rebooting,
}

/// Lifecycle state within one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Uninstalled,
    Installing(InstallScreen),
    Rebooting,
    Installed,
}

/// Deferred lifecycle work interpreted by the orchestrator's scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTimer {
    ShowScreen(InstallScreen),
    FinishReboot,
}

/// Deadline queue for lifecycle timers
///
/// The orchestrator's event loop sleeps until the next deadline and fires due
/// timers through [`LifecycleController::handle_timer`].
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: Vec<(Instant, LifecycleTimer)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, at: Instant, timer: LifecycleTimer) {
        self.entries.push((at, timer));
    }

    pub fn schedule_in(&mut self, delay: Duration, timer: LifecycleTimer) {
        self.schedule_at(Instant::now() + delay, timer);
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(at, _)| *at).min()
    }

    /// Drop all pending screen transitions; the reboot hand-off stays queued
    pub fn cancel_screen_timers(&mut self) {
        self.entries
            .retain(|(_, timer)| !matches!(timer, LifecycleTimer::ShowScreen(_)));
    }

    /// Remove and return all timers due at `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<LifecycleTimer> {
        let mut due: Vec<(Instant, LifecycleTimer)> = Vec::new();
        self.entries.retain(|&(at, timer)| {
            if at <= now {
                due.push((at, timer));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|&(at, _)| at);
        due.into_iter().map(|(_, timer)| timer).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct LifecycleController {
    store: StateStore,
    phase: InstallPhase,
    setup_surface: Option<SurfaceId>,
    /// The installed hand-off must happen exactly once per process
    handed_off: bool,
}

impl LifecycleController {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            phase: InstallPhase::Uninstalled,
            setup_surface: None,
            handed_off: false,
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Consult the persisted marker and either hand off to the surface
    /// manager directly or begin the scripted installer sequence
    pub fn start(
        &mut self,
        surfaces: &mut SurfaceManager,
        scheduler: &mut Scheduler,
        screens: &dyn ScreenTopology,
    ) -> Result<()> {
        if self.store.is_installed() {
            info!("Install marker present, starting desktop surfaces");
            self.phase = InstallPhase::Installed;
            self.handed_off = true;
            surfaces.startup(&screens.displays()?)?;
            return Ok(());
        }

        info!("No install marker, running installer sequence");
        self.phase = InstallPhase::Installing(InstallScreen::Boot);
        let id = surfaces.create_setup_surface()?;
        self.setup_surface = Some(id);
        surfaces.deliver(
            id,
            SurfaceEvent::ShowScreen {
                screen: InstallScreen::Boot,
            },
        );

        let script = [
            (install::LOGO_DELAY_MS, InstallScreen::Logo),
            (install::LICENSE_DELAY_MS, InstallScreen::License),
            (install::SETUP_DELAY_MS, InstallScreen::Setup),
        ];
        for (delay_ms, screen) in script {
            scheduler.schedule_in(
                Duration::from_millis(delay_ms),
                LifecycleTimer::ShowScreen(screen),
            );
        }
        Ok(())
    }

    /// Fire one due lifecycle timer
    pub fn handle_timer(
        &mut self,
        timer: LifecycleTimer,
        surfaces: &mut SurfaceManager,
        screens: &dyn ScreenTopology,
    ) -> Result<()> {
        match timer {
            LifecycleTimer::ShowScreen(screen) => {
                // Screen transitions only move forward within Installing;
                // one firing late must never drag the phase back out of
                // Rebooting or Installed
                if !matches!(self.phase, InstallPhase::Installing(_)) {
                    warn!(phase = ?self.phase, screen = ?screen, "Screen transition outside installing phase, dropping");
                    return Ok(());
                }
                // The setup surface may have been destroyed while the timer
                // was pending; a stale transition must not touch anything
                let Some(id) = self.setup_surface else {
                    warn!(screen = ?screen, "Setup surface gone, dropping screen transition");
                    return Ok(());
                };
                if !surfaces.contains(id) {
                    warn!(surface = %id, screen = ?screen, "Setup surface destroyed, dropping screen transition");
                    self.setup_surface = None;
                    return Ok(());
                }
                self.phase = InstallPhase::Installing(screen);
                surfaces.deliver(id, SurfaceEvent::ShowScreen { screen });
                info!(screen = ?screen, "Installer screen transition");
            }
            LifecycleTimer::FinishReboot => self.finish(surfaces, screens)?,
        }
        Ok(())
    }

    /// Hosted content finished the interactive setup step
    ///
    /// Persists the setup data best-effort (a write failure is logged, never
    /// fatal), shows the reboot screen and schedules the final hand-off.
    pub fn complete_setup(
        &mut self,
        setup: SetupConfig,
        surfaces: &SurfaceManager,
        scheduler: &mut Scheduler,
    ) {
        if !matches!(self.phase, InstallPhase::Installing(_)) {
            warn!(phase = ?self.phase, "complete_setup outside the installing phase, ignoring");
            return;
        }

        if let Err(e) = self.store.save_setup_config(&setup) {
            warn!(error = %e, "Failed to persist setup configuration, continuing installation");
        }

        // Setup can complete while later screen transitions are still queued
        scheduler.cancel_screen_timers();
        self.phase = InstallPhase::Rebooting;
        if let Some(id) = self.setup_surface {
            surfaces.deliver(
                id,
                SurfaceEvent::ShowScreen {
                    screen: InstallScreen::Rebooting,
                },
            );
        }
        scheduler.schedule_in(
            Duration::from_millis(install::REBOOT_DELAY_MS),
            LifecycleTimer::FinishReboot,
        );
        info!("Setup complete, rebooting into desktop");
    }

    /// Write the marker, tear down the setup surface and start the desktop
    fn finish(
        &mut self,
        surfaces: &mut SurfaceManager,
        screens: &dyn ScreenTopology,
    ) -> Result<()> {
        if self.handed_off {
            warn!("Installed hand-off already performed, ignoring");
            return Ok(());
        }
        self.handed_off = true;

        if let Err(e) = self.store.write_install_marker() {
            warn!(error = %e, "Failed to write install marker, continuing to desktop");
        }
        if let Some(id) = self.setup_surface.take() {
            surfaces.destroy(id);
        }
        self.phase = InstallPhase::Installed;
        surfaces.startup(&screens.displays()?)?;
        info!("Installation finished, desktop surfaces running");
        Ok(())
    }

    /// Delete the persisted marker so a restarted process re-observes
    /// `Uninstalled`; the caller restarts the process
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear_install_marker()?;
        info!("Installation reset, restart pending");
        Ok(())
    }

    /// Persisted setup configuration, absent when missing or unreadable
    pub fn setup_config(&self) -> Option<SetupConfig> {
        self.store.load_setup_config()
    }
}
