//! Surface manager
//!
//! Tracks one exclusive full-screen surface per physical display (plus the
//! single non-display-bound setup surface while installing) and owns the
//! session-unlock flag and its broadcast channel. Surfaces are registered in
//! insertion order and matched to displays by bounds origin.

use anyhow::Result;
use tracing::{info, warn};

use crate::constants::install;
use crate::ipc::messages::{ServerFrame, SurfaceEvent};
use crate::types::{Bounds, Display, Point, SurfaceId};

/// Creates and destroys the host windows backing surfaces
///
/// The production implementation is the X11 backend; tests substitute a fake.
pub trait SurfaceHost {
    fn create_surface(&self, bounds: Bounds) -> Result<u32>;
    fn destroy_surface(&self, window: u32) -> Result<()>;
}

/// Outbound channel to a surface's hosted content
///
/// Attached when the content process connects over the shell socket; tests
/// attach an in-memory channel instead.
pub trait ContentLink: Send {
    fn send(&self, frame: &ServerFrame) -> Result<()>;
}

impl ContentLink for std::sync::mpsc::Sender<ServerFrame> {
    fn send(&self, frame: &ServerFrame) -> Result<()> {
        std::sync::mpsc::Sender::send(self, frame.clone())
            .map_err(|_| anyhow::anyhow!("content receiver dropped"))
    }
}

/// A full-screen visual host bound to one display (or the setup surface)
pub struct Surface {
    pub id: SurfaceId,
    pub bounds: Bounds,
    /// Host window handle; absent only for surfaces whose host creation failed
    window: Option<u32>,
    /// Hosted content attaches after the surface exists
    link: Option<Box<dyn ContentLink>>,
}

pub struct SurfaceManager {
    host: Box<dyn SurfaceHost>,
    surfaces: Vec<Surface>,
    unlocked: bool,
    started: bool,
    next_id: u32,
}

impl SurfaceManager {
    pub fn new(host: Box<dyn SurfaceHost>) -> Self {
        Self {
            host,
            surfaces: Vec::new(),
            unlocked: false,
            started: false,
            next_id: 1,
        }
    }

    /// Create one full-screen surface per enumerated display
    ///
    /// Invoked at most once per process lifetime - either directly at startup
    /// when already installed, or once after installation completes. A second
    /// invocation is refused so displays are never double-covered.
    pub fn startup(&mut self, displays: &[Display]) -> Result<()> {
        if self.started {
            warn!("Surface manager startup invoked twice, ignoring");
            return Ok(());
        }
        self.started = true;

        for monitor in displays {
            let id = self.register(monitor.bounds)?;
            info!(
                surface = %id,
                x = monitor.bounds.x,
                y = monitor.bounds.y,
                width = monitor.bounds.width,
                height = monitor.bounds.height,
                "Created display surface"
            );
        }
        Ok(())
    }

    /// Create the single non-display-bound surface hosting the setup sequence
    pub fn create_setup_surface(&mut self) -> Result<SurfaceId> {
        let bounds = Bounds::new(100, 100, install::SETUP_WIDTH, install::SETUP_HEIGHT);
        let id = self.register(bounds)?;
        info!(surface = %id, "Created setup surface");
        Ok(id)
    }

    fn register(&mut self, bounds: Bounds) -> Result<SurfaceId> {
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        // A surface without a host window still participates in the protocol;
        // the creation failure is reported once and not retried
        let window = match self.host.create_surface(bounds) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(surface = %id, error = %e, "Surface host window creation failed");
                None
            }
        };
        self.surfaces.push(Surface {
            id,
            bounds,
            window,
            link: None,
        });
        Ok(id)
    }

    /// Destroy a surface and its host window, detaching any content link
    pub fn destroy(&mut self, id: SurfaceId) {
        let Some(pos) = self.surfaces.iter().position(|s| s.id == id) else {
            warn!(surface = %id, "Destroy requested for unknown surface");
            return;
        };
        let surface = self.surfaces.remove(pos);
        if let Some(window) = surface.window {
            if let Err(e) = self.host.destroy_surface(window) {
                warn!(surface = %id, error = %e, "Failed to destroy surface window");
            }
        }
        info!(surface = %id, "Destroyed surface");
    }

    /// Bind a connected content process to its surface
    pub fn attach_content(&mut self, id: SurfaceId, link: Box<dyn ContentLink>) {
        match self.surfaces.iter_mut().find(|s| s.id == id) {
            Some(surface) => {
                if surface.link.is_some() {
                    warn!(surface = %id, "Replacing existing content link");
                }
                surface.link = Some(link);
                info!(surface = %id, "Hosted content attached");
            }
            None => warn!(surface = %id, "Content attach for unknown surface"),
        }
    }

    pub fn detach_content(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.iter_mut().find(|s| s.id == id) {
            surface.link = None;
            info!(surface = %id, "Hosted content detached");
        }
    }

    /// Send a raw frame to one surface's content (best-effort; a missing or
    /// dead link is logged, never fatal)
    pub fn send_frame(&self, id: SurfaceId, frame: &ServerFrame) {
        let Some(surface) = self.surfaces.iter().find(|s| s.id == id) else {
            warn!(surface = %id, "Frame for unknown surface dropped");
            return;
        };
        match &surface.link {
            Some(link) => {
                if let Err(e) = link.send(frame) {
                    warn!(surface = %id, error = %e, "Failed to deliver frame to content");
                }
            }
            None => warn!(surface = %id, "No content attached, frame dropped"),
        }
    }

    /// Push a notification event to one surface's hosted content
    pub fn deliver(&self, id: SurfaceId, event: SurfaceEvent) {
        self.send_frame(id, &ServerFrame::Event { event });
    }

    /// Session unlock: flip the flag on first login and broadcast the unlock
    /// to every registered surface regardless of which one originated it
    ///
    /// Repeated login notifications re-broadcast harmlessly; the flag never
    /// transitions back to locked within a process lifetime.
    pub fn notify_login_success(&mut self) {
        if !self.unlocked {
            self.unlocked = true;
            info!("Session unlocked");
        }
        for surface in &self.surfaces {
            if let Some(link) = &surface.link {
                if let Err(e) = link.send(&ServerFrame::Event {
                    event: SurfaceEvent::UnlockSession,
                }) {
                    warn!(surface = %surface.id, error = %e, "Unlock broadcast failed");
                }
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Surface whose bounds origin exactly matches `origin`, if any
    pub fn surface_at_origin(&self, origin: Point) -> Option<SurfaceId> {
        self.surfaces
            .iter()
            .find(|s| s.bounds.origin() == origin)
            .map(|s| s.id)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.surfaces.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn ids(&self) -> Vec<SurfaceId> {
        self.surfaces.iter().map(|s| s.id).collect()
    }
}
