//! Display topology access
//!
//! The orchestrator never talks to X11 directly; it goes through
//! [`ScreenTopology`] so migration resolution and surface startup are testable
//! against a fake topology. The production implementation enumerates RandR
//! monitors and queries the pointer on demand - displays are read fresh at
//! startup and at every migration resolution, never cached.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::{ConnectionExt, CreateWindowAux, WindowClass};
use x11rb::rust_connection::RustConnection;

use crate::surface::SurfaceHost;
use crate::types::{Bounds, Display, Point};

/// Override redirect flag for unmanaged windows (keeps surfaces borderless,
/// non-resizable and non-movable by the window manager)
const OVERRIDE_REDIRECT: u32 = 1;

/// Read access to the host's physical display arrangement
pub trait ScreenTopology {
    /// Enumerate all physical displays (fresh query, no caching)
    fn displays(&self) -> Result<Vec<Display>>;

    /// Current pointer position in global coordinates
    fn cursor(&self) -> Result<Point>;
}

/// Resolve the display whose region is nearest `p`
///
/// A display containing the point wins outright; otherwise the minimal
/// Euclidean distance to the display rect decides, first match winning ties.
pub fn display_nearest_point(displays: &[Display], p: Point) -> Option<Display> {
    if let Some(hit) = displays.iter().find(|d| d.bounds.contains(p)) {
        return Some(*hit);
    }
    displays
        .iter()
        .min_by_key(|d| d.bounds.distance_squared(p))
        .copied()
}

/// X11 backend implementing both the topology queries and the surface host
#[derive(Clone)]
pub struct X11Backend {
    conn: Arc<RustConnection>,
    root: u32,
    root_depth: u8,
    root_visual: u32,
    background: u32,
    screen_bounds: Bounds,
}

impl X11Backend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11")?;
        let screen = &conn.setup().roots[screen_num];
        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "successfully connected to x11"
        );
        Ok(Self {
            root: screen.root,
            root_depth: screen.root_depth,
            root_visual: screen.root_visual,
            background: screen.black_pixel,
            screen_bounds: Bounds::new(
                0,
                0,
                screen.width_in_pixels as u32,
                screen.height_in_pixels as u32,
            ),
            conn: Arc::new(conn),
        })
    }
}

impl ScreenTopology for X11Backend {
    fn displays(&self) -> Result<Vec<Display>> {
        let reply = self
            .conn
            .randr_get_monitors(self.root, true)
            .context("Failed to request RandR monitors")?
            .reply()
            .context("Failed to read RandR monitors reply")?;

        let displays: Vec<Display> = reply
            .monitors
            .iter()
            .map(|m| Display {
                bounds: Bounds::new(m.x as i32, m.y as i32, m.width as u32, m.height as u32),
            })
            .collect();

        // Headless / RandR-less servers report no monitors; fall back to the
        // whole root screen as a single display
        if displays.is_empty() {
            return Ok(vec![Display {
                bounds: self.screen_bounds,
            }]);
        }
        Ok(displays)
    }

    fn cursor(&self) -> Result<Point> {
        let reply = self
            .conn
            .query_pointer(self.root)
            .context("Failed to query pointer")?
            .reply()
            .context("Failed to read pointer reply")?;
        Ok(Point::new(reply.root_x as i32, reply.root_y as i32))
    }
}

impl SurfaceHost for X11Backend {
    fn create_surface(&self, bounds: Bounds) -> Result<u32> {
        let window = self
            .conn
            .generate_id()
            .context("Failed to generate X11 window ID")?;
        self.conn
            .create_window(
                self.root_depth,
                window,
                self.root,
                bounds.x as i16,
                bounds.y as i16,
                bounds.width as u16,
                bounds.height as u16,
                0,
                WindowClass::INPUT_OUTPUT,
                self.root_visual,
                &CreateWindowAux::new()
                    .override_redirect(OVERRIDE_REDIRECT)
                    .background_pixel(self.background),
            )
            .context(format!(
                "Failed to create surface window at ({}, {})",
                bounds.x, bounds.y
            ))?;
        self.conn
            .map_window(window)
            .context("Failed to map surface window")?;
        self.conn.flush().context("Failed to flush X11 connection")?;
        Ok(window)
    }

    fn destroy_surface(&self, window: u32) -> Result<()> {
        self.conn
            .destroy_window(window)
            .context(format!("Failed to destroy surface window {window}"))?;
        self.conn.flush().context("Failed to flush X11 connection")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(x: i32, y: i32, w: u32, h: u32) -> Display {
        Display {
            bounds: Bounds::new(x, y, w, h),
        }
    }

    #[test]
    fn test_nearest_point_inside_display_wins() {
        let displays = vec![display(0, 0, 1920, 1080), display(1920, 0, 1920, 1080)];
        let hit = display_nearest_point(&displays, Point::new(2000, 500)).unwrap();
        assert_eq!(hit.bounds.origin(), Point::new(1920, 0));
    }

    #[test]
    fn test_nearest_point_outside_picks_closest_rect() {
        let displays = vec![display(0, 0, 1920, 1080), display(1920, 0, 1920, 1080)];
        // Just past the right edge of the second display
        let hit = display_nearest_point(&displays, Point::new(3900, 500)).unwrap();
        assert_eq!(hit.bounds.origin(), Point::new(1920, 0));
    }

    #[test]
    fn test_nearest_point_offset_probe_crosses_boundary() {
        // Cursor at x=1900 on the first display, probe offset +50 lands at 1950
        let displays = vec![display(0, 0, 1920, 1080), display(1920, 0, 1920, 1080)];
        let hit = display_nearest_point(&displays, Point::new(1950, 500)).unwrap();
        assert_eq!(hit.bounds.origin(), Point::new(1920, 0));
    }

    #[test]
    fn test_nearest_point_empty_topology() {
        assert_eq!(display_nearest_point(&[], Point::new(0, 0)), None);
    }
}
