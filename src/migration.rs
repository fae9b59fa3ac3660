//! Cross-display migration coordinator
//!
//! Resolves a drag-driven request to move a running application instance from
//! its origin surface to the surface on an adjacent display. The handoff is
//! two-phase (insert on the target, then acknowledge removal to the origin):
//! if the target never accepts, the origin still holds a valid copy, so a
//! transient duplicate is preferred over a vanished application. Resolution
//! failures are silent no-ops - a single-display host is a valid, expected
//! configuration, not an error.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::constants::migration::CURSOR_OFFSET;
use crate::ipc::messages::SurfaceEvent;
use crate::screens::{display_nearest_point, ScreenTopology};
use crate::surface::SurfaceManager;
use crate::types::{Direction, SurfaceId};

/// Resolve and perform one migration request
///
/// Returns the target surface when the handoff was delivered, `None` for
/// every no-op outcome.
pub fn migrate(
    app_id: String,
    state: Value,
    direction: Direction,
    origin: SurfaceId,
    screens: &dyn ScreenTopology,
    surfaces: &SurfaceManager,
) -> Option<SurfaceId> {
    let cursor = match screens.cursor() {
        Ok(cursor) => cursor,
        Err(e) => {
            warn!(error = %e, "Cursor query failed, dropping migration request");
            return None;
        }
    };
    let displays = match screens.displays() {
        Ok(displays) => displays,
        Err(e) => {
            warn!(error = %e, "Display enumeration failed, dropping migration request");
            return None;
        }
    };

    // Offset past the cursor so the probe lands on the adjacent display
    // rather than the one the drag started on
    let probe = direction.offset(cursor, CURSOR_OFFSET);
    let target_display = display_nearest_point(&displays, probe)?;
    let Some(target) = surfaces.surface_at_origin(target_display.bounds.origin()) else {
        debug!(
            app_id = %app_id,
            x = target_display.bounds.x,
            y = target_display.bounds.y,
            "No surface registered at resolved display, application stays"
        );
        return None;
    };
    if target == origin {
        debug!(app_id = %app_id, "Migration resolved to the originating surface, application stays");
        return None;
    }

    surfaces.deliver(
        target,
        SurfaceEvent::IncomingApp {
            app_id: app_id.clone(),
            state,
            edge: direction,
        },
    );
    surfaces.deliver(origin, SurfaceEvent::MigrationAck { app_id: app_id.clone() });
    info!(
        app_id = %app_id,
        origin = %origin,
        target = %target,
        direction = ?direction,
        "Application migrated across displays"
    );
    Some(target)
}
