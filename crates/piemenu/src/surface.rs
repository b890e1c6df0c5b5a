use crate::events::Broadcast;
use pietool::wm::Point;
use tokio::sync::broadcast;

/// The presentation side: the ring overlay and the settings window.
pub trait Surfaces: Send {
    /// Shows the overlay with its top-left corner at `origin`.
    fn show_overlay(&mut self, origin: Point, extent: u32);
    fn hide_overlay(&mut self);
    /// Gives a visible overlay a new diameter in place.
    fn resize_overlay(&mut self, extent: u32);
    fn open_settings(&mut self);
}

/// Surfaces that live in other processes and follow the broadcast stream.
pub struct BroadcastSurfaces {
    observers: broadcast::Sender<Broadcast>,
}

impl BroadcastSurfaces {
    pub fn new(observers: broadcast::Sender<Broadcast>) -> Self {
        Self { observers }
    }

    fn send(&self, event: Broadcast) {
        if self.observers.send(event).is_err() {
            log::debug!("No surface is listening");
        }
    }
}

impl Surfaces for BroadcastSurfaces {
    fn show_overlay(&mut self, origin: Point, extent: u32) {
        self.send(Broadcast::OverlayShow {
            x: origin.x,
            y: origin.y,
            extent,
        });
    }

    fn hide_overlay(&mut self) {
        self.send(Broadcast::OverlayHide);
    }

    fn resize_overlay(&mut self, extent: u32) {
        self.send(Broadcast::OverlayResize { extent });
    }

    fn open_settings(&mut self) {
        self.send(Broadcast::SettingsOpen);
    }
}
