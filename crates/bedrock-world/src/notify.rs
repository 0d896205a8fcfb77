//! Hooks for a map view.

use bedrock_net::ChunkPos;
use image::RgbaImage;

/// Receives chunk updates for display. Implementations must be cheap; they are
/// called with the world lock held.
pub trait MapNotifier: Send + Sync {
    /// A column changed. `None` marks a column known but not yet drawn.
    fn notify(&self, pos: ChunkPos, tile: Option<RgbaImage>);

    /// Redraw the view once the current batch of updates is done.
    fn schedule_redraw(&self);
}

/// Notifier that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl MapNotifier for NullNotifier {
    fn notify(&self, _pos: ChunkPos, _tile: Option<RgbaImage>) {}

    fn schedule_redraw(&self) {}
}
