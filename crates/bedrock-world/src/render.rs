//! Top-down chunk tiles.

use bedrock_net::ChunkPos;
use image::{Rgba, RgbaImage, imageops};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::column::Chunk;

/// Tile edge in pixels, one pixel per block.
pub const TILE_SIZE: u32 = 16;

/// Widest map, in columns, [`render_map`] will draw.
pub const MAX_MAP_TILES: u32 = 1024;

/// Base colour for a runtime id. Runtime ids carry no colour information so
/// ids are spread over the hue wheel deterministically.
pub fn block_colour(runtime_id: u32) -> [u8; 3] {
    let h = runtime_id.wrapping_mul(0x9e37_79b9);
    let r = (h >> 24) as u8;
    let g = (h >> 16) as u8;
    let b = (h >> 8) as u8;
    // keep tiles readable on a dark map background
    [r | 0x40, g | 0x40, b | 0x40]
}

/// Render the top non-air block of every X/Z column, darker when lower.
/// Columns with no blocks stay transparent.
pub fn render_chunk(chunk: &Chunk) -> RgbaImage {
    let range = chunk.range();
    let height = range.height().max(1) as f32;
    let mut img = RgbaImage::new(TILE_SIZE, TILE_SIZE);
    for x in 0..16u8 {
        for z in 0..16u8 {
            let Some((y, rid)) = chunk.highest_block(x, z) else {
                continue;
            };
            let shade = 0.5 + 0.5 * (y - range.min) as f32 / height;
            let [r, g, b] = block_colour(rid);
            let px = Rgba([
                (f32::from(r) * shade) as u8,
                (f32::from(g) * shade) as u8,
                (f32::from(b) * shade) as u8,
                255,
            ]);
            img.put_pixel(u32::from(x), u32::from(z), px);
        }
    }
    img
}

/// Stitch the tiles of every column into one image, north up. Returns
/// `None` when there is nothing to draw or the area is too large.
pub fn render_map(chunks: &FxHashMap<ChunkPos, Chunk>) -> Option<RgbaImage> {
    let min_x = chunks.keys().map(|p| p.x).min()?;
    let max_x = chunks.keys().map(|p| p.x).max()?;
    let min_z = chunks.keys().map(|p| p.z).min()?;
    let max_z = chunks.keys().map(|p| p.z).max()?;

    let width = i64::from(max_x) - i64::from(min_x) + 1;
    let depth = i64::from(max_z) - i64::from(min_z) + 1;
    if width > i64::from(MAX_MAP_TILES) || depth > i64::from(MAX_MAP_TILES) {
        warn!(width, depth, "Captured area too large for a map image");
        return None;
    }

    let mut map = RgbaImage::new(width as u32 * TILE_SIZE, depth as u32 * TILE_SIZE);
    for (pos, chunk) in chunks {
        let x = (i64::from(pos.x) - i64::from(min_x)) * i64::from(TILE_SIZE);
        let z = (i64::from(pos.z) - i64::from(min_z)) * i64::from(TILE_SIZE);
        imageops::overlay(&mut map, &render_chunk(chunk), x, z);
    }
    Some(map)
}
