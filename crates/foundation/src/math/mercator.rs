//! Web Mercator helpers in the unit square: `x` grows east, `y` grows south,
//! both in `[0, 1]` for the whole world.

use super::Vec2;
use crate::bounds::{LngLat, LngLatBounds};

/// Latitude limit of the square Web Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Tile edge in pixels used by vector map engines for zoom math.
pub const TILE_SIZE_PX: f64 = 512.0;

pub fn project(p: LngLat) -> Vec2 {
    let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let sin = lat.to_radians().sin();
    let x = (p.lng + 180.0) / 360.0;
    let y = 0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * std::f64::consts::PI);
    Vec2::new(x, y)
}

pub fn unproject(v: Vec2) -> LngLat {
    let lng = v.x * 360.0 - 180.0;
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * v.y;
    let lat = n.sinh().atan().to_degrees();
    LngLat::new(lng, lat)
}

/// World size in pixels at `zoom`.
pub fn world_size_px(zoom: f64) -> f64 {
    TILE_SIZE_PX * 2f64.powf(zoom)
}

/// Largest zoom at which `bounds` fits into a viewport of `viewport_px`
/// after removing `padding_px` on every side.
///
/// Returns `f64::INFINITY` for a degenerate (single point) envelope; callers
/// clamp against a zoom ceiling.
pub fn zoom_to_fit(bounds: &LngLatBounds, viewport_px: [f64; 2], padding_px: f64) -> f64 {
    let a = project(bounds.sw);
    let b = project(bounds.ne);
    let span_x = (b.x - a.x).abs();
    let span_y = (b.y - a.y).abs();

    let avail_w = (viewport_px[0] - 2.0 * padding_px).max(1.0);
    let avail_h = (viewport_px[1] - 2.0 * padding_px).max(1.0);

    let zx = if span_x > 0.0 {
        (avail_w / (span_x * TILE_SIZE_PX)).log2()
    } else {
        f64::INFINITY
    };
    let zy = if span_y > 0.0 {
        (avail_h / (span_y * TILE_SIZE_PX)).log2()
    } else {
        f64::INFINITY
    };
    zx.min(zy)
}

/// Center of `bounds` taken in projected space (not the lng/lat midpoint).
pub fn projected_center(bounds: &LngLatBounds) -> LngLat {
    let a = project(bounds.sw);
    let b = project(bounds.ne);
    unproject((a + b) * 0.5)
}
