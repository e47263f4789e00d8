use serde::{Deserialize, Serialize};

/// Default capture area used when neither content nor surface size can be determined.
pub const FALLBACK_WIDTH: f64 = 2000.0;
pub const FALLBACK_HEIGHT: f64 = 1128.0;

const DEFAULT_FILL: f64 = 0.95;

/// Tight box around rendered nodes, in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Size of the whole render surface the bounds were measured on.
    pub original_width: f64,
    pub original_height: f64,
    /// Padding already folded into `x/y/width/height`.
    pub margin: f64,
}

impl ContentBounds {
    /// Bounds covering an entire surface, used when no nodes could be located.
    pub fn full_surface(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            original_width: width,
            original_height: height,
            margin: 0.0,
        }
    }

    pub fn fallback() -> Self {
        Self::full_surface(FALLBACK_WIDTH, FALLBACK_HEIGHT)
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleInfo {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub final_width: f64,
    pub final_height: f64,
}

/// Scales `bounds` uniformly into a `target_width × target_height` area and centers it.
///
/// `fill` is the fraction of the target the content should occupy. The result never exceeds
/// the target and offsets are never negative.
pub fn fit_to_target(
    bounds: &ContentBounds,
    target_width: f64,
    target_height: f64,
    fill: f64,
) -> ScaleInfo {
    let target_ok = target_width.is_finite()
        && target_height.is_finite()
        && target_width > 0.0
        && target_height > 0.0;
    if bounds.is_degenerate() || !target_ok {
        return ScaleInfo {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            final_width: target_width,
            final_height: target_height,
        };
    }

    let fill = if fill.is_finite() && fill > 0.0 {
        fill
    } else {
        DEFAULT_FILL
    };

    let mut scale =
        (target_width * fill / bounds.width).min(target_height * fill / bounds.height);
    if bounds.width * scale > target_width || bounds.height * scale > target_height {
        scale = (target_width / bounds.width).min(target_height / bounds.height) * 0.95;
    }

    let final_width = bounds.width * scale;
    let final_height = bounds.height * scale;
    ScaleInfo {
        scale,
        offset_x: ((target_width - final_width) / 2.0).max(0.0),
        offset_y: ((target_height - final_height) / 2.0).max(0.0),
        final_width,
        final_height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(w: f64, h: f64) -> ContentBounds {
        ContentBounds {
            x: 10.0,
            y: 20.0,
            width: w,
            height: h,
            original_width: 3000.0,
            original_height: 2000.0,
            margin: 50.0,
        }
    }

    #[test]
    fn wide_content_is_limited_by_width() {
        let s = fit_to_target(&bounds(4000.0, 1000.0), 2000.0, 1128.0, 0.95);
        assert!((s.scale - 0.475).abs() < 1e-9);
        assert!((s.final_width - 1900.0).abs() < 1e-9);
        assert!((s.offset_x - 50.0).abs() < 1e-9);
        assert!((s.offset_y - (1128.0 - 475.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn overfill_is_pulled_back_inside_target() {
        let s = fit_to_target(&bounds(100.0, 100.0), 200.0, 100.0, 1.2);
        assert!((s.scale - 0.95).abs() < 1e-9);
        assert!(s.final_height <= 100.0);
        assert!(s.offset_y >= 0.0);
    }

    #[test]
    fn degenerate_bounds_short_circuit() {
        let s = fit_to_target(&bounds(0.0, 10.0), 800.0, 600.0, 0.9);
        assert_eq!(s.scale, 1.0);
        assert_eq!((s.offset_x, s.offset_y), (0.0, 0.0));
        assert_eq!((s.final_width, s.final_height), (800.0, 600.0));
    }

    #[test]
    fn invalid_fill_uses_default() {
        let a = fit_to_target(&bounds(100.0, 100.0), 100.0, 100.0, f64::NAN);
        let b = fit_to_target(&bounds(100.0, 100.0), 100.0, 100.0, DEFAULT_FILL);
        assert_eq!(a, b);
    }
}
