// src/geometry.rs
//
// Pure dimension math. Every function here is total over its input domain:
// no I/O, no pixels, no panics. The planner calls into this module so that
// all geometry decisions are made before any pixel work starts.

use crate::options::CropPosition;

/// A crop window fully contained in the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Placement of a scaled image on a padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Resolve requested resize dimensions against the source size.
///
/// Both given: returned unchanged. One given: the other is derived from the
/// source aspect ratio, rounded to nearest, floored at 1. Neither given:
/// source dimensions.
pub fn resize_dimensions(
    src_w: u32,
    src_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
) -> (u32, u32) {
    match (target_w, target_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        (None, None) => (src_w, src_h),
    }
}

/// Largest dimensions with the source aspect ratio that fit inside the box.
/// Uses the smaller scale factor on each axis.
pub fn fit_dimensions(src_w: u32, src_h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    let scale = f64::min(box_w as f64 / src_w as f64, box_h as f64 / src_h as f64);
    let w = (src_w as f64 * scale).round() as u32;
    let h = (src_h as f64 * scale).round() as u32;
    (w.max(1), h.max(1))
}

/// Smallest dimensions with the source aspect ratio that cover the box.
/// Uses the larger scale factor, so one axis may overshoot.
pub fn fill_dimensions(src_w: u32, src_h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    let scale = f64::max(box_w as f64 / src_w as f64, box_h as f64 / src_h as f64);
    let w = (src_w as f64 * scale).round() as u32;
    let h = (src_h as f64 * scale).round() as u32;
    (w.max(box_w), h.max(box_h))
}

/// Resolve a crop request into a window guaranteed to lie inside the source.
///
/// The requested dimensions are clamped to the source first; the origin is
/// then clamped into `[0, src - crop]` so the window never spills over an
/// edge. With positional anchors the origin comes from the anchor formula;
/// `custom` uses the caller-supplied coordinates.
pub fn crop_rect(
    src_w: u32,
    src_h: u32,
    crop_w: u32,
    crop_h: u32,
    position: CropPosition,
    custom_x: u32,
    custom_y: u32,
) -> CropRect {
    let width = crop_w.min(src_w);
    let height = crop_h.min(src_h);
    let max_x = src_w - width;
    let max_y = src_h - height;
    let (x, y) = match position {
        CropPosition::Center => (max_x / 2, max_y / 2),
        CropPosition::TopLeft => (0, 0),
        CropPosition::TopRight => (max_x, 0),
        CropPosition::BottomLeft => (0, max_y),
        CropPosition::BottomRight => (max_x, max_y),
        CropPosition::Custom => (custom_x.min(max_x), custom_y.min(max_y)),
    };
    CropRect { x, y, width, height }
}

/// Center a fit-scaled image on a canvas of the target size.
pub fn pad_layout(src_w: u32, src_h: u32, canvas_w: u32, canvas_h: u32) -> PadLayout {
    let (scaled_width, scaled_height) = fit_dimensions(src_w, src_h, canvas_w, canvas_h);
    PadLayout {
        canvas_width: canvas_w,
        canvas_height: canvas_h,
        scaled_width,
        scaled_height,
        offset_x: (canvas_w.saturating_sub(scaled_width)) / 2,
        offset_y: (canvas_h.saturating_sub(scaled_height)) / 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_targets_pass_through_unchanged() {
        assert_eq!(resize_dimensions(1000, 500, Some(300), Some(300)), (300, 300));
    }

    #[test]
    fn single_target_derives_from_aspect() {
        // 1000x500, width 800 -> height 400
        assert_eq!(resize_dimensions(1000, 500, Some(800), None), (800, 400));
        // height 250 -> width 500
        assert_eq!(resize_dimensions(1000, 500, None, Some(250)), (500, 250));
    }

    #[test]
    fn no_targets_keep_source() {
        assert_eq!(resize_dimensions(640, 480, None, None), (640, 480));
    }

    #[test]
    fn derived_dimension_never_zero() {
        // Extreme aspect ratio rounds toward zero without the floor
        assert_eq!(resize_dimensions(10_000, 1, Some(2), None), (2, 1));
    }

    #[test]
    fn fit_uses_min_scale() {
        assert_eq!(fit_dimensions(400, 300, 800, 800), (800, 600));
        assert_eq!(fit_dimensions(300, 400, 800, 800), (600, 800));
    }

    #[test]
    fn fill_covers_the_box() {
        let (w, h) = fill_dimensions(400, 300, 800, 800);
        assert!(w >= 800 && h >= 800);
        assert_eq!((w, h), (1067, 800));
    }

    #[test]
    fn crop_clamps_dimensions_to_source() {
        let r = crop_rect(100, 100, 500, 500, CropPosition::Center, 0, 0);
        assert_eq!(r, CropRect { x: 0, y: 0, width: 100, height: 100 });
    }

    #[test]
    fn crop_anchors() {
        let src = (1000, 800);
        let r = crop_rect(src.0, src.1, 200, 100, CropPosition::Center, 0, 0);
        assert_eq!((r.x, r.y), (400, 350));
        let r = crop_rect(src.0, src.1, 200, 100, CropPosition::TopRight, 0, 0);
        assert_eq!((r.x, r.y), (800, 0));
        let r = crop_rect(src.0, src.1, 200, 100, CropPosition::BottomLeft, 0, 0);
        assert_eq!((r.x, r.y), (0, 700));
        let r = crop_rect(src.0, src.1, 200, 100, CropPosition::BottomRight, 0, 0);
        assert_eq!((r.x, r.y), (800, 700));
    }

    #[test]
    fn custom_origin_is_clamped_into_bounds() {
        let r = crop_rect(1000, 800, 200, 100, CropPosition::Custom, 950, 790);
        assert_eq!((r.x, r.y), (800, 700));
        assert!(r.x + r.width <= 1000);
        assert!(r.y + r.height <= 800);
    }

    #[test]
    fn pad_centering() {
        // 400x300 into 800x800: scaled to 800x600, centered vertically
        let layout = pad_layout(400, 300, 800, 800);
        assert_eq!(layout.scaled_width, 800);
        assert_eq!(layout.scaled_height, 600);
        assert_eq!(layout.offset_x, 0);
        assert_eq!(layout.offset_y, 100);
    }

    #[test]
    fn pad_exact_fit_has_zero_offsets() {
        let layout = pad_layout(800, 800, 800, 800);
        assert_eq!((layout.offset_x, layout.offset_y), (0, 0));
        assert_eq!((layout.scaled_width, layout.scaled_height), (800, 800));
    }
}
