use crate::vec2::Vec2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBounds {
    pub scale: f32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Map `value` from `[start1, stop1]` onto `[start2, stop2]`.
pub fn scalemap(value: f32, start1: f32, stop1: f32, start2: f32, stop2: f32) -> f32 {
    start2 + (stop2 - start2) * ((value - start1) / (stop1 - start1))
}

pub fn clamp(n: f32, min: f32, max: f32) -> f32 {
    max.min(min.max(n))
}

/// Uniformly scale a source rectangle so it covers the destination, centered.
/// The overflowing axis ends up with a negative offset (crop, not pad).
pub fn scale_to_fill(
    src_width: f32,
    src_height: f32,
    dst_width: f32,
    dst_height: f32,
    bleed: f32,
) -> ScaleBounds {
    let w = src_width - bleed * 2.0;
    let h = src_height - bleed * 2.0;
    let mut s = dst_height / h;
    if w * s < dst_width {
        s = dst_width / w;
    }

    let width = src_width * s;
    let height = src_height * s;
    ScaleBounds {
        scale: s,
        left: (dst_width - width) * 0.5,
        top: (dst_height - height) * 0.5,
        width,
        height,
    }
}

/// Move points from capture-frame space into display space, in place.
pub fn transform_camera_points(
    in_width: f32,
    in_height: f32,
    out_width: f32,
    out_height: f32,
    points: &mut [Vec2],
) {
    let bounds = scale_to_fill(in_width, in_height, out_width, out_height, 0.0);
    for point in points.iter_mut() {
        point.x = point.x * bounds.scale + bounds.left;
        point.y = point.y * bounds.scale + bounds.top;
    }
}
