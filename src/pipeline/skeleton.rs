use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::{types::BodyPart, vec2::Vec2};

pub type Color = [u8; 4];

pub const CENTER_COLOR: Color = [0, 0, 0, 255];
pub const CURSOR_COLOR: Color = [37, 99, 235, 255];
pub const SKELETON_COLOR: Color = [96, 96, 96, 217];

// Polylines drawn for a detected pose. Mirrored labels match the capture
// buffer, so "left" is on the viewer's left.
pub const POSE_SEGMENTS: &[&[BodyPart]] = &[
    &[BodyPart::Nose],
    &[
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::RightHip,
        BodyPart::LeftHip,
        BodyPart::LeftShoulder,
    ],
    &[BodyPart::LeftShoulder, BodyPart::LeftElbow, BodyPart::LeftWrist],
    &[
        BodyPart::RightShoulder,
        BodyPart::RightElbow,
        BodyPart::RightWrist,
    ],
];

/// RGBA8 drawing surface for debug overlays.
#[derive(Clone, Debug)]
pub struct RgbaCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// Wrap an existing RGBA8 buffer, e.g. a copy of the capture frame.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn draw_line(&mut self, p0: Vec2, p1: Vec2, color: Color, thickness: i32) {
        if !p0.is_finite() || !p1.is_finite() {
            return;
        }
        let (mut x0, mut y0) = (p0.x as i32, p0.y as i32);
        let (x1, y1) = (p1.x as i32, p1.y as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (thickness.max(1) - 1) / 2;

        loop {
            self.put_pixel(x0, y0, color);
            if radius > 0 {
                for ox in -radius..=radius {
                    for oy in -radius..=radius {
                        if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                            self.put_pixel(x0 + ox, y0 + oy, color);
                        }
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    pub fn draw_polyline(&mut self, points: &[Vec2], color: Color, thickness: i32) {
        for pair in points.windows(2) {
            self.draw_line(pair[0], pair[1], color, thickness);
        }
    }

    pub fn fill_circle(&mut self, center: Vec2, radius: i32, color: Color) {
        if !center.is_finite() {
            return;
        }
        let (cx, cy) = (center.x as i32, center.y as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    pub fn draw_crosshair(&mut self, center: Vec2, radius: f32, color: Color, thickness: i32) {
        let horizontal = Vec2::new(radius, 0.0);
        let vertical = Vec2::new(0.0, radius);
        self.draw_line(center - horizontal, center + horizontal, color, thickness);
        self.draw_line(center - vertical, center + vertical, color, thickness);
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = (uy as usize * self.width as usize + ux as usize) * 4;
        if let Some(px) = self.pixels.get_mut(idx..idx + 4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("canvas buffer does not match its dimensions"))?;
        image
            .save(path)
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }
}
