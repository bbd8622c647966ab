use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A 2D point or displacement. NaN components mean "unknown".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const NAN: Vec2 = Vec2 {
        x: f32::NAN,
        y: f32::NAN,
    };
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for (f32, f32) {
    fn from(v: Vec2) -> Self {
        (v.x, v.y)
    }
}

fn write(result: Vec2, out: Option<&mut Vec2>) -> Vec2 {
    if let Some(out) = out {
        *out = result;
    }
    result
}

pub fn add(a: Vec2, b: Vec2, out: Option<&mut Vec2>) -> Vec2 {
    write(Vec2::new(a.x + b.x, a.y + b.y), out)
}

pub fn sub(a: Vec2, b: Vec2, out: Option<&mut Vec2>) -> Vec2 {
    write(Vec2::new(a.x - b.x, a.y - b.y), out)
}

pub fn scale(a: Vec2, s: f32, out: Option<&mut Vec2>) -> Vec2 {
    write(Vec2::new(a.x * s, a.y * s), out)
}

/// Component-wise scale.
pub fn scale_by(a: Vec2, b: Vec2, out: Option<&mut Vec2>) -> Vec2 {
    write(Vec2::new(a.x * b.x, a.y * b.y), out)
}

pub fn copy(a: Vec2, out: Option<&mut Vec2>) -> Vec2 {
    write(a, out)
}

pub fn distance(a: Vec2, b: Vec2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Exact comparison, no epsilon.
pub fn equal(a: Vec2, b: Vec2) -> bool {
    a.x == b.x && a.y == b.y
}

pub fn lerp(a: Vec2, b: Vec2, t: f32, out: Option<&mut Vec2>) -> Vec2 {
    write(
        Vec2::new((b.x - a.x) * t + a.x, (b.y - a.y) * t + a.y),
        out,
    )
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        add(self, rhs, None)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        sub(self, rhs, None)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        scale(self, rhs, None)
    }
}
