//! World-space vector math used by payloads and the contact producer.
//!
//! `Vec3` is `Pod`, so it is written to the wire schema byte for byte.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Point or offset in world space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Origin.
    pub const ZERO: Self = Self::splat(0.0);
    /// +X axis.
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    /// +Y axis.
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    /// +Z axis.
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Vector from components.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Same value on every axis.
    #[inline]
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline]
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x.mul_add(other.x, self.y.mul_add(other.y, self.z * other.z))
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Per-axis minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        self.zip(other, f32::min)
    }

    /// Per-axis maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        self.zip(other, f32::max)
    }

    /// Per-axis clamp into the box `lo ..= hi`.
    #[must_use]
    pub fn clamp(self, lo: Self, hi: Self) -> Self {
        self.max(lo).min(hi)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a + b)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a - b)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        self.zip(Self::splat(rhs), |a, b| a * b)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        self * -1.0
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::from([4.0, 5.0, 6.0]);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::splat(3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(a.dot(b), 32.0);

        let mut c = a;
        c += b;
        c -= a;
        assert_eq!(<[f32; 3]>::from(c), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_metric() {
        assert_eq!(Vec3::new(3.0, 4.0, 0.0).length(), 5.0);
        assert_eq!(Vec3::ZERO.distance(Vec3::Z * 2.0), 2.0);
    }

    #[test]
    fn test_clamp_into_box() {
        let p = Vec3::new(-5.0, 0.5, 9.0);
        assert_eq!(p.clamp(Vec3::ZERO, Vec3::splat(1.0)), Vec3::new(0.0, 0.5, 1.0));
        assert_eq!(Vec3::X.min(Vec3::Y), Vec3::ZERO);
        assert_eq!(Vec3::X.max(Vec3::Y), Vec3::new(1.0, 1.0, 0.0));
    }
}
