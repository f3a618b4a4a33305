//! CPU-side perspective warps for sprite corners
//!
//! Warps are applied to every quad corner after rotation and translation:
//! globe curvature first, then the vanishing-point scale.

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec2;

/// Which warps are applied to sprite corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PerspectiveMode {
    /// Corners are left alone
    #[default]
    None,
    /// Sine curvature around the view centre
    Globe,
    /// Scale toward a horizon line
    VanishingPoint,
    /// Globe followed by vanishing point
    Fisheye,
}

impl PerspectiveMode {
    fn applies_globe(self) -> bool {
        matches!(self, Self::Globe | Self::Fisheye)
    }

    fn applies_vanishing_point(self) -> bool {
        matches!(self, Self::VanishingPoint | Self::Fisheye)
    }
}

/// Perspective parameters plus the current view geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveWarp {
    /// Active mode
    pub mode: PerspectiveMode,
    /// Globe sphere radius in pixels
    pub sphere_radius: f32,
    /// Y coordinate of the horizon line
    pub horizon_y: f32,
    /// Scale applied at the horizon, interpolated to 1.0 one view height away
    pub horizon_scale: f32,
    /// Centre of the viewport
    pub view_center: Vec2,
    /// Viewport height, used to normalize distance from the horizon
    pub view_height: f32,
    /// Temporarily disables all warps without touching the parameters
    pub suspended: bool,
}

impl Default for PerspectiveWarp {
    fn default() -> Self {
        Self {
            mode: PerspectiveMode::None,
            sphere_radius: 1000.0,
            horizon_y: 0.0,
            horizon_scale: 0.5,
            view_center: Vec2::zeros(),
            view_height: 1.0,
            suspended: false,
        }
    }
}

impl PerspectiveWarp {
    /// True when `apply` is not the identity
    pub fn is_active(&self) -> bool {
        !self.suspended && self.mode != PerspectiveMode::None
    }

    /// Update the view geometry from a viewport rectangle
    pub fn set_view(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.view_center = Vec2::new(x + width * 0.5, y + height * 0.5);
        self.view_height = height;
    }

    /// Warp one corner
    pub fn apply(&self, point: Vec2) -> Vec2 {
        if !self.is_active() {
            return point;
        }

        let mut p = point;
        if self.mode.applies_globe() {
            p = self.globe(p);
        }
        if self.mode.applies_vanishing_point() {
            p = self.vanishing_point(p);
        }
        p
    }

    fn globe(&self, p: Vec2) -> Vec2 {
        let r = self.sphere_radius;
        if r <= f32::EPSILON {
            return p;
        }
        let d = p - self.view_center;
        Vec2::new(
            self.view_center.x + r * (d.x / r).sin(),
            self.view_center.y + r * (d.y / r).sin(),
        )
    }

    fn vanishing_point(&self, p: Vec2) -> Vec2 {
        let dy = p.y - self.horizon_y;
        let depth = if self.view_height > f32::EPSILON {
            (dy.abs() / self.view_height).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let scale = self.horizon_scale + (1.0 - self.horizon_scale) * depth;

        Vec2::new(
            self.view_center.x + (p.x - self.view_center.x) * scale,
            self.horizon_y + dy * scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn warp(mode: PerspectiveMode) -> PerspectiveWarp {
        let mut warp = PerspectiveWarp {
            mode,
            sphere_radius: 300.0,
            horizon_y: 600.0,
            horizon_scale: 0.25,
            ..Default::default()
        };
        warp.set_view(0.0, 0.0, 800.0, 600.0);
        warp
    }

    fn corners() -> [Vec2; 4] {
        [
            Vec2::new(10.0, 20.0),
            Vec2::new(790.0, 20.0),
            Vec2::new(790.0, 580.0),
            Vec2::new(-35.5, 1234.0),
        ]
    }

    #[test]
    fn test_disabled_is_exact_identity() {
        let none = warp(PerspectiveMode::None);
        let mut suspended = warp(PerspectiveMode::Fisheye);
        suspended.suspended = true;

        for c in corners() {
            assert_eq!(none.apply(c), c);
            assert_eq!(suspended.apply(c), c);
        }
    }

    #[test]
    fn test_globe_keeps_view_center_fixed() {
        for radius in [1.0, 300.0, 1.0e6] {
            let mut globe = warp(PerspectiveMode::Globe);
            globe.sphere_radius = radius;
            assert_eq!(globe.apply(globe.view_center), globe.view_center);
        }
    }

    #[test]
    fn test_globe_pulls_edges_inward() {
        let globe = warp(PerspectiveMode::Globe);
        let p = globe.apply(Vec2::new(790.0, 300.0));
        assert!(p.x < 790.0 && p.x > 400.0);
        assert_relative_eq!(p.y, 300.0);
    }

    #[test]
    fn test_vanishing_point_scale_at_horizon_and_far_edge() {
        let vp = warp(PerspectiveMode::VanishingPoint);

        let at_horizon = vp.apply(Vec2::new(600.0, 600.0));
        assert_relative_eq!(at_horizon.x, 400.0 + 200.0 * 0.25);
        assert_relative_eq!(at_horizon.y, 600.0);

        let far = vp.apply(Vec2::new(600.0, -300.0));
        assert_relative_eq!(far.x, 600.0);
        assert_relative_eq!(far.y, -300.0);
    }

    #[test]
    fn test_fisheye_applies_globe_then_vanishing_point() {
        let fisheye = warp(PerspectiveMode::Fisheye);
        let globe = warp(PerspectiveMode::Globe);
        let vp = warp(PerspectiveMode::VanishingPoint);

        for c in corners() {
            let expected = vp.apply(globe.apply(c));
            let actual = fisheye.apply(c);
            assert_relative_eq!(actual.x, expected.x, epsilon = 1e-4);
            assert_relative_eq!(actual.y, expected.y, epsilon = 1e-4);
        }
    }
}
