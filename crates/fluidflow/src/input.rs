//! Pointer sampling and force derivation.

use glam::Vec2;

/// Force request handed to the pipeline once per tick.
///
/// Both vectors are in window pixels with y growing downward.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerForce {
    /// Where the impulse is centered: the anchor of the current drag.
    pub origin: Vec2,
    /// Pointer displacement since the anchor.
    pub delta: Vec2,
}

impl PointerForce {
    pub const NONE: Self = Self {
        origin: Vec2::ZERO,
        delta: Vec2::ZERO,
    };

    /// Impulse at `origin` with the given pixel displacement.
    pub fn new(origin: Vec2, delta: Vec2) -> Self {
        Self { origin, delta }
    }

    pub fn is_zero(&self) -> bool {
        self.delta == Vec2::ZERO
    }

    /// Velocity (cells/s, y up) the force kernel adds at the splat center.
    ///
    /// The vertical component is negated: pointer rows grow downward while
    /// the velocity field's y axis points up.
    pub fn impulse(&self, force_scale: f32, time_step: f32) -> Vec2 {
        Vec2::new(self.delta.x, -self.delta.y) * force_scale / time_step
    }
}

/// Tracks the pointer between ticks.
///
/// While the primary button is released the anchor follows the pointer, so
/// a new drag always measures displacement from where it started and a
/// release never leaves a stale anchor behind.
#[derive(Clone, Debug, Default)]
pub struct PointerSampler {
    position: Vec2,
    anchor: Vec2,
    pressed: bool,
}

impl PointerSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn set_pressed(&mut self, pressed: bool) {
        self.pressed = pressed;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Sample once per tick.
    pub fn sample(&mut self) -> PointerForce {
        if !self.pressed {
            self.anchor = self.position;
        }
        PointerForce {
            origin: self.anchor,
            delta: self.position - self.anchor,
        }
    }
}
