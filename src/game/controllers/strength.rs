/// Controller weight that blends linearly toward a target over time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlStrength {
    current: f32,
    target: f32,
    /// seconds left until `current` reaches `target`
    blend_time_to_go: f32,
    pub blend_in_time: f32,
    pub blend_out_time: f32,
}

impl Default for ControlStrength {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ControlStrength {
    pub fn new(strength: f32) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        Self {
            current: strength,
            target: strength,
            blend_time_to_go: 0.0,
            blend_in_time: 0.0,
            blend_out_time: 0.0,
        }
    }

    pub fn with_blend_times(mut self, blend_in_time: f32, blend_out_time: f32) -> Self {
        self.blend_in_time = blend_in_time;
        self.blend_out_time = blend_out_time;
        self
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_blending(&self) -> bool {
        self.blend_time_to_go > 0.0
    }

    /// Blends to 1 over `blend_in_time` or to 0 over `blend_out_time`.
    pub fn set_active(&mut self, active: bool) {
        if active {
            self.set_strength(1.0, self.blend_in_time);
        } else {
            self.set_strength(0.0, self.blend_out_time);
        }
    }

    pub fn set_strength(&mut self, strength: f32, blend_time: f32) {
        self.target = strength.clamp(0.0, 1.0);
        if blend_time <= 0.0 {
            self.current = self.target;
            self.blend_time_to_go = 0.0;
        } else {
            self.blend_time_to_go = blend_time;
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.blend_time_to_go <= 0.0 {
            return;
        }
        if dt >= self.blend_time_to_go {
            self.current = self.target;
            self.blend_time_to_go = 0.0;
        } else {
            self.current += (self.target - self.current) * (dt / self.blend_time_to_go);
            self.blend_time_to_go -= dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blends_linearly() {
        let mut strength = ControlStrength::new(0.0).with_blend_times(1.0, 0.5);
        strength.set_active(true);
        strength.tick(0.25);
        assert!((strength.current() - 0.25).abs() < 1e-6);
        strength.tick(0.25);
        assert!((strength.current() - 0.5).abs() < 1e-6);
        strength.tick(10.0);
        assert_eq!(strength.current(), 1.0);
        assert!(!strength.is_blending());

        strength.set_active(false);
        strength.tick(0.25);
        assert!((strength.current() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_blend_time_is_immediate_and_clamped() {
        let mut strength = ControlStrength::new(0.3);
        strength.set_strength(4.0, 0.0);
        assert_eq!(strength.current(), 1.0);
        strength.set_strength(-1.0, 0.0);
        assert_eq!(strength.current(), 0.0);
    }
}
