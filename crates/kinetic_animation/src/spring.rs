//! Spring generator
//!
//! RK4-integrated damped spring driving a numeric value toward a target.
//! Springs self-terminate by a settling check each sampled frame: once both
//! displacement and velocity fall under the configured rest thresholds the
//! value snaps to the target and the generator reports done.

/// Spring parameters plus the rest thresholds that decide settling.
#[derive(Clone, Copy, Debug)]
pub struct SpringConfig {
    pub stiffness: f32,
    pub damping: f32,
    pub mass: f32,
    /// Displacement magnitude under which the spring may settle.
    pub rest_delta: f32,
    /// Velocity magnitude under which the spring may settle.
    pub rest_speed: f32,
}

impl SpringConfig {
    pub fn new(stiffness: f32, damping: f32) -> Self {
        Self {
            stiffness,
            damping,
            mass: 1.0,
            rest_delta: 0.01,
            rest_speed: 0.1,
        }
    }

    /// Default for positional and rotational values: visible bounce, loose
    /// rest thresholds (sub-pixel motion is imperceptible there).
    pub fn under_damped() -> Self {
        Self {
            stiffness: 500.0,
            damping: 25.0,
            mass: 1.0,
            rest_delta: 0.5,
            rest_speed: 10.0,
        }
    }

    /// Default for scale-like values and the general fallback. Damping is
    /// raised sharply when the target is exactly zero so the value does not
    /// oscillate through negative scale.
    pub fn over_damped(target_is_zero: bool) -> Self {
        Self {
            stiffness: 700.0,
            damping: if target_is_zero { 100.0 } else { 35.0 },
            mass: 1.0,
            rest_delta: 0.01,
            rest_speed: 0.1,
        }
    }

    pub fn with_rest(mut self, rest_delta: f32, rest_speed: f32) -> Self {
        self.rest_delta = rest_delta;
        self.rest_speed = rest_speed;
        self
    }

    pub fn critical_damping(&self) -> f32 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    pub fn is_underdamped(&self) -> bool {
        self.damping < self.critical_damping()
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::new(100.0, 10.0)
    }
}

/// A running spring simulation.
#[derive(Clone, Copy, Debug)]
pub struct SpringGenerator {
    config: SpringConfig,
    value: f32,
    velocity: f32,
    target: f32,
    done: bool,
}

impl SpringGenerator {
    pub fn new(config: SpringConfig, origin: f32, target: f32, velocity: f32) -> Self {
        Self {
            config,
            value: origin,
            velocity,
            target,
            done: false,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn is_settled(&self) -> bool {
        (self.value - self.target).abs() < self.config.rest_delta
            && self.velocity.abs() < self.config.rest_speed
    }

    /// Advance the simulation by `dt_ms` and return the new value.
    ///
    /// Integration runs in fixed sub-steps so large frame deltas stay
    /// stable.
    pub fn step(&mut self, dt_ms: f64) -> f32 {
        if self.done {
            return self.value;
        }

        const MAX_STEP_S: f32 = 1.0 / 120.0;
        let mut remaining = (dt_ms as f32 / 1000.0).max(0.0);
        while remaining > 0.0 {
            let dt = remaining.min(MAX_STEP_S);
            self.integrate(dt);
            remaining -= dt;
            if self.is_settled() {
                self.value = self.target;
                self.velocity = 0.0;
                self.done = true;
                break;
            }
        }
        self.value
    }

    fn integrate(&mut self, dt: f32) {
        let k1_v = self.acceleration(self.value, self.velocity);
        let k1_x = self.velocity;

        let k2_v = self.acceleration(
            self.value + k1_x * dt * 0.5,
            self.velocity + k1_v * dt * 0.5,
        );
        let k2_x = self.velocity + k1_v * dt * 0.5;

        let k3_v = self.acceleration(
            self.value + k2_x * dt * 0.5,
            self.velocity + k2_v * dt * 0.5,
        );
        let k3_x = self.velocity + k2_v * dt * 0.5;

        let k4_v = self.acceleration(self.value + k3_x * dt, self.velocity + k3_v * dt);
        let k4_x = self.velocity + k3_v * dt;

        self.velocity += (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v) * dt / 6.0;
        self.value += (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x) * dt / 6.0;
    }

    fn acceleration(&self, x: f32, v: f32) -> f32 {
        let spring_force = -self.config.stiffness * (x - self.target);
        let damping_force = -self.config.damping * v;
        (spring_force + damping_force) / self.config.mass
    }
}
