use crate::error::{Error, Result};
use crate::FORCE_LIMIT;

/// Hard clamp applied to cart velocity, cart position and angular velocity
/// after every integration step.
pub const STATE_LIMIT: f64 = 10.0;

/// Instantaneous state of the cart and pendulum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalState {
    /// Pendulum angle in radians; zero is upright.
    pub angle: f64,
    /// Angular velocity in rad/s.
    pub angular_velocity: f64,
    /// Cart position in meters.
    pub cart_position: f64,
    /// Cart velocity in m/s.
    pub cart_velocity: f64,
}

impl Default for PhysicalState {
    /// The reset state: slightly off equilibrium so the pendulum starts
    /// falling, cart centered and at rest.
    fn default() -> Self {
        Self {
            angle: 0.1,
            angular_velocity: 0.0,
            cart_position: 0.0,
            cart_velocity: 0.0,
        }
    }
}

/// Physical constants of the plant. Immutable during a single `update` call;
/// mass and length may be changed by the host between steps through
/// [`CartPole::set_mass`] / [`CartPole::set_length`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalParameters {
    /// Pendulum mass (kg).
    pub mass: f64,
    /// Cart mass (kg).
    pub cart_mass: f64,
    /// Pendulum length (m).
    pub length: f64,
    /// Gravitational acceleration (m/s^2).
    pub gravity: f64,
    /// Pendulum moment of inertia; defaults to `mass * length^2`.
    pub inertia: f64,
    /// Integration timestep (s).
    pub dt: f64,
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        PhysicalParameters::new(1.0, 1.0, 1.0, 9.81, 0.01)
    }
}

impl PhysicalParameters {
    pub fn new(mass: f64, cart_mass: f64, length: f64, gravity: f64, dt: f64) -> Self {
        Self {
            mass,
            cart_mass,
            length,
            gravity,
            inertia: mass * length * length,
            dt,
        }
    }
}

/// Which formulation of the equations of motion drives the integrator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ModelKind {
    /// Decoupled approximation: cart acceleration ignores the pendulum
    /// reaction, the pendulum sees the cart acceleration as an input.
    Simplified,
    /// The coupled 2x2 system solved for both accelerations simultaneously.
    #[default]
    Coupled,
}

/// The cart-pole plant: integrates one timestep of the equations of motion
/// per [`CartPole::update`] call.
pub struct CartPole {
    params: PhysicalParameters,
    kind: ModelKind,
    state: PhysicalState,
}

impl CartPole {
    pub fn new(params: PhysicalParameters) -> Self {
        Self::with_kind(params, ModelKind::default())
    }

    pub fn with_kind(params: PhysicalParameters, kind: ModelKind) -> Self {
        Self {
            params,
            kind,
            state: PhysicalState::default(),
        }
    }

    pub fn state(&self) -> PhysicalState {
        self.state
    }

    pub fn parameters(&self) -> &PhysicalParameters {
        &self.params
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Sets the pendulum mass and re-derives the default inertia.
    pub fn set_mass(&mut self, mass: f64) {
        self.params.mass = mass;
        self.params.inertia = mass * self.params.length * self.params.length;
    }

    /// Sets the pendulum length and re-derives the default inertia.
    pub fn set_length(&mut self, length: f64) {
        self.params.length = length;
        self.params.inertia = self.params.mass * length * length;
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        self.state = PhysicalState::default();
    }

    /// Advances the state by one timestep under the given force.
    ///
    /// The force is clamped to the actuator range before use. On a numeric
    /// fault (degenerate denominator, non-finite acceleration) the state is
    /// left untouched and the error is returned to the caller.
    pub fn update(&mut self, force: f64) -> Result<PhysicalState> {
        let force = force.clamp(-FORCE_LIMIT, FORCE_LIMIT);
        let (angular_acceleration, cart_acceleration) = match self.kind {
            ModelKind::Simplified => self.simplified_accelerations(force),
            ModelKind::Coupled => self.coupled_accelerations(force)?,
        };

        if !angular_acceleration.is_finite() || !cart_acceleration.is_finite() {
            return Err(Error::Numeric {
                context: "acceleration",
            });
        }

        let dt = self.params.dt;
        let mut next = self.state;

        next.cart_velocity = (next.cart_velocity + cart_acceleration * dt).clamp(-STATE_LIMIT, STATE_LIMIT);
        next.cart_position = (next.cart_position + next.cart_velocity * dt).clamp(-STATE_LIMIT, STATE_LIMIT);
        next.angular_velocity =
            (next.angular_velocity + angular_acceleration * dt).clamp(-STATE_LIMIT, STATE_LIMIT);
        next.angle += next.angular_velocity * dt;

        if !next.angle.is_finite() {
            return Err(Error::Numeric { context: "angle" });
        }

        self.state = next;

        Ok(next)
    }

    fn simplified_accelerations(&self, force: f64) -> (f64, f64) {
        let p = &self.params;
        let cart_acceleration = force / (p.cart_mass + p.mass);
        let angular_acceleration = (p.gravity * self.state.angle.sin()
            - cart_acceleration * self.state.angle.cos())
            / p.length;

        (angular_acceleration, cart_acceleration)
    }

    fn coupled_accelerations(&self, force: f64) -> Result<(f64, f64)> {
        let p = &self.params;
        let (sin, cos) = self.state.angle.sin_cos();
        let omega = self.state.angular_velocity;
        let total_mass = p.cart_mass + p.mass;
        let ml = p.mass * p.length;
        let denom = (p.inertia + ml * p.length) * total_mass - ml * ml * cos * cos;

        if denom.abs() < 1e-9 {
            return Err(Error::Numeric {
                context: "coupled-model denominator",
            });
        }

        let angular_acceleration =
            (ml * p.gravity * sin * total_mass + ml * cos * force - ml * ml * omega * omega * sin * cos)
                / denom;
        let cart_acceleration =
            (ml * (omega * omega * sin - angular_acceleration * cos) + force) / total_mass;

        Ok((angular_acceleration, cart_acceleration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_free_fall_step_matches_closed_form() {
        let mut plant = CartPole::with_kind(PhysicalParameters::default(), ModelKind::Simplified);
        let state = plant.update(0.0).unwrap();
        let p = PhysicalParameters::default();
        let expected = p.gravity * 0.1f64.sin() / p.length * p.dt;

        assert_relative_eq!(state.angular_velocity, expected, epsilon = 1e-12);
        assert_relative_eq!(state.angle, 0.1 + expected * p.dt, epsilon = 1e-12);
        assert_eq!(state.cart_velocity, 0.0);
        assert_eq!(state.cart_position, 0.0);
    }

    #[test]
    fn test_coupled_step_solves_both_accelerations() {
        let mut plant = CartPole::new(PhysicalParameters::default());
        let state = plant.update(0.0).unwrap();

        // Hand-solved 2x2 system at theta = 0.1, omega = 0, F = 0.
        let theta: f64 = 0.1;
        let denom = 2.0 * 2.0 - theta.cos() * theta.cos();
        let angular_acceleration = 9.81 * theta.sin() * 2.0 / denom;
        let cart_acceleration = -angular_acceleration * theta.cos() / 2.0;

        assert_relative_eq!(state.angular_velocity, angular_acceleration * 0.01, epsilon = 1e-12);
        assert_relative_eq!(state.cart_velocity, cart_acceleration * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_state_clamps_hold_under_saturation() {
        for kind in [ModelKind::Simplified, ModelKind::Coupled] {
            let mut plant = CartPole::with_kind(PhysicalParameters::default(), kind);

            for _ in 0..2000 {
                let state = plant.update(FORCE_LIMIT).unwrap();

                assert!(state.cart_velocity.abs() <= STATE_LIMIT);
                assert!(state.cart_position.abs() <= STATE_LIMIT);
                assert!(state.angular_velocity.abs() <= STATE_LIMIT);
            }
        }
    }

    #[test]
    fn test_force_clamp_is_idempotent() {
        let mut saturated = CartPole::new(PhysicalParameters::default());
        let mut clamped = CartPole::new(PhysicalParameters::default());

        let a = saturated.update(1000.0).unwrap();
        let b = clamped.update(FORCE_LIMIT).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_denominator_leaves_state_untouched() {
        // Inertia chosen so the coupled denominator vanishes at the reset
        // angle.
        let params = PhysicalParameters {
            inertia: 0.1f64.cos().powi(2) / 2.0 - 1.0,
            ..PhysicalParameters::default()
        };
        let mut plant = CartPole::new(params);
        let before = plant.state();

        assert!(plant.update(1.0).is_err());
        assert_eq!(plant.state(), before);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut plant = CartPole::new(PhysicalParameters::default());

        for _ in 0..50 {
            plant.update(3.0).unwrap();
        }

        assert_ne!(plant.state(), PhysicalState::default());

        plant.reset();

        assert_eq!(plant.state(), PhysicalState::default());
    }

    #[test]
    fn test_setters_rederive_inertia() {
        let mut plant = CartPole::new(PhysicalParameters::default());

        plant.set_length(2.0);

        assert_eq!(plant.parameters().inertia, 4.0);

        plant.set_mass(0.5);

        assert_eq!(plant.parameters().inertia, 2.0);
    }
}
