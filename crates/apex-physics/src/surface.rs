//! Contact surface parameters and the pure combination rules applied to every
//! touching pair.

/// Friction and elasticity of one side of a contact.
///
/// `spring = ∞` means a rigid contact (no softness override); `spring = 0`
/// marks a sensor that reports collisions but never pushes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    /// Coulomb friction coefficient.
    pub mu: f32,
    /// Restitution contribution.
    pub bounce: f32,
    /// Contact stiffness.
    pub spring: f32,
    /// Contact damping.
    pub damping: f32,
    /// Tyre friction sensitivity, read by wheel models.
    pub sensitivity: f32,
    /// Rolling resistance factor, read by wheel models.
    pub rollres: f32,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            mu: 0.0,
            bounce: 0.0,
            spring: f32::INFINITY,
            damping: f32::INFINITY,
            sensitivity: 1.0,
            rollres: 1.0,
        }
    }
}

impl Surface {
    /// A surface that only detects overlap.
    pub fn sensor() -> Self {
        Self {
            spring: 0.0,
            ..Self::default()
        }
    }

    /// Returns `true` if contacts with this surface produce no response.
    pub fn is_sensor(&self) -> bool {
        self.spring == 0.0
    }
}

/// Soft-contact constraint parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Softness {
    /// Error reduction parameter in `[0, 1]`.
    pub erp: f32,
    /// Constraint force mixing.
    pub cfm: f32,
}

/// Parameters applied to every solver contact of one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactParams {
    /// Combined friction coefficient.
    pub friction: f32,
    /// Combined restitution; zero disables bounce.
    pub restitution: f32,
    /// Soft-contact override, `None` for rigid contacts.
    pub softness: Option<Softness>,
}

impl ContactParams {
    /// Returns `true` if the pair bounces.
    pub fn bounces(&self) -> bool {
        self.restitution != 0.0
    }
}

/// Combines two surfaces into contact parameters for a step of `step` seconds.
///
/// Friction multiplies, bounce adds (enabled only if either side bounces),
/// and springs/dampers combine in series when either spring is finite.
pub fn combine_surfaces(a: &Surface, b: &Surface, step: f32) -> ContactParams {
    let restitution = if a.bounce != 0.0 || b.bounce != 0.0 {
        a.bounce + b.bounce
    } else {
        0.0
    };

    let softness = if a.spring.is_finite() || b.spring.is_finite() {
        let k = 1.0 / (1.0 / a.spring + 1.0 / b.spring);
        let c = 1.0 / (1.0 / a.damping + 1.0 / b.damping);
        let denom = step * k + c;
        Some(Softness {
            erp: step * k / denom,
            cfm: 1.0 / denom,
        })
    } else {
        None
    };

    ContactParams {
        friction: a.mu * b.mu,
        restitution,
        softness,
    }
}
