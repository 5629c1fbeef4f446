//! Tyre friction models.
//!
//! When exactly one geom of a touching pair carries a wheel model and sits on
//! a body, its contacts are handed to the model instead of using the plain
//! combined surface parameters.

use glam::Vec3;

use crate::registry::{BodyId, GeomId};
use crate::surface::{ContactParams, Surface};

/// One contact point between a wheel and something else.
#[derive(Debug, Clone, Copy)]
pub struct WheelContact {
    /// Body of the first geom in the pair.
    pub body1: Option<BodyId>,
    /// Body of the second geom in the pair.
    pub body2: Option<BodyId>,
    /// First geom.
    pub geom1: GeomId,
    /// Second geom.
    pub geom2: GeomId,
    /// `true` if `geom1` is the wheel.
    pub wheel_is_first: bool,
    /// World-space wheel axle (the wheel body's local Z axis).
    pub axle: Vec3,
    /// Surface of the geom the wheel touches.
    pub other_surface: Surface,
    /// Combined parameters for the pair.
    pub params: ContactParams,
    /// Contact normal, pointing from the first geom to the second.
    pub normal: Vec3,
    /// Penetration depth (positive when overlapping).
    pub depth: f32,
    /// Micro step size.
    pub stepsize: f32,
}

/// A tyre friction model.
///
/// Called from inside Rapier's narrow phase, possibly from several threads,
/// so implementations must not block.
pub trait WheelFriction: Send + Sync {
    /// Returns the parameters to use for this contact.
    fn add_contact(&self, contact: &WheelContact) -> ContactParams;
}

/// Reference tyre: friction scales with the ground's friction and
/// sensitivity, rolling resistance eats into the combined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tyre {
    /// Peak friction of the rubber.
    pub mu: f32,
    /// Friction loss per unit of ground `rollres` above one.
    pub rollres_loss: f32,
}

impl Default for Tyre {
    fn default() -> Self {
        Self {
            mu: 1.0,
            rollres_loss: 0.0,
        }
    }
}

impl WheelFriction for Tyre {
    fn add_contact(&self, contact: &WheelContact) -> ContactParams {
        let ground = &contact.other_surface;
        let resistance = 1.0 + self.rollres_loss * (ground.rollres - 1.0).max(0.0);
        ContactParams {
            friction: (self.mu * ground.mu * ground.sensitivity / resistance).max(0.0),
            ..contact.params
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn contact(other: Surface) -> WheelContact {
        let mut geoms: Registry<GeomId, ()> = Registry::new();
        WheelContact {
            body1: None,
            body2: None,
            geom1: geoms.insert(()),
            geom2: geoms.insert(()),
            wheel_is_first: true,
            axle: Vec3::Z,
            other_surface: other,
            params: ContactParams {
                friction: 0.1,
                restitution: 0.2,
                softness: None,
            },
            normal: Vec3::Z,
            depth: 0.01,
            stepsize: 0.0025,
        }
    }

    #[test]
    fn test_tyre_scales_with_ground() {
        let tyre = Tyre {
            mu: 1.5,
            rollres_loss: 0.0,
        };
        let ground = Surface {
            mu: 0.8,
            sensitivity: 0.5,
            ..Surface::default()
        };
        let params = tyre.add_contact(&contact(ground));
        assert!((params.friction - 0.6).abs() < 1e-6);
        // Other parameters pass through.
        assert_eq!(params.restitution, 0.2);
    }

    #[test]
    fn test_rolling_resistance_reduces_friction() {
        let tyre = Tyre {
            mu: 1.0,
            rollres_loss: 1.0,
        };
        let sand = Surface {
            mu: 1.0,
            rollres: 3.0,
            ..Surface::default()
        };
        let params = tyre.add_contact(&contact(sand));
        assert!((params.friction - 1.0 / 3.0).abs() < 1e-6);
    }
}
