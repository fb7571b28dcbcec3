//! Physics boundary
//!
//! A full rigid body engine plugs in through [`Physics`]; the default
//! [`Kinematic`] integrator only moves objects by their velocity.

use crate::abi::{Real, Vector};
use crate::object::{ObjectData, ObjectKind};

/// Advances object motion by one step
pub trait Physics: Send {
    fn step(&mut self, dt: Real, gravity: Vector, objects: &mut dyn Iterator<Item = &mut ObjectData>);
}

/// Explicit Euler integration without collisions
#[derive(Debug, Clone, Copy, Default)]
pub struct Kinematic;

impl Physics for Kinematic {
    fn step(&mut self, dt: Real, gravity: Vector, objects: &mut dyn Iterator<Item = &mut ObjectData>) {
        for data in objects {
            match data.kind {
                ObjectKind::Static => {}
                ObjectKind::Pinned => {
                    data.rotation += data.angular_velocity * dt;
                }
                ObjectKind::Dynamic => {
                    let acceleration = if data.mass > 0.0 {
                        data.force / data.mass + gravity
                    } else {
                        gravity
                    };
                    data.velocity += acceleration * dt;
                    data.position += data.velocity * dt;
                    data.rotation += data.angular_velocity * dt;
                }
            }
        }
    }
}
