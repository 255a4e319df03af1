//! Unit and handedness conversion between client frames and canonical SI.
//!
//! Every session gets one [`ConversionTable`] built from its declared units.
//! The table maps each attribute kind to a per-axis scale such that
//! `canonical = client_value * scale` and `client_value = canonical / scale`.

use crate::attribute::{Attribute, ALL_ATTRIBUTES};
use crate::error::CoreError;
use crate::meta::RequestMetaData;

/// Coordinate convention declared by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Rhs,
    Lhs,
}

impl Handedness {
    pub fn name(&self) -> &'static str {
        match self {
            Handedness::Rhs => "rhs",
            Handedness::Lhs => "lhs",
        }
    }

    pub fn from_name(name: &str) -> Option<Handedness> {
        match name {
            "rhs" => Some(Handedness::Rhs),
            "lhs" => Some(Handedness::Lhs),
            _ => None,
        }
    }
}

/// SI scale factor for a unit token.
///
/// The table is preserved verbatim from the wire protocol, including the
/// historical `us` and `mg` factors of 1e-5.
pub fn unit_scale(token: &str) -> Option<f64> {
    match token {
        "s" => Some(1.0),
        "ms" => Some(0.001),
        "us" => Some(0.00001),
        "m" => Some(1.0),
        "cm" => Some(0.01),
        "rad" => Some(1.0),
        "deg" => Some(std::f64::consts::PI / 180.0),
        "mg" => Some(0.00001),
        "g" => Some(0.001),
        "kg" => Some(1.0),
        _ => None,
    }
}

/// The unit system a session declared in its request meta-data.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSystem {
    pub length: f64,
    pub angle: f64,
    pub mass: f64,
    pub time: f64,
    pub handedness: Handedness,
}

impl UnitSystem {
    /// Resolves a request's unit fields, filling absent fields with the
    /// protocol defaults (m, rad, kg, s, rhs). Unknown tokens are rejected.
    pub fn from_request(request: &RequestMetaData) -> Result<UnitSystem, CoreError> {
        let resolve = |field: &Option<String>, default: &str| -> Result<f64, CoreError> {
            let token = field.as_deref().unwrap_or(default);
            unit_scale(token).ok_or_else(|| CoreError::UnknownUnit(token.to_string()))
        };

        let handedness_token = request.handedness.as_deref().unwrap_or("rhs");
        let handedness = Handedness::from_name(handedness_token)
            .ok_or_else(|| CoreError::UnknownUnit(handedness_token.to_string()))?;

        Ok(UnitSystem {
            length: resolve(&request.length_unit, "m")?,
            angle: resolve(&request.angle_unit, "rad")?,
            mass: resolve(&request.mass_unit, "kg")?,
            time: resolve(&request.time_unit, "s")?,
            handedness,
        })
    }
}

impl Default for UnitSystem {
    fn default() -> Self {
        UnitSystem {
            length: 1.0,
            angle: 1.0,
            mass: 1.0,
            time: 1.0,
            handedness: Handedness::Rhs,
        }
    }
}

/// Per-session scale vectors, one per attribute kind.
#[derive(Debug, Clone)]
pub struct ConversionTable {
    scales: Vec<Vec<f64>>,
}

impl ConversionTable {
    /// Builds the scale table for a unit system.
    pub fn build(units: &UnitSystem) -> ConversionTable {
        let mut scales: Vec<Vec<f64>> = ALL_ATTRIBUTES
            .iter()
            .map(|attribute| {
                let scale = match attribute {
                    Attribute::Time => units.time,
                    Attribute::Position | Attribute::JointTvalue | Attribute::JointPosition => {
                        units.length
                    }
                    Attribute::Quaternion | Attribute::JointQuaternion => 1.0,
                    Attribute::JointRvalue => units.angle,
                    Attribute::JointLinearVelocity => units.length / units.time,
                    Attribute::JointAngularVelocity => units.angle / units.time,
                    Attribute::JointForce | Attribute::Force => {
                        units.mass * units.length / (units.time * units.time)
                    }
                    Attribute::JointTorque | Attribute::Torque => {
                        units.mass * units.length * units.length / (units.time * units.time)
                    }
                    // cmd_* variants copy their counterparts below;
                    // relative_velocity is split per axis below.
                    _ => 1.0,
                };
                vec![scale; attribute.arity()]
            })
            .collect();

        scales[Attribute::CmdJointRvalue as usize] = scales[Attribute::JointRvalue as usize].clone();
        scales[Attribute::CmdJointTvalue as usize] = scales[Attribute::JointTvalue as usize].clone();
        scales[Attribute::CmdJointLinearVelocity as usize] =
            scales[Attribute::JointLinearVelocity as usize].clone();
        scales[Attribute::CmdJointAngularVelocity as usize] =
            scales[Attribute::JointAngularVelocity as usize].clone();
        // cmd_joint_force and cmd_joint_torque take their scale from the
        // object-level force/torque dimension but stay scalar on the wire.
        scales[Attribute::CmdJointForce as usize] =
            scales[Attribute::Force as usize][..Attribute::CmdJointForce.arity()].to_vec();
        scales[Attribute::CmdJointTorque as usize] =
            scales[Attribute::Torque as usize][..Attribute::CmdJointTorque.arity()].to_vec();

        let relative = &mut scales[Attribute::RelativeVelocity as usize];
        for axis in 0..3 {
            relative[axis] = units.length / units.time;
        }
        for axis in 3..6 {
            relative[axis] = units.angle / units.time;
        }

        for attribute in ALL_ATTRIBUTES {
            let signs = attribute.handedness_signs(units.handedness);
            for (scale, sign) in scales[attribute as usize].iter_mut().zip(signs) {
                *scale *= sign;
            }
        }

        ConversionTable { scales }
    }

    /// Per-axis scale vector for an attribute kind.
    pub fn scale(&self, attribute: Attribute) -> &[f64] {
        &self.scales[attribute as usize]
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        ConversionTable::build(&UnitSystem::default())
    }
}
