//! The closed set of attribute kinds exchanged through the hub.

use crate::convert::Handedness;

/// Attribute kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Time,
    Position,
    Quaternion,
    RelativeVelocity,
    JointRvalue,
    JointTvalue,
    JointLinearVelocity,
    JointAngularVelocity,
    JointForce,
    JointTorque,
    CmdJointRvalue,
    CmdJointTvalue,
    CmdJointLinearVelocity,
    CmdJointAngularVelocity,
    CmdJointForce,
    CmdJointTorque,
    JointPosition,
    JointQuaternion,
    Force,
    Torque,
}

/// All kinds, in wire-table order.
pub const ALL_ATTRIBUTES: [Attribute; 20] = [
    Attribute::Time,
    Attribute::Position,
    Attribute::Quaternion,
    Attribute::RelativeVelocity,
    Attribute::JointRvalue,
    Attribute::JointTvalue,
    Attribute::JointLinearVelocity,
    Attribute::JointAngularVelocity,
    Attribute::JointForce,
    Attribute::JointTorque,
    Attribute::CmdJointRvalue,
    Attribute::CmdJointTvalue,
    Attribute::CmdJointLinearVelocity,
    Attribute::CmdJointAngularVelocity,
    Attribute::CmdJointForce,
    Attribute::CmdJointTorque,
    Attribute::JointPosition,
    Attribute::JointQuaternion,
    Attribute::Force,
    Attribute::Torque,
];

impl Attribute {
    /// Returns the wire name of the attribute.
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Time => "time",
            Attribute::Position => "position",
            Attribute::Quaternion => "quaternion",
            Attribute::RelativeVelocity => "relative_velocity",
            Attribute::JointRvalue => "joint_rvalue",
            Attribute::JointTvalue => "joint_tvalue",
            Attribute::JointLinearVelocity => "joint_linear_velocity",
            Attribute::JointAngularVelocity => "joint_angular_velocity",
            Attribute::JointForce => "joint_force",
            Attribute::JointTorque => "joint_torque",
            Attribute::CmdJointRvalue => "cmd_joint_rvalue",
            Attribute::CmdJointTvalue => "cmd_joint_tvalue",
            Attribute::CmdJointLinearVelocity => "cmd_joint_linear_velocity",
            Attribute::CmdJointAngularVelocity => "cmd_joint_angular_velocity",
            Attribute::CmdJointForce => "cmd_joint_force",
            Attribute::CmdJointTorque => "cmd_joint_torque",
            Attribute::JointPosition => "joint_position",
            Attribute::JointQuaternion => "joint_quaternion",
            Attribute::Force => "force",
            Attribute::Torque => "torque",
        }
    }

    /// Looks up an attribute by its wire name.
    pub fn from_name(name: &str) -> Option<Attribute> {
        ALL_ATTRIBUTES.iter().copied().find(|a| a.name() == name)
    }

    /// Number of scalar axes carried by this attribute.
    pub fn arity(&self) -> usize {
        match self {
            Attribute::Time
            | Attribute::JointRvalue
            | Attribute::JointTvalue
            | Attribute::JointLinearVelocity
            | Attribute::JointAngularVelocity
            | Attribute::JointForce
            | Attribute::JointTorque
            | Attribute::CmdJointRvalue
            | Attribute::CmdJointTvalue
            | Attribute::CmdJointLinearVelocity
            | Attribute::CmdJointAngularVelocity
            | Attribute::CmdJointForce
            | Attribute::CmdJointTorque => 1,
            Attribute::Position | Attribute::JointPosition | Attribute::Force | Attribute::Torque => 3,
            Attribute::Quaternion | Attribute::JointQuaternion => 4,
            Attribute::RelativeVelocity => 6,
        }
    }

    /// The value vector a fresh registry entry starts with.
    ///
    /// Additive quantities (time, relative_velocity, force, torque) start at
    /// zero; state quantities start at NaN until a producer writes them.
    pub fn default_values(&self) -> Vec<f64> {
        match self {
            Attribute::Time => vec![0.0],
            Attribute::RelativeVelocity => vec![0.0; 6],
            Attribute::Force | Attribute::Torque => vec![0.0; 3],
            _ => vec![f64::NAN; self.arity()],
        }
    }

    /// Whether the attribute aggregates contributions from several producers.
    pub fn is_effort(&self) -> bool {
        matches!(self, Attribute::Force | Attribute::Torque)
    }

    /// Per-axis sign factors applied for the given coordinate convention.
    pub fn handedness_signs(&self, handedness: Handedness) -> &'static [f64] {
        const POS_RHS: [f64; 3] = [1.0, 1.0, 1.0];
        const POS_LHS: [f64; 3] = [1.0, -1.0, 1.0];
        const QUAT_RHS: [f64; 4] = [1.0, 1.0, 1.0, 1.0];
        const QUAT_LHS: [f64; 4] = [-1.0, 1.0, -1.0, 1.0];
        const JOINT_QUAT_LHS: [f64; 4] = [1.0, 1.0, -1.0, 1.0];
        const SCALAR_POS: [f64; 1] = [1.0];
        const SCALAR_NEG: [f64; 1] = [-1.0];
        const SIX_ONES: [f64; 6] = [1.0; 6];

        match (self, handedness) {
            (Attribute::Position, Handedness::Lhs)
            | (Attribute::JointPosition, Handedness::Lhs)
            | (Attribute::Force, Handedness::Lhs)
            | (Attribute::Torque, Handedness::Lhs) => &POS_LHS,
            (Attribute::Position, Handedness::Rhs)
            | (Attribute::JointPosition, Handedness::Rhs)
            | (Attribute::Force, Handedness::Rhs)
            | (Attribute::Torque, Handedness::Rhs) => &POS_RHS,
            (Attribute::Quaternion, Handedness::Lhs) => &QUAT_LHS,
            (Attribute::JointQuaternion, Handedness::Lhs) => &JOINT_QUAT_LHS,
            (Attribute::Quaternion, Handedness::Rhs) | (Attribute::JointQuaternion, Handedness::Rhs) => {
                &QUAT_RHS
            }
            (Attribute::JointRvalue, Handedness::Lhs)
            | (Attribute::JointTvalue, Handedness::Lhs)
            | (Attribute::CmdJointRvalue, Handedness::Lhs)
            | (Attribute::CmdJointTvalue, Handedness::Lhs) => &SCALAR_NEG,
            (Attribute::RelativeVelocity, _) => &SIX_ONES,
            _ => match self.arity() {
                1 => &SCALAR_POS,
                3 => &POS_RHS,
                4 => &QUAT_RHS,
                _ => &SIX_ONES,
            },
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for attribute in ALL_ATTRIBUTES {
            assert_eq!(Attribute::from_name(attribute.name()), Some(attribute));
        }
        assert_eq!(Attribute::from_name("unknown"), None);
        assert_eq!(Attribute::from_name(""), None);
    }

    #[test]
    fn test_default_arity_matches() {
        for attribute in ALL_ATTRIBUTES {
            assert_eq!(attribute.default_values().len(), attribute.arity());
            assert_eq!(attribute.handedness_signs(Handedness::Rhs).len(), attribute.arity());
            assert_eq!(attribute.handedness_signs(Handedness::Lhs).len(), attribute.arity());
        }
    }

    #[test]
    fn test_additive_defaults_are_zero() {
        assert_eq!(Attribute::Time.default_values(), vec![0.0]);
        assert_eq!(Attribute::Force.default_values(), vec![0.0, 0.0, 0.0]);
        assert_eq!(Attribute::Torque.default_values(), vec![0.0, 0.0, 0.0]);
        assert_eq!(Attribute::RelativeVelocity.default_values(), vec![0.0; 6]);
        assert!(Attribute::Position.default_values().iter().all(|v| v.is_nan()));
        assert!(Attribute::JointLinearVelocity.default_values()[0].is_nan());
    }

    #[test]
    fn test_rhs_signs_are_identity() {
        for attribute in ALL_ATTRIBUTES {
            assert!(attribute
                .handedness_signs(Handedness::Rhs)
                .iter()
                .all(|s| *s == 1.0));
        }
    }

    #[test]
    fn test_lhs_sign_patterns() {
        assert_eq!(Attribute::Position.handedness_signs(Handedness::Lhs), &[1.0, -1.0, 1.0]);
        assert_eq!(
            Attribute::Quaternion.handedness_signs(Handedness::Lhs),
            &[-1.0, 1.0, -1.0, 1.0]
        );
        assert_eq!(
            Attribute::JointQuaternion.handedness_signs(Handedness::Lhs),
            &[1.0, 1.0, -1.0, 1.0]
        );
        assert_eq!(Attribute::JointRvalue.handedness_signs(Handedness::Lhs), &[-1.0]);
        assert_eq!(Attribute::JointLinearVelocity.handedness_signs(Handedness::Lhs), &[1.0]);
        assert_eq!(Attribute::Force.handedness_signs(Handedness::Lhs), &[1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_efforts() {
        assert!(Attribute::Force.is_effort());
        assert!(Attribute::Torque.is_effort());
        assert!(!Attribute::JointForce.is_effort());
        assert!(!Attribute::CmdJointTorque.is_effort());
    }
}
