// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Value types for the dual-arm robot and the trait seams behind which its vendor SDK lives.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::{Quaternion, Vector3};

use crate::exception::{GbiException, GbiResult};

/// One of the two arms of the robot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Limb {
    Left,
    Right,
}

impl Limb {
    /// Name of the limb as it appears on the wire and in the vendor SDK.
    pub fn name(&self) -> &'static str {
        match self {
            Limb::Left => "left",
            Limb::Right => "right",
        }
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Limb {
    type Err = GbiException;

    /// Parses a limb name. Only the exact strings `"left"` and `"right"` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Limb::Left),
            "right" => Ok(Limb::Right),
            _ => Err(GbiException::InvalidLimb {
                limb: s.to_string(),
            }),
        }
    }
}

/// Cartesian end-effector pose.
///
/// The orientation is kept as a plain quaternion. This crate never renormalizes it, so
/// poses produced by arithmetic on calibration offsets may carry non-unit quaternions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    /// Position in meters.
    pub position: Vector3<f64>,
    /// Orientation quaternion.
    pub orientation: Quaternion<f64>,
}

impl Pose {
    /// Builds a pose from a position array and a quaternion array in x, y, z, w order.
    pub fn from_parts(position: [f64; 3], orientation: [f64; 4]) -> Self {
        Pose {
            position: Vector3::from(position),
            orientation: Quaternion::new(
                orientation[3],
                orientation[0],
                orientation[1],
                orientation[2],
            ),
        }
    }

    /// Returns the position array and the quaternion array in x, y, z, w order.
    pub fn to_parts(&self) -> ([f64; 3], [f64; 4]) {
        (
            [self.position.x, self.position.y, self.position.z],
            [
                self.orientation.i,
                self.orientation.j,
                self.orientation.k,
                self.orientation.w,
            ],
        )
    }
}

/// Joint-space configuration the way the vendor SDK takes it: joint name to angle in radians.
pub type JointMap = BTreeMap<String, f64>;

/// Actuator surface of the robot arms.
///
/// Implementations wrap the vendor SDK. Both methods block until the SDK call returns.
#[cfg_attr(test, mockall::automock)]
pub trait RobotArms {
    /// Returns the current end-effector pose of a limb.
    fn endpoint_pose(&mut self, limb: Limb) -> GbiResult<Pose>;
    /// Commands a limb to the given joint configuration and blocks until the motion
    /// finishes or the SDK reports a failure.
    fn move_to_joint_positions(&mut self, limb: Limb, joints: &JointMap) -> GbiResult<()>;
}

/// Enable surface of the vendor SDK.
#[cfg_attr(test, mockall::automock)]
pub trait RobotEnable {
    /// Reads whether the robot is currently enabled.
    fn is_enabled(&mut self) -> GbiResult<bool>;
    /// Enables the robot.
    fn enable(&mut self) -> GbiResult<()>;
    /// Disables the robot.
    fn disable(&mut self) -> GbiResult<()>;
}
