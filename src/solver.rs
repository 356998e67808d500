// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the seam to the external inverse kinematics service.
use crate::exception::GbiResult;
use crate::robot::{JointMap, Limb, Pose};

/// Inverse kinematics service used by the pose relay.
///
/// The solver is a black box reachable over the middleware. It either returns a full
/// joint configuration for the requested limb or reports that the target cannot be
/// reached.
#[cfg_attr(test, mockall::automock)]
pub trait PoseSolver {
    /// Requests a joint solution that brings the limb's end effector to the target pose.
    /// Blocks until the service answers.
    ///
    /// # Errors
    /// * [`UnreachableGoal`](`crate::exception::GbiException::UnreachableGoal`) if the
    ///   solver reports that no joint solution exists for the target
    /// * [`ServiceException`](`crate::exception::GbiException::ServiceException`) if the
    ///   service call itself fails
    fn solve(&mut self, limb: Limb, target: &Pose) -> GbiResult<JointMap>;
}
