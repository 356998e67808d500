// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the mirroring session: calibration, arming and the pose relay.
pub mod server;
pub mod service_types;

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use tracing::{error, info, warn};

use crate::exception::{GbiException, GbiResult};
use crate::robot::{Limb, Pose, RobotArms};
use crate::solver::PoseSolver;

/// Requested mirroring state, as carried by the wire mode byte.
#[derive(FromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MirrorMode {
    Stop = 0,
    Start = 1,
}

impl MirrorMode {
    /// Parses the wire mode byte: 1 starts, 0 stops, anything else is invalid.
    pub fn from_mode_byte(mode: u8) -> GbiResult<MirrorMode> {
        MirrorMode::from_u8(mode).ok_or(GbiException::InvalidMode { mode })
    }
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            MirrorMode::Start => "started",
            MirrorMode::Stop => "stopped",
        })
    }
}

/// Snapshot of the session flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Pose samples are relayed only while this is set.
    pub armed: bool,
    /// A calibration record exists. Armed implies calibrated.
    pub calibrated: bool,
}

/// Reference poses taken at calibration time.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CalibrationRecord {
    /// The limb whose motion mirrors the hand.
    pub limb: Limb,
    /// Tracked hand pose at the calibration instant.
    pub hand: Pose,
    /// Robot end-effector pose at the calibration instant.
    pub robot: Pose,
}

struct MirrorSession<A, S> {
    arms: A,
    solver: S,
    armed: bool,
    calibration: Option<CalibrationRecord>,
}

/// The mirroring session of one node.
///
/// Owns the actuator and the solver seam and guards all session state behind a single
/// lock, so a calibration, a state change and a pose relay (including its blocking
/// solver and move calls) always serialize against each other.
pub struct MirrorController<A: RobotArms, S: PoseSolver> {
    session: Mutex<MirrorSession<A, S>>,
}

impl<A: RobotArms, S: PoseSolver> MirrorController<A, S> {
    pub fn new(arms: A, solver: S) -> MirrorController<A, S> {
        MirrorController {
            session: Mutex::new(MirrorSession {
                arms,
                solver,
                armed: false,
                calibration: None,
            }),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, MirrorSession<A, S>> {
        match self.session.lock() {
            Ok(guard) => guard,
            // a handler that panicked must not wedge the node, the session data is still there
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records the calibration reference poses for a limb.
    ///
    /// Queries the limb's current end-effector pose and stores it together with the
    /// given hand pose. A second calibration overwrites the first. Calibrating never
    /// arms or disarms the session.
    ///
    /// # Errors
    /// * [`ServiceException`](`crate::exception::GbiException::ServiceException`) if the
    ///   end-effector pose query fails. The previous record stays untouched.
    pub fn calibrate(&self, limb: Limb, hand_pose: Pose) -> GbiResult<()> {
        let mut session = self.lock_session();
        let robot_pose = session.arms.endpoint_pose(limb)?;
        session.calibration = Some(CalibrationRecord {
            limb,
            hand: hand_pose,
            robot: robot_pose,
        });
        info!("Calibration completed!");
        Ok(())
    }

    /// Arms or disarms the pose relay.
    ///
    /// Starting requires a calibration record. Stopping invalidates the record, so a
    /// fresh calibration has to precede every start.
    ///
    /// # Errors
    /// * [`NotCalibrated`](`crate::exception::GbiException::NotCalibrated`) if starting
    ///   without a calibration record
    /// * [`AlreadyInState`](`crate::exception::GbiException::AlreadyInState`) if the
    ///   session is already in the requested state
    ///
    /// Failed requests never change the session.
    pub fn set_mirroring(&self, mode: MirrorMode) -> GbiResult<()> {
        let mut session = self.lock_session();
        match mode {
            MirrorMode::Start => {
                if session.calibration.is_none() {
                    warn!("You need to calibrate first!");
                    return Err(GbiException::NotCalibrated);
                }
                if session.armed {
                    warn!("Mirroring has already started!");
                    return Err(GbiException::AlreadyInState { mode });
                }
                session.armed = true;
                info!("Mirroring Started!");
            }
            MirrorMode::Stop => {
                if !session.armed {
                    warn!("Mirroring has already stopped!");
                    return Err(GbiException::AlreadyInState { mode });
                }
                session.armed = false;
                session.calibration = None;
                info!("Mirroring Stopped!");
            }
        }
        Ok(())
    }

    /// Relays one tracked hand pose to the robot.
    ///
    /// Samples arriving while the session is not armed are dropped. For an armed
    /// session the target pose is the calibrated robot pose plus the hand's offset
    /// from its own calibrated pose, applied component-wise to the position and to
    /// all four quaternion components. The resulting quaternion is not renormalized.
    ///
    /// The joint solution is requested for the left arm; the move command goes to the
    /// calibrated limb. An unreachable target or a failed collaborator call drops the
    /// sample and leaves the session armed.
    ///
    /// Blocks for the duration of the solver call and the move.
    pub fn relay_pose(&self, sample: &Pose) {
        let mut session = self.lock_session();
        let session = &mut *session;
        if !session.armed {
            return;
        }
        let calibration = match &session.calibration {
            Some(calibration) => calibration,
            None => return,
        };
        let target = Pose {
            position: calibration.robot.position + (sample.position - calibration.hand.position),
            orientation: calibration.robot.orientation
                + (sample.orientation - calibration.hand.orientation),
        };
        match session.solver.solve(Limb::Left, &target) {
            Ok(joints) => {
                if let Err(e) = session
                    .arms
                    .move_to_joint_positions(calibration.limb, &joints)
                {
                    error!("Error during Inverse Kinematic problem: {}", e);
                }
            }
            Err(GbiException::UnreachableGoal) => warn!("Cannot reach the goal"),
            Err(e) => error!("Error during Inverse Kinematic problem: {}", e),
        }
    }

    /// Snapshot of the session flags.
    pub fn session_state(&self) -> SessionState {
        let session = self.lock_session();
        SessionState {
            armed: session.armed,
            calibrated: session.calibration.is_some(),
        }
    }

    /// The active calibration record, if any.
    pub fn calibration(&self) -> Option<CalibrationRecord> {
        self.lock_session().calibration
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::exception::GbiException;
    use crate::mirror::{CalibrationRecord, MirrorController, MirrorMode, SessionState};
    use crate::robot::{JointMap, Limb, MockRobotArms, Pose};
    use crate::solver::MockPoseSolver;

    fn identity_quaternion() -> [f64; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }

    fn joint_solution() -> JointMap {
        vec![
            ("left_s0".to_string(), 0.12),
            ("left_s1".to_string(), -0.55),
            ("left_e0".to_string(), 0.0),
            ("left_e1".to_string(), 1.26),
            ("left_w0".to_string(), 0.0),
            ("left_w1".to_string(), 0.39),
            ("left_w2".to_string(), 0.0),
        ]
        .into_iter()
        .collect()
    }

    /// Solver double that records every target it was asked to solve.
    fn capturing_solver(captured: Arc<Mutex<Vec<(Limb, Pose)>>>) -> MockPoseSolver {
        let mut solver = MockPoseSolver::new();
        solver.expect_solve().returning(move |limb, target| {
            captured.lock().unwrap().push((limb, *target));
            Ok(joint_solution())
        });
        solver
    }

    #[test]
    fn mode_byte_parses_only_start_and_stop() {
        assert_eq!(MirrorMode::from_mode_byte(1).unwrap(), MirrorMode::Start);
        assert_eq!(MirrorMode::from_mode_byte(0).unwrap(), MirrorMode::Stop);
        for &byte in &[2_u8, 7, 255] {
            match MirrorMode::from_mode_byte(byte) {
                Err(GbiException::InvalidMode { mode }) => assert_eq!(mode, byte),
                _ => panic!("expected InvalidMode for {}", byte),
            }
        }
    }

    #[test]
    fn mirroring_requires_calibration_first() {
        let controller = MirrorController::new(MockRobotArms::new(), MockPoseSolver::new());
        match controller.set_mirroring(MirrorMode::Start) {
            Err(GbiException::NotCalibrated) => {}
            _ => panic!("expected NotCalibrated"),
        }
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: false,
                calibrated: false
            }
        );
    }

    #[test]
    fn arming_follows_calibration() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose()
            .times(1)
            .returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: false,
                calibrated: true
            }
        );
        controller.set_mirroring(MirrorMode::Start).unwrap();
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: true,
                calibrated: true
            }
        );
    }

    #[test]
    fn starting_twice_is_rejected() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        match controller.set_mirroring(MirrorMode::Start) {
            Err(GbiException::AlreadyInState {
                mode: MirrorMode::Start,
            }) => {}
            _ => panic!("expected AlreadyInState"),
        }
        // the failed request must not have disarmed the session
        assert!(controller.session_state().armed);
    }

    #[test]
    fn stopping_an_unarmed_session_is_rejected() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        match controller.set_mirroring(MirrorMode::Stop) {
            Err(GbiException::AlreadyInState {
                mode: MirrorMode::Stop,
            }) => {}
            _ => panic!("expected AlreadyInState"),
        }
        // calibrated but unarmed: stop is still rejected and keeps the record
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        assert!(controller.set_mirroring(MirrorMode::Stop).is_err());
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: false,
                calibrated: true
            }
        );
    }

    #[test]
    fn stopping_invalidates_the_calibration() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        controller.set_mirroring(MirrorMode::Stop).unwrap();
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: false,
                calibrated: false
            }
        );
        assert!(controller.calibration().is_none());
        // restarting needs a fresh calibration
        match controller.set_mirroring(MirrorMode::Start) {
            Err(GbiException::NotCalibrated) => {}
            _ => panic!("expected NotCalibrated"),
        }
    }

    #[test]
    fn second_calibration_overwrites_the_first() {
        let mut arms = MockRobotArms::new();
        let robot_poses = [
            Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion()),
            Pose::from_parts([2.0, 0.5, 0.75], [0.1, 0.2, 0.3, 0.9]),
        ];
        let calls = Arc::new(Mutex::new(0_usize));
        arms.expect_endpoint_pose().times(2).returning(move |_| {
            let mut calls = calls.lock().unwrap();
            let pose = robot_poses[*calls];
            *calls += 1;
            Ok(pose)
        });
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let first_hand = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        let second_hand = Pose::from_parts([0.5, 0.5, 0.5], [0.0, 0.1, 0.0, 0.9]);
        controller.calibrate(Limb::Left, first_hand).unwrap();
        controller.calibrate(Limb::Right, second_hand).unwrap();
        assert_eq!(
            controller.calibration(),
            Some(CalibrationRecord {
                limb: Limb::Right,
                hand: second_hand,
                robot: robot_poses[1],
            })
        );
    }

    #[test]
    fn calibrating_while_armed_keeps_the_session_armed() {
        let mut arms = MockRobotArms::new();
        let robot_poses = [
            Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion()),
            Pose::from_parts([0.5, 0.5, 0.5], identity_quaternion()),
        ];
        let calls = Arc::new(Mutex::new(0_usize));
        arms.expect_endpoint_pose().times(2).returning(move |_| {
            let mut calls = calls.lock().unwrap();
            let pose = robot_poses[*calls];
            *calls += 1;
            Ok(pose)
        });
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        let raised_hand = Pose::from_parts([0.0, 0.0, 0.4], identity_quaternion());
        controller.calibrate(Limb::Left, raised_hand).unwrap();
        assert_eq!(
            controller.session_state(),
            SessionState {
                armed: true,
                calibrated: true
            }
        );
        assert_eq!(
            controller.calibration(),
            Some(CalibrationRecord {
                limb: Limb::Left,
                hand: raised_hand,
                robot: robot_poses[1],
            })
        );
    }

    #[test]
    fn unarmed_samples_are_dropped() {
        let mut solver = MockPoseSolver::new();
        solver.expect_solve().times(0);
        let mut arms = MockRobotArms::new();
        arms.expect_move_to_joint_positions().times(0);
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, solver);
        let sample = Pose::from_parts([0.1, 0.2, 0.3], identity_quaternion());
        // neither calibrated nor armed
        controller.relay_pose(&sample);
        // calibrated but not armed
        controller
            .calibrate(
                Limb::Left,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.relay_pose(&sample);
    }

    #[test]
    fn unreachable_goal_drops_the_sample_and_stays_armed() {
        let mut solver = MockPoseSolver::new();
        solver
            .expect_solve()
            .times(2)
            .returning(|_, _| Err(GbiException::UnreachableGoal));
        let mut arms = MockRobotArms::new();
        arms.expect_move_to_joint_positions().times(0);
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, solver);
        controller
            .calibrate(
                Limb::Left,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        let sample = Pose::from_parts([5.0, 5.0, 5.0], identity_quaternion());
        controller.relay_pose(&sample);
        assert!(controller.session_state().armed);
        // the next sample is still relayed
        controller.relay_pose(&sample);
    }

    #[test]
    fn solver_transport_failure_drops_the_sample() {
        let mut solver = MockPoseSolver::new();
        solver.expect_solve().times(1).returning(|_, _| {
            Err(GbiException::ServiceException {
                message: "solver is gone".to_string(),
            })
        });
        let mut arms = MockRobotArms::new();
        arms.expect_move_to_joint_positions().times(0);
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        let controller = MirrorController::new(arms, solver);
        controller
            .calibrate(
                Limb::Left,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        controller.relay_pose(&Pose::from_parts([0.1, 0.0, 0.0], identity_quaternion()));
        assert!(controller.session_state().armed);
    }

    #[test]
    fn move_failure_leaves_the_session_armed() {
        let mut solver = MockPoseSolver::new();
        solver
            .expect_solve()
            .times(2)
            .returning(|_, _| Ok(joint_solution()));
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        arms.expect_move_to_joint_positions()
            .times(2)
            .returning(|_, _| {
                Err(GbiException::ServiceException {
                    message: "actuator timeout".to_string(),
                })
            });
        let controller = MirrorController::new(arms, solver);
        controller
            .calibrate(
                Limb::Left,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        let sample = Pose::from_parts([0.1, 0.0, 0.0], identity_quaternion());
        controller.relay_pose(&sample);
        assert!(controller.session_state().armed);
        controller.relay_pose(&sample);
    }

    #[test]
    fn offset_is_applied_to_every_component() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], [0.5, 0.5, 0.5, 0.5]);
        arms.expect_endpoint_pose().returning(move |_| Ok(robot_pose));
        arms.expect_move_to_joint_positions()
            .returning(|_, _| Ok(()));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let solver = capturing_solver(captured.clone());
        let controller = MirrorController::new(arms, solver);
        let hand_pose = Pose::from_parts([0.5, -0.5, 0.25], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        let sample = Pose::from_parts([0.6, -0.4, 0.35], [0.1, 0.0, 0.0, 1.0]);
        controller.relay_pose(&sample);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (_, target) = captured[0];
        let (position, orientation) = target.to_parts();
        // component-wise addition of the offsets, in the exact same operation order
        assert_eq!(position[0], 1.0 + (0.6 - 0.5));
        assert_eq!(position[1], 1.0 + (-0.4 - (-0.5)));
        assert_eq!(position[2], 1.0 + (0.35 - 0.25));
        assert_eq!(orientation[0], 0.5 + (0.1 - 0.0));
        assert_eq!(orientation[1], 0.5);
        assert_eq!(orientation[2], 0.5);
        assert_eq!(orientation[3], 0.5 + (1.0 - 1.0));
        // the quaternion is carried as-is, no renormalization
        let norm_squared: f64 = orientation.iter().map(|c| c * c).sum();
        assert!((norm_squared - 1.0).abs() > 0.05);
    }

    #[test]
    fn solver_is_asked_for_the_left_arm_even_when_right_is_calibrated() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose()
            .withf(|limb| *limb == Limb::Right)
            .returning(move |_| Ok(robot_pose));
        arms.expect_move_to_joint_positions()
            .withf(|limb, _| *limb == Limb::Right)
            .times(1)
            .returning(|_, _| Ok(()));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let solver = capturing_solver(captured.clone());
        let controller = MirrorController::new(arms, solver);
        controller
            .calibrate(
                Limb::Right,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        controller.relay_pose(&Pose::from_parts([0.1, 0.0, 0.0], identity_quaternion()));

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, Limb::Left);
    }

    #[test]
    fn relay_moves_the_robot_by_the_hand_offset() {
        let expected_target = Pose::from_parts([1.1, 1.0, 1.0], identity_quaternion());
        let expected_joints = joint_solution();
        let mut solver = MockPoseSolver::new();
        solver
            .expect_solve()
            .withf(move |limb, target| *limb == Limb::Left && *target == expected_target)
            .times(1)
            .returning(|_, _| Ok(joint_solution()));
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        arms.expect_endpoint_pose()
            .times(1)
            .returning(move |_| Ok(robot_pose));
        arms.expect_move_to_joint_positions()
            .withf(move |limb, joints| *limb == Limb::Left && *joints == expected_joints)
            .times(1)
            .returning(|_, _| Ok(()));
        let controller = MirrorController::new(arms, solver);
        controller
            .calibrate(
                Limb::Left,
                Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion()),
            )
            .unwrap();
        controller.set_mirroring(MirrorMode::Start).unwrap();
        controller.relay_pose(&Pose::from_parts([0.1, 0.0, 0.0], identity_quaternion()));
    }

    #[test]
    fn calibration_query_failure_keeps_the_old_record() {
        let mut arms = MockRobotArms::new();
        let robot_pose = Pose::from_parts([1.0, 1.0, 1.0], identity_quaternion());
        let calls = Arc::new(Mutex::new(0_usize));
        arms.expect_endpoint_pose().times(2).returning(move |_| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(robot_pose)
            } else {
                Err(GbiException::ServiceException {
                    message: "robot is gone".to_string(),
                })
            }
        });
        let controller = MirrorController::new(arms, MockPoseSolver::new());
        let hand_pose = Pose::from_parts([0.0, 0.0, 0.0], identity_quaternion());
        controller.calibrate(Limb::Left, hand_pose).unwrap();
        let record = controller.calibration();
        match controller.calibrate(Limb::Right, hand_pose) {
            Err(GbiException::ServiceException { .. }) => {}
            _ => panic!("expected ServiceException"),
        }
        assert_eq!(controller.calibration(), record);
    }
}
