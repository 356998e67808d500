// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # libgbi-rs
//! libgbi-rs is a library for teleoperating dual-arm research robots by mirroring the
//! motion of a tracked hand onto one arm, and for replaying recorded trajectories.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE MIRRORING!**
//!
//!
//! ## Design
//! One mirror node owns the robot. Everything else, the hand tracker in front of the
//! operator as well as the state machine which replays recorded motions, talks to the
//! node through small blocking clients.
//!
//! The library is divided into three main Modules:
//! * [mirror](`crate::mirror`) - contains the calibration, the start/stop state machine
//!   and the pose relay of the mirror node.
//! * [playback](`crate::playback`) - hands recorded trajectories to the playback action
//!   server and tracks their progress.
//! * [robot](`crate::robot`) - contains the limbs, poses and the robot traits which the
//!   other modules are built on.
//!
//! # Example:
//!```no_run
//! use gbi::{MirrorClient, Pose, PoseSample, ServiceStatus, COMMAND_PORT, POSE_PORT};
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = MirrorClient::connect("mirror-bs.de", COMMAND_PORT, POSE_PORT)?;
//!     let hand_at_rest = Pose::from_parts([0.45, 0.25, 0.3], [0., 0., 0., 1.]);
//!     assert_eq!(client.calibrate("left", &hand_at_rest)?, ServiceStatus::Success);
//!     assert_eq!(client.set_mirroring(1)?, ServiceStatus::Success);
//!     for step in 0..1000 {
//!         let wave = 0.1 * f64::sin(step as f64 / 50.);
//!         let sample = PoseSample::new([0.45, 0.25 + wave, 0.3], [0., 0., 0., 1.]);
//!         client.publish_pose(&sample)?;
//!         std::thread::sleep(std::time::Duration::from_millis(10));
//!     }
//!     assert_eq!(client.set_mirroring(0)?, ServiceStatus::Success);
//!     Ok(())
//! }
//!```
//!
//! The service calls return a [`GbiResult`] so eventual errors, "Connection refused"
//! for example, are forwarded with the "?".
//!
//!```no_run
//! # use gbi::{MirrorClient, COMMAND_PORT, POSE_PORT};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = MirrorClient::connect("mirror-bs.de", COMMAND_PORT, POSE_PORT)?;
//! # Ok(())
//! # }
//! ```
//! connects with the mirror node. You can either provide an IP Address or a hostname.
//! The service calls go over a TCP connection with keepalive, the pose stream goes over
//! UDP to the second port.
//!
//! ```no_run
//! # use gbi::{MirrorClient, Pose, COMMAND_PORT, POSE_PORT};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut client = MirrorClient::connect("mirror-bs.de", COMMAND_PORT, POSE_PORT)?;
//! let hand_at_rest = Pose::from_parts([0.45, 0.25, 0.3], [0., 0., 0., 1.]);
//! client.calibrate("left", &hand_at_rest)?;
//! # Ok(())
//! # }
//! ```
//! pairs the current hand pose with the current endpoint pose of the left arm. From now
//! on the node knows where "at rest" is on both sides of the mirror.
//!
//! ```no_run
//! # use gbi::{MirrorClient, PoseSample, COMMAND_PORT, POSE_PORT};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut client = MirrorClient::connect("mirror-bs.de", COMMAND_PORT, POSE_PORT)?;
//! client.set_mirroring(1)?;
//! client.publish_pose(&PoseSample::new([0.5, 0.25, 0.3], [0., 0., 0., 1.]))?;
//! # Ok(())
//! # }
//! ```
//! starts the mirroring and streams hand poses. The node moves the calibrated arm by the
//! offset of each sample from the calibrated hand pose, so this sample moves the arm
//! 5 centimeters along x. Samples the arm cannot reach are dropped with a warning.
//! Publishing is fire and forget, only the service calls block.
//!
//! Stopping with `client.set_mirroring(0)?` also invalidates the calibration. A new
//! session has to calibrate again before it can start.
//!
//! The node side is a [`MirrorServer`] built from the robot traits
//! [`RobotArms`](`crate::robot::RobotArms`) and [`RobotEnable`](`crate::robot::RobotEnable`)
//! and an inverse kinematics [`PoseSolver`](`crate::solver::PoseSolver`), see the
//! mirror_server example. Recorded trajectories are played through a
//! [`PlayState`](`crate::playback::PlayState`) which submits one file at a time to the
//! playback action server and delivers exactly one outcome per entry, see the
//! play_recorded_motion example.
pub mod exception;
pub mod mirror;
mod network;
pub mod playback;
pub mod robot;
pub mod solver;

pub use exception::GbiResult;
pub use mirror::server::MirrorServer;
pub use mirror::service_types::PoseSample;
pub use mirror::service_types::ServiceStatus;
pub use mirror::service_types::COMMAND_PORT;
pub use mirror::service_types::POSE_PORT;
pub use mirror::CalibrationRecord;
pub use mirror::MirrorController;
pub use mirror::MirrorMode;
pub use mirror::SessionState;
pub use network::Inbound;
pub use network::MirrorClient;
pub use network::ServiceEndpoint;
pub use playback::handle::goal_channel;
pub use playback::handle::PlaybackHandle;
pub use playback::handle::PlaybackReporter;
pub use playback::types::PlaybackEvent;
pub use playback::types::PlaybackFeedback;
pub use playback::types::PlaybackGoal;
pub use playback::types::PlaybackResult;
pub use playback::PauseService;
pub use playback::PlayOutcome;
pub use playback::PlayState;
pub use playback::PlaybackClient;
pub use robot::JointMap;
pub use robot::Limb;
pub use robot::Pose;
pub use robot::RobotArms;
pub use robot::RobotEnable;
pub use solver::PoseSolver;
