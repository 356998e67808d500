// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use gbi::{
    GbiResult, JointMap, Limb, MirrorController, MirrorServer, Pose, PoseSolver, RobotArms,
    RobotEnable, COMMAND_PORT, POSE_PORT,
};

/// Runs a mirror node against a simulated robot. The simulated arms accept every motion
/// and log it, which makes this node handy for testing hand trackers without hardware.
/// Stop it with Ctrl-C.
#[derive(Parser, Debug)]
#[clap(author, version, name = "mirror_server")]
struct CommandLineArguments {
    /// TCP port for the calibrate and enable services
    #[clap(long, default_value_t = COMMAND_PORT)]
    pub command_port: u16,
    /// UDP port for the hand pose stream
    #[clap(long, default_value_t = POSE_PORT)]
    pub pose_port: u16,
}

/// Arms that report a fixed endpoint pose and log every motion command.
struct SimulatedArms {
    endpoint: Pose,
}

impl RobotArms for SimulatedArms {
    fn endpoint_pose(&mut self, limb: Limb) -> GbiResult<Pose> {
        info!("endpoint pose of the {} arm requested", limb);
        Ok(self.endpoint)
    }

    fn move_to_joint_positions(&mut self, limb: Limb, joints: &JointMap) -> GbiResult<()> {
        info!("moving the {} arm to {:?}", limb, joints);
        Ok(())
    }
}

/// An enable surface that starts disabled, so the node restores the disabled state when
/// it shuts down.
struct SimulatedEnable;

impl RobotEnable for SimulatedEnable {
    fn is_enabled(&mut self) -> GbiResult<bool> {
        Ok(false)
    }

    fn enable(&mut self) -> GbiResult<()> {
        info!("robot enabled");
        Ok(())
    }

    fn disable(&mut self) -> GbiResult<()> {
        info!("robot disabled");
        Ok(())
    }
}

/// Pretends every pose is reachable and maps its position onto three shoulder joints.
struct SimulatedSolver;

impl PoseSolver for SimulatedSolver {
    fn solve(&mut self, limb: Limb, target: &Pose) -> GbiResult<JointMap> {
        let mut joints = JointMap::new();
        joints.insert(format!("{}_s0", limb), target.position.x);
        joints.insert(format!("{}_s1", limb), target.position.y);
        joints.insert(format!("{}_e0", limb), target.position.z);
        Ok(joints)
    }
}

fn main() -> GbiResult<()> {
    tracing_subscriber::fmt::init();
    let args = CommandLineArguments::parse();
    let arms = SimulatedArms {
        endpoint: Pose::from_parts([0.58, 0.18, 0.1], [0., 0., 0., 1.]),
    };
    let controller = MirrorController::new(arms, SimulatedSolver);
    let mut server = MirrorServer::bind(
        args.command_port,
        args.pose_port,
        SimulatedEnable,
        controller,
    )?;
    info!(
        "listening on TCP port {} and UDP port {}",
        server.command_port(),
        server.pose_port()
    );
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let flag = shutdown_requested.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)).unwrap();
    server.serve(&shutdown_requested)
}
