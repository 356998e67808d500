// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the mirror node: enable lifecycle, request dispatch and the pose fan-in.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::Token;
use tracing::{error, info};

use crate::exception::{GbiException, GbiResult};
use crate::mirror::service_types::{
    CalibrateRequest, EnableMirroringRequest, MirrorCommandEnum, MirrorCommandHeader,
    ServiceStatus,
};
use crate::mirror::{MirrorController, MirrorMode};
use crate::network::{try_deserialize, Inbound, ServiceEndpoint};
use crate::robot::{Limb, RobotArms, RobotEnable};
use crate::solver::PoseSolver;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One mirror node: the service endpoint, the session and the robot enable surface.
///
/// The node records the robot's enable state at startup, enables the robot for the
/// whole serving period and disables it on shutdown only if it was disabled before.
pub struct MirrorServer<E: RobotEnable, A: RobotArms, S: PoseSolver> {
    endpoint: ServiceEndpoint,
    controller: MirrorController<A, S>,
    enable: E,
    initially_enabled: Option<bool>,
}

impl<E: RobotEnable, A: RobotArms, S: PoseSolver> MirrorServer<E, A, S> {
    /// Creates a node over an already bound endpoint.
    pub fn new(
        endpoint: ServiceEndpoint,
        enable: E,
        controller: MirrorController<A, S>,
    ) -> MirrorServer<E, A, S> {
        MirrorServer {
            endpoint,
            controller,
            enable,
            initially_enabled: None,
        }
    }

    /// Binds the endpoint and creates the node. Port 0 picks a free port.
    ///
    /// # Errors
    /// * [`NetworkException`](`crate::exception::GbiException::NetworkException`) if a
    ///   socket cannot be bound
    pub fn bind(
        command_port: u16,
        pose_port: u16,
        enable: E,
        controller: MirrorController<A, S>,
    ) -> GbiResult<MirrorServer<E, A, S>> {
        let endpoint = ServiceEndpoint::bind(command_port, pose_port).map_err(|e| {
            GbiException::NetworkException {
                message: e.to_string(),
            }
        })?;
        Ok(MirrorServer::new(endpoint, enable, controller))
    }

    pub fn command_port(&self) -> u16 {
        self.endpoint.command_port()
    }

    pub fn pose_port(&self) -> u16 {
        self.endpoint.pose_port()
    }

    /// Serves until the shutdown flag is set.
    ///
    /// Performs the startup sequence first (record the enable state, enable the robot),
    /// then answers service requests and relays pose samples. The enable state is
    /// restored before this returns, also when serving ends with an error.
    pub fn serve(&mut self, shutdown_requested: &AtomicBool) -> GbiResult<()> {
        self.startup()?;
        let result = self.serve_loop(shutdown_requested);
        self.shutdown();
        result
    }

    fn startup(&mut self) -> GbiResult<()> {
        let enabled = self.enable.is_enabled()?;
        self.initially_enabled = Some(enabled);
        info!("Robot enable state at startup: {}", enabled);
        self.enable.enable()?;
        info!("Ready to calibrate");
        Ok(())
    }

    fn serve_loop(&mut self, shutdown_requested: &AtomicBool) -> GbiResult<()> {
        while !shutdown_requested.load(Ordering::Relaxed) {
            for message in self.endpoint.poll_inbound(POLL_INTERVAL)? {
                self.dispatch(message);
            }
        }
        Ok(())
    }

    /// Disables the robot again, but only if it was disabled at startup.
    fn shutdown(&mut self) {
        if let Some(false) = self.initially_enabled.take() {
            match self.enable.disable() {
                Ok(()) => info!("Robot disabled again"),
                Err(e) => error!("Could not restore the enable state: {}", e),
            }
        }
    }

    fn dispatch(&mut self, message: Inbound) {
        match message {
            Inbound::Request {
                client,
                header,
                body,
            } => self.answer_request(client, header, body),
            Inbound::Pose(sample) => self.controller.relay_pose(&sample.pose()),
        }
    }

    fn answer_request(&mut self, client: Token, header: MirrorCommandHeader, body: Vec<u8>) {
        let command = header.command;
        let status = match self.execute_request(command, &body) {
            Ok(()) => ServiceStatus::Success,
            Err(e) => {
                report_handler_error(&e);
                ServiceStatus::Error
            }
        };
        if let Err(e) = self.endpoint.send_response(client, &header, status) {
            error!("Could not answer service request: {}", e);
        }
    }

    fn execute_request(&mut self, command: MirrorCommandEnum, body: &[u8]) -> GbiResult<()> {
        match command {
            MirrorCommandEnum::Calibrate => {
                let request: CalibrateRequest = try_deserialize(body)?;
                let limb: Limb = request.limb.parse()?;
                self.controller.calibrate(limb, request.hand_pose())
            }
            MirrorCommandEnum::EnableMirroring => {
                let request: EnableMirroringRequest = try_deserialize(body)?;
                let mode = MirrorMode::from_mode_byte(request.mode)?;
                self.controller.set_mirroring(mode)
            }
        }
    }
}

fn report_handler_error(e: &GbiException) {
    match e {
        GbiException::InvalidLimb { .. } | GbiException::InvalidMode { .. } => error!("{}", e),
        // rejected state transitions have been logged where they were decided
        GbiException::NotCalibrated | GbiException::AlreadyInState { .. } => {}
        e => error!("Service request failed: {}", e),
    }
}
