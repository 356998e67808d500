// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use crate::mirror::MirrorMode;
use thiserror::Error;

/// Represents all kinds of errors which the mirroring and playback components report to
/// their callers
#[derive(Error, Debug)]
pub enum GbiException {
    /// InvalidLimb is returned when a calibration request names a limb the robot does not have.
    #[error("Invalid limb {limb:?}! A limb is either \"left\" or \"right\"")]
    InvalidLimb {
        /// The limb string as it arrived in the request.
        limb: String,
    },

    /// InvalidMode is returned when an enable request carries a mode byte that is neither
    /// 0 (stop) nor 1 (start).
    #[error("Invalid mode {mode}! Mode is either 1 to start or 0 to stop the mirroring")]
    InvalidMode { mode: u8 },

    /// NotCalibrated is returned when mirroring is started without a calibration record.
    #[error("You need to calibrate first!")]
    NotCalibrated,

    /// AlreadyInState is returned when an enable request asks for the state the session
    /// is already in.
    #[error("Mirroring has already {mode}!")]
    AlreadyInState { mode: MirrorMode },

    /// UnreachableGoal is reported by the inverse kinematics solver when no joint solution
    /// exists for a target pose.
    #[error("Cannot reach the goal")]
    UnreachableGoal,

    /// ServiceException is thrown if a call to one of the external collaborators
    /// (solver, actuator, pause service, playback action server) fails.
    #[error("{message:?}")]
    ServiceException { message: String },

    /// NetworkException is thrown if a socket operation fails or a peer violates the
    /// wire protocol.
    #[error("{message:?}")]
    NetworkException { message: String },
}

/// creates a NetworkException from the message of a failed socket or codec operation
pub(crate) fn create_network_exception(message: String) -> GbiException {
    GbiException::NetworkException { message }
}

/// Result type which can have GbiException as Error
pub type GbiResult<T> = Result<T, GbiException>;
