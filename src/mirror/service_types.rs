// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Wire types of the mirror node: service requests, responses and the pose stream.
use serde::Deserialize;
use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::network::MessageCommand;
use crate::robot::Pose;

/// TCP port the mirror node answers service requests on.
pub static COMMAND_PORT: u16 = 1340;
/// UDP port the mirror node receives hand pose samples on.
pub static POSE_PORT: u16 = 1341;

/// Upper bound for one framed service message. Frames announcing a larger size are a
/// protocol violation and get the connection closed.
pub(crate) static MAX_MESSAGE_SIZE: usize = 1024;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum MirrorCommandEnum {
    Calibrate = 0,
    EnableMirroring = 1,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceStatus {
    Success = 0,
    Error = 1,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
#[repr(packed)]
pub struct MirrorCommandHeader {
    pub command: MirrorCommandEnum,
    pub command_id: u32,
    pub size: u32,
}

impl MirrorCommandHeader {
    pub fn new(command: MirrorCommandEnum, command_id: u32, size: u32) -> MirrorCommandHeader {
        MirrorCommandHeader {
            command,
            command_id,
            size,
        }
    }
}

impl MessageCommand for MirrorCommandHeader {
    fn get_command_message_id(&self) -> u32 {
        self.command_id
    }
}

/// Body of a calibration request: the limb to mirror and the tracked hand pose at the
/// reference instant. The quaternion is in x, y, z, w order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CalibrateRequest {
    pub limb: String,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl CalibrateRequest {
    pub fn new(limb: &str, hand_pose: &Pose) -> Self {
        let (position, orientation) = hand_pose.to_parts();
        CalibrateRequest {
            limb: limb.to_string(),
            position,
            orientation,
        }
    }

    pub fn hand_pose(&self) -> Pose {
        Pose::from_parts(self.position, self.orientation)
    }
}

// not packed, the limb string makes the frame variable-length
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CalibrateRequestWithHeader {
    pub header: MirrorCommandHeader,
    pub request: CalibrateRequest,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
#[repr(packed)]
pub struct EnableMirroringRequest {
    pub mode: u8,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
#[repr(packed)]
pub struct EnableMirroringRequestWithHeader {
    pub header: MirrorCommandHeader,
    pub request: EnableMirroringRequest,
}

impl MessageCommand for CalibrateRequestWithHeader {
    fn get_command_message_id(&self) -> u32 {
        self.header.get_command_message_id()
    }
}

impl MessageCommand for EnableMirroringRequestWithHeader {
    fn get_command_message_id(&self) -> u32 {
        // copy, the struct is packed
        let header = self.header;
        header.get_command_message_id()
    }
}

/// Response to either service: the echoed header and a status byte.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct MirrorCommandResponse {
    pub header: MirrorCommandHeader,
    pub status: ServiceStatus,
}

/// One tracked hand pose as it travels in a UDP datagram. 56 bytes on the wire, the
/// quaternion in x, y, z, w order.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[repr(packed)]
pub struct PoseSample {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl PoseSample {
    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> PoseSample {
        PoseSample {
            position,
            orientation,
        }
    }

    pub fn from_pose(pose: &Pose) -> PoseSample {
        let (position, orientation) = pose.to_parts();
        PoseSample {
            position,
            orientation,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::from_parts(self.position, self.orientation)
    }
}
