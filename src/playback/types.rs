// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Goal, feedback and result types of the playback action.
use serde::Deserialize;
use serde::Serialize;

/// Goal handed to the playback action server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaybackGoal {
    /// Recording to play.
    pub filename: String,
    /// Number of passes over the recording.
    pub loops: u32,
    /// Velocity scaling in percent.
    pub scale_vel: u32,
}

impl PlaybackGoal {
    /// One pass at full speed, the way the playback state submits it.
    pub fn single_pass(filename: &str) -> PlaybackGoal {
        PlaybackGoal {
            filename: filename.to_string(),
            loops: 1,
            scale_vel: 100,
        }
    }
}

/// Progress report of the action server.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PlaybackFeedback {
    pub percent_complete: f64,
}

/// Terminal report of the action server. The playback state treats every variant the
/// same way.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaybackResult {
    Succeeded,
    Aborted,
    Failed,
}

/// One event on a goal's stream.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PlaybackEvent {
    Feedback(PlaybackFeedback),
    Done(PlaybackResult),
}
