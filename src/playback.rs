// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Hands recorded trajectories to the playback action server and tracks their progress.
pub mod handle;
pub mod types;

use std::sync::mpsc::Sender;

use tracing::{debug, error, info, warn};

use crate::exception::GbiResult;
use crate::playback::handle::PlaybackHandle;
use crate::playback::types::{PlaybackEvent, PlaybackGoal};

/// How a playback entry ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The motion ran to completion or was aborted.
    Finished,
    /// The player granted a pause request.
    Pause,
}

/// Client side of the recorded-motion playback action.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackClient {
    /// Submits a goal and returns the handle that tracks it. Does not wait for the
    /// motion to finish.
    ///
    /// # Errors
    /// * [`NetworkException`](`crate::exception::GbiException::NetworkException`) if the
    ///   action server cannot be reached.
    fn send_goal(&mut self, goal: &PlaybackGoal) -> GbiResult<PlaybackHandle>;
}

/// Pause and resume switch of the trajectory player.
#[cfg_attr(test, mockall::automock)]
pub trait PauseService {
    /// Blocks until the player has acknowledged the new pause state. `true` pauses,
    /// `false` resumes.
    ///
    /// # Errors
    /// * [`ServiceException`](`crate::exception::GbiException::ServiceException`) if the
    ///   player rejected the call.
    fn pause_resume(&mut self, pause: bool) -> GbiResult<()>;
}

/// Plays one recorded trajectory at a time and reports how each entry ended.
///
/// Entering submits the trajectory file as a single pass at full speed and starts
/// listening for progress. At most one [`PlayOutcome`] is delivered per entry. A
/// failed pause request delivers none, the entry keeps running and a later
/// completion still reports [`PlayOutcome::Finished`].
pub struct PlayState<Client: PlaybackClient, Pause: PauseService> {
    playback: Client,
    pause: Pause,
    outcome: Sender<PlayOutcome>,
    goal: Option<PlaybackHandle>,
    progress: f64,
    outcome_sent: bool,
}

impl<Client: PlaybackClient, Pause: PauseService> PlayState<Client, Pause> {
    /// Creates the state around an action client and the pause service of the player.
    /// Outcomes are delivered through `outcome`.
    pub fn new(playback: Client, pause: Pause, outcome: Sender<PlayOutcome>) -> Self {
        PlayState {
            playback,
            pause,
            outcome,
            goal: None,
            progress: 0.,
            // engaged until the first entry, an abort before entering reports nothing
            outcome_sent: true,
        }
    }

    /// Starts playing the given trajectory file once at full speed.
    ///
    /// # Errors
    /// * [`NetworkException`](`crate::exception::GbiException::NetworkException`) if the
    ///   goal could not be submitted. The entry stays inactive.
    pub fn enter(&mut self, filename: &str) -> GbiResult<()> {
        let goal = PlaybackGoal::single_pass(filename);
        let handle = self.playback.send_goal(&goal)?;
        self.goal = Some(handle);
        self.outcome_sent = false;
        info!("Playing {}", filename);
        Ok(())
    }

    /// Requests cancellation of the running goal and reports [`PlayOutcome::Finished`].
    pub fn abort(&mut self) {
        if let Some(goal) = self.goal.take() {
            goal.cancel();
        }
        self.signal(PlayOutcome::Finished);
    }

    /// Asks the player to pause. On success the entry ends with [`PlayOutcome::Pause`].
    ///
    /// A rejected pause is logged and reported back to the caller, but the entry
    /// delivers no outcome and the motion keeps running.
    ///
    /// # Errors
    /// * [`ServiceException`](`crate::exception::GbiException::ServiceException`) if the
    ///   pause service failed.
    pub fn request_pause(&mut self) -> GbiResult<()> {
        match self.pause.pause_resume(true) {
            Ok(()) => {
                self.signal(PlayOutcome::Pause);
                Ok(())
            }
            Err(error) => {
                error!("Service call failed: {}", error);
                Err(error)
            }
        }
    }

    /// Processes the pending playback events. Feedback overwrites the progress and a
    /// completion, whatever its payload, reports [`PlayOutcome::Finished`].
    pub fn spin_once(&mut self) {
        let mut events = Vec::new();
        if let Some(goal) = &self.goal {
            while let Some(event) = goal.try_next_event() {
                events.push(event);
            }
        }
        for event in events {
            match event {
                PlaybackEvent::Feedback(feedback) => {
                    self.progress = feedback.percent_complete;
                    debug!("{}", self.status());
                }
                PlaybackEvent::Done(_) => self.signal(PlayOutcome::Finished),
            }
        }
    }

    /// Last reported progress in percent.
    pub fn percent_complete(&self) -> f64 {
        self.progress
    }

    /// Progress as a status line, the percentage truncated to whole numbers.
    pub fn status(&self) -> String {
        format!("{}% completed", self.progress as i64)
    }

    fn signal(&mut self, outcome: PlayOutcome) {
        if self.outcome_sent {
            return;
        }
        self.outcome_sent = true;
        if self.outcome.send(outcome).is_err() {
            warn!("Nobody is listening for the playback outcome");
        }
    }
}
