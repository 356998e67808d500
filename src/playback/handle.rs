// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! The goal protocol between the playback state and the action server.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use crate::playback::types::{PlaybackEvent, PlaybackFeedback, PlaybackResult};

/// Caller half of a playback goal: an ordered event stream and a cancellation request
/// flag.
pub struct PlaybackHandle {
    events: Receiver<PlaybackEvent>,
    cancel_requested: Arc<AtomicBool>,
}

/// Action-server half of a playback goal: feeds events and observes cancellation
/// requests.
pub struct PlaybackReporter {
    events: Sender<PlaybackEvent>,
    cancel_requested: Arc<AtomicBool>,
}

/// Creates a connected reporter/handle pair for one goal.
pub fn goal_channel() -> (PlaybackReporter, PlaybackHandle) {
    let (events_tx, events_rx) = channel();
    let cancel_requested = Arc::new(AtomicBool::new(false));
    (
        PlaybackReporter {
            events: events_tx,
            cancel_requested: cancel_requested.clone(),
        },
        PlaybackHandle {
            events: events_rx,
            cancel_requested,
        },
    )
}

impl PlaybackHandle {
    /// Asks the server to cancel the goal. A request, not a guarantee: the goal still
    /// ends with whatever completion the server reports.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    /// Next pending event, if any. Never blocks. A gone reporter reads as no events.
    pub fn try_next_event(&self) -> Option<PlaybackEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl PlaybackReporter {
    /// True once the caller asked for cancellation.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }

    /// Reports playback progress. Returns false when the handle is gone.
    pub fn feedback(&self, percent_complete: f64) -> bool {
        self.events
            .send(PlaybackEvent::Feedback(PlaybackFeedback { percent_complete }))
            .is_ok()
    }

    /// Reports goal completion. Returns false when the handle is gone.
    pub fn finish(&self, result: PlaybackResult) -> bool {
        self.events.send(PlaybackEvent::Done(result)).is_ok()
    }
}
