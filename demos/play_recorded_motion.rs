// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use gbi::{
    goal_channel, GbiResult, PauseService, PlayState, PlaybackClient, PlaybackGoal,
    PlaybackHandle, PlaybackResult,
};

/// Plays a trajectory file against a scripted playback server which reports progress
/// ten times per second. Press Ctrl-C to abort the motion early.
#[derive(Parser, Debug)]
#[clap(author, version, name = "play_recorded_motion")]
struct CommandLineArguments {
    /// Trajectory file to play
    pub filename: String,
}

/// A playback server that acknowledges every goal and walks its progress from 0 to 100.
struct ScriptedPlayer;

impl PlaybackClient for ScriptedPlayer {
    fn send_goal(&mut self, goal: &PlaybackGoal) -> GbiResult<PlaybackHandle> {
        let (reporter, handle) = goal_channel();
        let filename = goal.filename.clone();
        std::thread::spawn(move || {
            info!("scripted server playing {}", filename);
            for percent in 1..=100 {
                if reporter.is_cancel_requested() {
                    reporter.finish(PlaybackResult::Aborted);
                    return;
                }
                reporter.feedback(f64::from(percent));
                std::thread::sleep(Duration::from_millis(100));
            }
            reporter.finish(PlaybackResult::Succeeded);
        });
        Ok(handle)
    }
}

/// A pause switch that always succeeds. The state needs one even though this demo never
/// pauses.
struct NoPause;

impl PauseService for NoPause {
    fn pause_resume(&mut self, _pause: bool) -> GbiResult<()> {
        Ok(())
    }
}

fn main() -> GbiResult<()> {
    tracing_subscriber::fmt::init();
    let args = CommandLineArguments::parse();
    let (outcome_tx, outcome_rx) = channel();
    let mut state = PlayState::new(ScriptedPlayer, NoPause, outcome_tx);
    state.enter(args.filename.as_str())?;

    let abort_requested = Arc::new(AtomicBool::new(false));
    let flag = abort_requested.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)).unwrap();

    loop {
        if abort_requested.swap(false, Ordering::Relaxed) {
            println!("aborting");
            state.abort();
        }
        state.spin_once();
        println!("{}", state.status());
        if let Ok(outcome) = outcome_rx.try_recv() {
            println!("outcome: {:?}", outcome);
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
