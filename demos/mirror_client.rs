// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::f64::consts::PI;
use std::time::Duration;

use clap::Parser;

use gbi::{MirrorClient, Pose, PoseSample, COMMAND_PORT, POSE_PORT};

/// Calibrates the left arm against a fixed hand pose, starts the mirroring and streams
/// a small circular hand motion before stopping again. Run the mirror_server example
/// first when no real node is around.
#[derive(Parser, Debug)]
#[clap(author, version, name = "mirror_client")]
struct CommandLineArguments {
    /// IP-Address or hostname of the mirror node
    pub gbi_ip: String,
    /// TCP port for the calibrate and enable services
    #[clap(long, default_value_t = COMMAND_PORT)]
    pub command_port: u16,
    /// UDP port for the hand pose stream
    #[clap(long, default_value_t = POSE_PORT)]
    pub pose_port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CommandLineArguments::parse();
    let mut client = MirrorClient::connect(args.gbi_ip.as_str(), args.command_port, args.pose_port)?;
    let hand_at_rest = Pose::from_parts([0.45, 0.25, 0.3], [0., 0., 0., 1.]);
    println!("calibrate: {:?}", client.calibrate("left", &hand_at_rest)?);
    println!("start: {:?}", client.set_mirroring(1)?);
    for step in 0..500 {
        let angle = 2. * PI * step as f64 / 500.;
        let sample = PoseSample::new(
            [0.45 + 0.05 * angle.cos(), 0.25 + 0.05 * angle.sin(), 0.3],
            [0., 0., 0., 1.],
        );
        client.publish_pose(&sample)?;
        std::thread::sleep(Duration::from_millis(10));
    }
    println!("stop: {:?}", client.set_mirroring(0)?);
    Ok(())
}
