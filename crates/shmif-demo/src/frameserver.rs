//! The client role: acquire the inherited segment, paint a solid test
//! frame, signal it, then wait for an exit command.

use std::time::Duration;

use anyhow::{Context, Result};
use shmif_client::{connect, Archetype, Segment, SignalMask, SignalMode};
use shmif_proto::{Event, TargetCommand};

pub fn run() -> Result<()> {
    let params = connect::from_environment().context("missing ARCAN_CONNKEY/ARCAN_SHMSIZE in environment")?;
    let parent_pid = nix::unistd::getppid().as_raw();

    let mut segment = Segment::acquire(&params.shm_key, params.shm_size, parent_pid, Archetype::Media)
        .context("acquiring inherited segment")?;

    segment
        .push_event(&Event::External(shmif_proto::ExternalNotice::Ident("shmif-demo".into())))
        .context("sending ident notice")?;

    paint_solid_frame(&mut segment, 0x20, 0x80, 0xc0);
    segment.signal(SignalMask::VIDEO, SignalMode::Force).context("signaling first frame")?;
    tracing::info!(target: "shmif.demo.frameserver", "frame delivered");

    loop {
        if !segment.is_alive() {
            tracing::info!(target: "shmif.demo.frameserver", "parent gone, exiting");
            return Ok(());
        }
        match segment.incoming_ring().poll() {
            Ok(raw) => {
                if let Some(Event::Target(TargetCommand::Exit)) = Event::from_raw(&raw) {
                    tracing::info!(target: "shmif.demo.frameserver", "exit command received");
                    return Ok(());
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(20)),
        }
    }
}

fn paint_solid_frame(segment: &mut Segment, r: u8, g: u8, b: u8) {
    let plane = segment.video_plane_mut();
    for pixel in plane.chunks_exact_mut(shmif_proto::layout::BYTES_PER_PIXEL) {
        pixel[0] = r;
        pixel[1] = g;
        pixel[2] = b;
        pixel[3] = 0xff;
    }
}
