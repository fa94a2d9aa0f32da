//! The parent role: allocate a segment, spawn the `frameserver`
//! subcommand as its client, wait for one delivered frame, then ask it
//! to exit and reap it.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use shmif_proto::{Event, TargetCommand};
use shmif_server::{FrameserverKind, ParentSegment, Watchdog};

const RUN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(width: u32, height: u32) -> Result<()> {
    let shm_name = format!("/shmif-demo-{}", std::process::id());
    let mut segment =
        ParentSegment::allocate(&shm_name, width, height, FrameserverKind::AvFeed).context("allocating segment")?;

    let self_exe = std::env::current_exe().context("resolving current executable")?;
    let (mut child, _event_socket) = shmif_server::spawn_server(
        &shm_name,
        shmif_proto::layout::segment_size(width, height),
        &self_exe,
        &["frameserver".to_string()],
    )
    .context("spawning frameserver child")?;
    segment.bind_child(child.id() as i32);

    tracing::info!(target: "shmif.demo.parent", shm_name, pid = child.id(), "child spawned");

    let deadline = Instant::now() + RUN_TIMEOUT;
    let mut delivered = false;
    while Instant::now() < deadline {
        if segment.video_ready() {
            tracing::info!(target: "shmif.demo.parent", "frame received from client");
            segment.acknowledge(false);
            delivered = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if !delivered {
        tracing::warn!(target: "shmif.demo.parent", "timed out waiting for a frame");
    }

    segment.push_event(&Event::Target(TargetCommand::Exit)).context("sending exit command")?;

    let watchdog = Watchdog::spawn(child.id() as i32, || {
        tracing::info!(target: "shmif.demo.parent", "child reaped");
    });
    let _ = child.wait();
    watchdog.join();

    Ok(())
}
