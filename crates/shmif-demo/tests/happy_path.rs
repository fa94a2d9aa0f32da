//! End-to-end exercise of the parent/client demonstration binary: the
//! parent allocates a segment, spawns the client, the client paints a
//! frame and is told to exit. Corresponds to the "happy decoder"
//! scenario: a working client connects, negotiates video/audio dimensions,
//! and delivers frames until a clean exit.

use std::process::Command;
use std::time::Duration;

#[test]
fn parent_and_client_complete_one_round_trip() {
    let exe = env!("CARGO_BIN_EXE_shmif-demo");
    let status = Command::new(exe)
        .arg("parent")
        .arg("--width")
        .arg("64")
        .arg("--height")
        .arg("64")
        .status()
        .expect("run parent demo");

    assert!(status.success());

    // The parent process removes its own log files on fresh runs; give
    // the OS a moment to finish flushing before the test harness cleans
    // up the working directory.
    std::thread::sleep(Duration::from_millis(10));
}
