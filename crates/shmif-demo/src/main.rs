//! Runnable demonstration of one SHMIF connection end to end: a parent
//! that allocates a segment and spawns a client, and a client that
//! paints one frame and waits to be told to exit.

mod frameserver;
mod logging;
mod parent;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "shmif-demo", version, about = "SHMIF parent/client demonstration")]
struct Args {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Acts as the engine side: allocates a segment and spawns a client.
    Parent {
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
    /// Acts as the client side: connects to an inherited segment.
    Frameserver,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _guard = match &args.role {
        Role::Parent { .. } => logging::configure("shmif-demo-parent.log"),
        Role::Frameserver => logging::configure("shmif-demo-frameserver.log"),
    };

    match args.role {
        Role::Parent { width, height } => parent::run(width, height),
        Role::Frameserver => frameserver::run(),
    }
}
