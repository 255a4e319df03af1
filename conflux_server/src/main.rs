//! Conflux hub server CLI.
//!
//! Serves the rendezvous endpoint, spawns one session per client, and
//! drains sessions cleanly on SIGINT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use conflux_core::{Hub, ShutdownToken};
use conflux_server::Acceptor;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_interrupt(_signum: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Coordination hub federating simulator clients into shared worlds.
#[derive(Parser, Debug)]
#[command(name = "conflux-server")]
#[command(about = "Coordination hub federating simulator clients into shared worlds", long_about = None)]
struct Args {
    /// Rendezvous endpoint clients contact to obtain a session endpoint
    #[arg(default_value = "tcp://*:7000")]
    endpoint: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    unsafe {
        libc::signal(libc::SIGINT, handle_interrupt as *const () as libc::sighandler_t);
    }

    info!("starting conflux server");

    let token = ShutdownToken::new();
    let hub = Hub::new(token.clone());

    let acceptor_hub = Arc::clone(&hub);
    let rendezvous_endpoint = args.endpoint.clone();
    let acceptor_thread = thread::spawn(move || {
        let acceptor = Acceptor::new(acceptor_hub);
        if let Err(e) = acceptor.run(&rendezvous_endpoint) {
            error!("[{}] rendezvous endpoint failed: {}", rendezvous_endpoint, e);
        }
    });

    while !token.is_triggered() {
        if INTERRUPTED.load(Ordering::Relaxed) {
            info!("interrupt received, shutting down");
            token.trigger();
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    // Let every session answer its in-flight request before the transport
    // goes away.
    while hub.any_needs_cleanup() {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_secs(1));

    if acceptor_thread.join().is_err() {
        error!("acceptor thread panicked");
    }
    info!("conflux server stopped");
    Ok(())
}
