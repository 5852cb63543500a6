// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `brickd`: bridges a fleet of brick control modules to network clients.
//!
//! This binary wires together the five core components from the design
//! notes — codec, slave table, SPI engine, router, event bridge — and runs
//! the event loop. Process supervision, config-file parsing, the TCP client
//! listener, and the other transports are external collaborators (§1) and
//! are not implemented here.

mod cli;
mod error;
mod guards;

use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use drv_router::{Router, SpiStack};
use drv_slave_table::{NullSelectLine, SelectLine, SysfsSelectLine, MAX_SLAVES};
use drv_spi_engine::{BridgeConsumer, SpiEngine};

use cli::Cli;
use error::BrickdError;
use guards::PhaseGuards;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("brickd: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BrickdError> {
    let mut guards = PhaseGuards::new();

    // Open question in §9, preserved literally rather than guessed at: a
    // non-master stack address aborts the whole extension.
    if cli.address != 0 {
        return Err(BrickdError::OnlyMasterModeSupported);
    }
    guards.enter("master-mode check");

    let select_lines = build_select_lines(cli.gpio_base).map_err(BrickdError::SelectLine)?;
    guards.enter("select lines");

    let (engine, handle) =
        SpiEngine::init(cli.engine_config(), select_lines).map_err(BrickdError::Engine)?;
    guards.enter("spi engine (device opened, enumeration complete)");

    let mut router = Router::new();
    router.register(Arc::new(SpiStack::new(&handle)));
    guards.enter("router");

    let running = handle.running.clone();
    let spi_thread = thread::Builder::new()
        .name("spi-engine".into())
        .spawn(move || engine.run())
        .map_err(BrickdError::ThreadSpawn)?;
    guards.enter("spi thread");

    // Nothing else in this process ever clears `running`; without this,
    // `event_loop`'s poll loop below blocks forever and the daemon can only
    // be stopped by SIGKILL.
    let running_on_signal = running.clone();
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal");
        running_on_signal.store(false, Ordering::Release);
    })
    .map_err(BrickdError::SignalHandler)?;
    guards.enter("signal handler");

    let result = event_loop(&handle.bridge_consumer, &router, &running);

    // Shutdown race (§9): clear the flag and join the SPI thread before
    // anything in `handle` (the pipe, the queue) goes out of scope.
    running.store(false, Ordering::Release);
    spi_thread.join().expect("SPI thread panicked");

    result
}

/// Builds one select line per stack address. Without `--gpio-base`, every
/// line is a no-op, which is the right default off real hardware and in
/// tests.
fn build_select_lines(gpio_base: Option<u32>) -> std::io::Result<Vec<Box<dyn SelectLine>>> {
    match gpio_base {
        None => Ok((0..MAX_SLAVES)
            .map(|_| Box::new(NullSelectLine) as Box<dyn SelectLine>)
            .collect()),
        Some(base) => (0..MAX_SLAVES as u32)
            .map(|offset| {
                SysfsSelectLine::export(base + offset)
                    .map(|line| Box::new(line) as Box<dyn SelectLine>)
            })
            .collect(),
    }
}

/// Single-threaded cooperative loop over the event bridge's notification
/// pipe (§5). The TCP listener that would also register sources here is out
/// of scope, so this loop only ever has the one source to wait on.
fn event_loop(
    consumer: &BridgeConsumer,
    router: &Router,
    running: &std::sync::atomic::AtomicBool,
) -> Result<(), BrickdError> {
    const POLL_TIMEOUT_MS: i32 = 200;

    while running.load(Ordering::Acquire) {
        if wait_readable(consumer.read_fd(), POLL_TIMEOUT_MS).map_err(BrickdError::EventLoopPoll)? {
            consumer
                .consume(|packet| router.network_dispatch_response(packet))
                .map_err(BrickdError::Bridge)?;
        }
    }
    Ok(())
}

fn wait_readable(fd: std::os::unix::io::RawFd, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a single, valid, stack-allocated `pollfd`.
    let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if ready < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(ready > 0 && pollfd.revents & libc::POLLIN != 0)
}
