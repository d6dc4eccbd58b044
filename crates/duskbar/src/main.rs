//! duskbar - status-bar shell core.
//!
//! `duskbar run` owns the GLib main loop and every manager; `duskbar msg`
//! talks to a running instance over the IPC socket.

use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use duskbar_core::{Config, logging};
use tracing::{info, warn};

use duskbar::cli::{Cli, Command};
use duskbar::services::clock::{Clock, SystemClock};
use duskbar::services::command::ShellRunner;
use duskbar::services::ipc::{IpcListener, IpcMessage, send_ipc_message};
use duskbar::services::night_light::{format_sun_time, sun_times};
use duskbar::services::scheduler::GlibScheduler;
use duskbar::shell::Shell;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] duskbar_core::Error),

    #[error("unknown message '{0}'")]
    UnknownMessage(String),

    #[error("bar is not reachable: {0}")]
    Ipc(#[from] std::io::Error),

    #[error("local time is unavailable; pass --day")]
    ClockUnavailable,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command() {
        Command::Run => run_bar(cli.config.as_deref()),
        Command::Msg { message } => send_message(&message),
        Command::SunTimes { day } => print_sun_times(cli.config.as_deref(), day),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("duskbar: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_bar(config_path: Option<&Path>) -> Result<(), AppError> {
    let loaded = Config::load(config_path)?;
    match &loaded.source {
        Some(path) => info!("Using config {:?}", path),
        None => info!("Using built-in config"),
    }

    let shell = Shell::new(
        &loaded.config,
        Rc::new(ShellRunner),
        Rc::new(GlibScheduler::new()),
        Rc::new(SystemClock),
    );

    // The bar still works from its own UI without IPC.
    let listener = match IpcListener::new() {
        Ok(listener) => {
            let weak = Rc::downgrade(&shell);
            listener.borrow().connect(move |msg| {
                if let Some(shell) = weak.upgrade() {
                    shell.dispatch(msg);
                }
            });
            Some(listener)
        }
        Err(e) => {
            warn!("IPC: failed to listen: {}", e);
            None
        }
    };

    shell.start();

    let main_loop = glib::MainLoop::new(None, false);
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let main_loop = main_loop.clone();
        glib::unix_signal_add_local(signum, move || {
            info!("Received signal {}, shutting down", signum);
            main_loop.quit();
            glib::ControlFlow::Break
        });
    }
    main_loop.run();

    shell.stop();
    drop(listener);
    Ok(())
}

fn send_message(message: &str) -> Result<(), AppError> {
    let msg = IpcMessage::from_wire(message)
        .ok_or_else(|| AppError::UnknownMessage(message.to_string()))?;
    send_ipc_message(&msg)?;
    Ok(())
}

fn print_sun_times(config_path: Option<&Path>, day: Option<u32>) -> Result<(), AppError> {
    let config = Config::load(config_path)?.config;
    let now = SystemClock.now();
    let day = match (day, now) {
        (Some(day), _) => day,
        (None, Some(now)) => now.day_of_year,
        (None, None) => return Err(AppError::ClockUnavailable),
    };
    let offset = now.map_or(0.0, |t| t.utc_offset_hours);

    let nl = &config.night_light;
    let times = sun_times(nl.latitude, nl.longitude, day, offset);
    println!(
        "Day {} at {:.2}, {:.2} (UTC{:+})",
        day, nl.latitude, nl.longitude, offset
    );
    println!("Sunrise: {}", format_sun_time(times.sunrise));
    println!("Sunset:  {}", format_sun_time(times.sunset));
    Ok(())
}
