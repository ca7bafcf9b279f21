// Buttond CLI
// Runs commands on short and long presses of input device buttons

use std::io::Read;
use std::os::raw::c_int;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use signal_hook::consts::{SIGCHLD, SIGINT, SIGTERM};

use buttond_core::event::{EventLoop, EventLoopError, PollOutcome};
use buttond_core::{
    poll_timeout_ms, ActionTable, ActionTableBuilder, Config, ConfigError, Controller, ExecMode,
    KeySpec, ShellExecutor, DEBOUNCE_MSECS,
};

/// Run commands on short and long button presses
///
/// A short press action happens on release, if and only if the button was
/// released before <time> (default 1000) milliseconds.
/// A long press action happens even if the key is still pressed, if it has
/// been held for at least <time> (default 5000) milliseconds.
///
/// Some keyboards have repeat built into firmware, so quick repetitions
/// (shorter than the debounce window) are handled as if the key was pressed
/// continuously.
///
/// Key codes can be found in linux/input-event-codes.h or by running with -vv.
#[derive(Parser, Debug)]
#[command(name = "buttond", version, verbatim_doc_comment)]
struct Args {
    /// File to get events from, e.g. /dev/input/event2 (repeatable)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Same as -i, except if the file disappears wait for it to come back
    #[arg(short = 'I', long = "input-wait", value_name = "FILE")]
    wait_inputs: Vec<PathBuf>,

    /// Start a short press action for <KEY> (code or name)
    #[arg(short, long, value_name = "KEY")]
    short: Vec<String>,

    /// Start a long press action for <KEY> (code or name)
    #[arg(short, long, value_name = "KEY")]
    long: Vec<String>,

    /// Trigger time of the current action in milliseconds
    #[arg(short, long, value_name = "MSECS")]
    time: Vec<u64>,

    /// Command of the current action
    #[arg(short, long, value_name = "COMMAND")]
    action: Vec<String>,

    /// Command of the current action, exit after running it
    #[arg(short = 'X', long, value_name = "COMMAND")]
    exit_action: Vec<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Debounce window in milliseconds
    #[arg(long, value_name = "MSECS")]
    debounce: Option<u64>,

    /// Wait for each command to finish before handling further input
    #[arg(long)]
    sync_actions: bool,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,

    /// List input devices reporting key events
    #[arg(long)]
    list_devices: bool,

    /// Verbose (repeatable): -v fired actions, -vv ignored keys, -vvv all events and wakeups
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Exit when an input hangs up
    #[arg(long, hide = true)]
    test_mode: bool,

    #[arg(hide = true)]
    stray: Vec<String>,
}

/// One order-sensitive action option
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Short(String),
    Long(String),
    Time(u64),
    Action(String),
    ExitAction(String),
}

fn collect_steps<T>(
    matches: &ArgMatches,
    id: &str,
    make: impl Fn(T) -> Step,
    steps: &mut Vec<(usize, Step)>,
) where
    T: Clone + Send + Sync + 'static,
{
    if let (Some(values), Some(indices)) = (matches.get_many::<T>(id), matches.indices_of(id)) {
        steps.extend(indices.zip(values.cloned().map(make)));
    }
}

/// Action options in command line order
fn ordered_steps(matches: &ArgMatches) -> Vec<Step> {
    let mut steps = Vec::new();
    collect_steps(matches, "short", Step::Short, &mut steps);
    collect_steps(matches, "long", Step::Long, &mut steps);
    collect_steps(matches, "time", Step::Time, &mut steps);
    collect_steps(matches, "action", Step::Action, &mut steps);
    collect_steps(matches, "exit_action", Step::ExitAction, &mut steps);
    steps.sort_by_key(|(index, _)| *index);
    steps.into_iter().map(|(_, step)| step).collect()
}

fn apply_steps(builder: &mut ActionTableBuilder, steps: Vec<Step>) -> Result<(), ConfigError> {
    for step in steps {
        match step {
            Step::Short(key) => builder.short(&key.parse::<KeySpec>()?)?,
            Step::Long(key) => builder.long(&key.parse::<KeySpec>()?)?,
            Step::Time(ms) => builder.time(ms)?,
            Step::Action(cmd) => builder.command(cmd)?,
            Step::ExitAction(cmd) => builder.exit_command(cmd)?,
        };
    }
    Ok(())
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Main application state
struct Application {
    args: Args,
    table: ActionTable,
    inputs: Vec<PathBuf>,
    wait_inputs: Vec<PathBuf>,
    debounce: Duration,
}

impl Application {
    /// Build the action table from the config file and the command line
    fn new(args: Args, steps: Vec<Step>) -> Result<Self> {
        if let Some(stray) = args.stray.first() {
            bail!("Non-option argument: {}. Did you forget to quote action?", stray);
        }

        let config_path = match &args.config {
            Some(path) => Some(path.clone()),
            None if steps.is_empty() => Config::default_path().filter(|p| p.is_file()),
            None => None,
        };
        let config = match &config_path {
            Some(path) => Config::from_toml_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };

        let mut builder = ActionTableBuilder::new();
        config.apply(&mut builder)?;
        apply_steps(&mut builder, steps)?;
        let table = builder.build()?;

        if table.is_empty() && args.verbose < 2 {
            return Err(ConfigError::NoKeys.into());
        }

        let mut inputs = config.inputs.clone();
        inputs.extend(args.inputs.iter().cloned());
        let mut wait_inputs = config.wait_inputs.clone();
        wait_inputs.extend(args.wait_inputs.iter().cloned());

        let debounce_ms = args.debounce.or(config.debounce_ms).unwrap_or(DEBOUNCE_MSECS);

        Ok(Self {
            args,
            table,
            inputs,
            wait_inputs,
            debounce: Duration::from_millis(debounce_ms),
        })
    }

    /// Print the resolved configuration
    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() && self.wait_inputs.is_empty() {
            bail!(EventLoopError::NoInputs);
        }
        for key in self.table.iter() {
            println!("key {}:", key.code);
            for action in &key.actions {
                println!(
                    "  {}{}",
                    action,
                    if action.exit_after { " (exit after)" } else { "" }
                );
            }
        }
        println!("Configuration is valid");
        Ok(())
    }

    fn list_devices() -> Result<()> {
        let devices = EventLoop::list_devices();
        if devices.is_empty() {
            bail!("No input devices with keys found (check permissions)");
        }
        for device in &devices {
            println!("{}: {}", device.path.display(), device.name);
        }
        Ok(())
    }

    /// Run the main event loop until a signal or an exit action
    fn run(self) -> Result<()> {
        let mut event_loop = EventLoop::new(&self.inputs, &self.wait_inputs)?;

        // Signals are delivered through socket pairs so the poll wakes up
        let mut stop = SignalPipe::register(&[SIGINT, SIGTERM])?;
        let mut child_exit = SignalPipe::register(&[SIGCHLD])?;
        event_loop.add_wake_fd(stop.fd());
        event_loop.add_wake_fd(child_exit.fd());

        let mode = if self.args.sync_actions {
            ExecMode::Blocking
        } else {
            ExecMode::Detached
        };
        let mut executor = ShellExecutor::new(mode);
        let mut controller = Controller::with_debounce(self.table, self.debounce);

        log::info!(
            "monitoring {} key(s) on {}",
            controller.key_count(),
            event_loop
                .paths()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        loop {
            let timeout = poll_timeout_ms(controller.next_wait(Instant::now()));
            let outcome = match event_loop.poll(timeout) {
                Ok(outcome) => outcome,
                Err(EventLoopError::Disconnected(path)) if self.args.test_mode => {
                    log::info!("{} went away, exiting (test mode)", path.display());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            if outcome.is_woken(child_exit.fd()) {
                child_exit.drain();
            }
            executor.reap();

            // Timers first, so a pending long press is not delayed by input
            let fired = controller.fire_due(Instant::now(), &mut executor);
            if fired.exit_requested {
                log::info!("exit action ran, stopping");
                return Ok(());
            }

            if let Some(path) = test_mode_hangup(self.args.test_mode, &outcome) {
                log::info!("got HUP/ERR on {}, exiting (test mode)", path.display());
                return Ok(());
            }

            for event in &outcome.events {
                controller.feed(event);
            }

            if outcome.is_woken(stop.fd()) {
                stop.drain();
                log::info!("Received signal, shutting down");
                return Ok(());
            }
        }
    }
}

/// Input that hung up, when running with `--test-mode`
fn test_mode_hangup(test_mode: bool, outcome: &PollOutcome) -> Option<&Path> {
    outcome
        .hung_up
        .first()
        .filter(|_| test_mode)
        .map(PathBuf::as_path)
}

/// Self-pipe for a set of signals
struct SignalPipe {
    rx: UnixStream,
    // keeps the write end registered with signal-hook open
    _tx: UnixStream,
}

impl SignalPipe {
    fn register(signals: &[c_int]) -> Result<Self> {
        let (rx, tx) = UnixStream::pair().context("creating signal pipe")?;
        rx.set_nonblocking(true)?;
        for &signal in signals {
            signal_hook::low_level::pipe::register(signal, tx.try_clone()?)
                .with_context(|| format!("registering handler for signal {}", signal))?;
        }
        Ok(Self { rx, _tx: tx })
    }

    fn fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    fn drain(&mut self) {
        let mut buf = [0u8; 64];
        while matches!(self.rx.read(&mut buf), Ok(n) if n > 0) {}
    }
}

fn main() -> Result<()> {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches)?;
    let steps = ordered_steps(&matches);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(args.verbose)))
        .format_timestamp_millis()
        .init();

    if args.list_devices {
        return Application::list_devices();
    }

    let app = Application::new(args, steps)?;

    if app.args.check_config {
        return app.validate();
    }

    app.run()
}
