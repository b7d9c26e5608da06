mod command;

use anyhow::Result;
use cadence::prelude::*;
use cadence::{ENGINE_NAME, VERSION as LIB_VERSION};
use chrono::{Local, NaiveTime};
use colored::Colorize;
use command::{Command, TriggerSpec, HELP};
use futures::StreamExt;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// A sequence started from the shell.
struct ActiveSequence {
    description: String,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(95).as_str().dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());

    println!("{}", "-".repeat(95).as_str().dimmed());
}

/// Today's date at `time`, on the local calendar.
fn today_at(time: NaiveTime) -> Instant {
    Local::now().date_naive().and_time(time)
}

/// Builds a task for `handle` and starts the requested trigger on it.
fn start(
    handle: usize,
    request: &TriggerSpec,
    show_events: Arc<AtomicBool>,
) -> (Firings<String>, String) {
    let task = Task::new(
        |label: &String| Ok(format!("{label} fired at {}", Local::now().format("%H:%M:%S%.3f"))),
        format!("#{handle}"),
    );
    spawn_event_printer(handle, &task, show_events);

    match request {
        TriggerSpec::Once => (task.fire_once(), "once".to_string()),
        TriggerSpec::After(delay) => (task.fire_after(*delay), format!("after {:?}", delay)),
        TriggerSpec::At(time) => (task.fire_at(today_at(*time)), format!("at {}", time)),
        TriggerSpec::Every(interval) => {
            (task.repeat_every(*interval), format!("every {:?}", interval))
        }
        TriggerSpec::For { length, interval } => (
            task.repeat_every_for(*length, *interval),
            format!("every {:?} for {:?}", interval, length),
        ),
        TriggerSpec::Until { time, interval } => (
            task.repeat_every_until(today_at(*time), *interval),
            format!("every {:?} until {}", interval, time),
        ),
        TriggerSpec::On {
            field,
            values,
            interval,
        } => (
            task.repeat_on(*field, values.iter().copied(), *interval),
            format!("on {} in {:?}, ticking every {:?}", field, values, interval),
        ),
    }
}

/// Prints the lifecycle events of one task while the shared flag is on.
fn spawn_event_printer(handle: usize, task: &Task<String, String>, show_events: Arc<AtomicBool>) {
    let mut events = task.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if show_events.load(Ordering::Relaxed) {
                println!("<-- [EVENT #{}] {:?}", handle, event);
            }
        }
    });
}

/// Drains a sequence, printing each result.
fn spawn_consumer(handle: usize, mut firings: Firings<String>, finished: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while let Some(result) = firings.next().await {
            match result {
                Ok(value) => println!("<-- [FIRED] {}", value),
                Err(e) => println!("<-- [FAILED #{}] {}", handle, e),
            }
        }
        finished.store(true, Ordering::Relaxed);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    // Shared flag for the lifecycle event printers.
    let show_events = Arc::new(AtomicBool::new(false));

    // The shell's state management variables.
    let mut active: BTreeMap<usize, ActiveSequence> = BTreeMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!(
        "{} shell is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting cadenceshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;

        match command::parse(&line) {
            Ok(Command::Start(request)) => {
                let handle = next_handle;
                next_handle += 1;
                let (firings, description) = start(handle, &request, show_events.clone());
                let finished = Arc::new(AtomicBool::new(false));
                active.insert(
                    handle,
                    ActiveSequence {
                        description: description.clone(),
                        token: firings.cancellation_token(),
                        finished: finished.clone(),
                    },
                );
                spawn_consumer(handle, firings, finished);
                println!("--> Started '{}' with handle: #{}", description, handle);
            }
            Ok(Command::List) => {
                println!("Sequences:");
                for (handle, sequence) in &active {
                    let status = if sequence.finished.load(Ordering::Relaxed) {
                        "finished".dimmed()
                    } else {
                        "running".green()
                    };
                    println!("  Handle #{}: {} [{}]", handle, sequence.description, status);
                }
            }
            Ok(Command::Cancel(handle)) => match active.remove(&handle) {
                Some(sequence) => {
                    sequence.token.cancel();
                    println!("--> Sequence #{} cancelled.", handle);
                }
                None => println!(
                    "Error: Invalid handle #{}. Use 'list' to see started sequences.",
                    handle
                ),
            },
            Ok(Command::Events(on)) => {
                show_events.store(on, Ordering::Relaxed);
                if on {
                    println!("--> Started printing lifecycle events.");
                } else {
                    println!("--> Stopped printing lifecycle events.");
                }
            }
            Ok(Command::Help) => println!("{}", HELP),
            Ok(Command::Exit) => break,
            Ok(Command::Empty) => {}
            Err(message) => println!("{}", message),
        }
    }

    for sequence in active.values() {
        sequence.token.cancel();
    }
    Ok(())
}
