//! Parses shell input lines into commands.

use cadence::CalendarField;
use chrono::NaiveTime;
use std::time::Duration;

/// A trigger the shell can start.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSpec {
    Once,
    After(Duration),
    At(NaiveTime),
    Every(Duration),
    For { length: Duration, interval: Duration },
    Until { time: NaiveTime, interval: Duration },
    On { field: CalendarField, values: Vec<u32>, interval: Duration },
}

/// One line of shell input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(TriggerSpec),
    List,
    Cancel(usize),
    Events(bool),
    Help,
    Exit,
    Empty,
}

pub const HELP: &str = "Available commands:
  once                       - Fires immediately.
  after <S>                  - Fires once, S seconds from now.
  at <HH:MM:SS>              - Fires once at that time today.
  every <S>                  - Fires every S seconds.
  for <LEN> <S>              - Fires every S seconds for LEN seconds.
  until <HH:MM:SS> <S>       - Fires every S seconds until that time today.
  on <FIELD> <V,V,..> <S>    - Ticks every S seconds, fires when FIELD is one of the values.
                               FIELD: weekday (1 = Monday .. 7 = Sunday), day, hour, minute, second.
  list                       - Shows started sequences and their handles.
  cancel <H>                 - Cancels a sequence by its handle.
  events on|off              - Toggles printing of lifecycle events.
  exit                       - Quits the shell.";

pub fn parse(line: &str) -> Result<Command, String> {
    let args = line.split_whitespace().collect::<Vec<_>>();
    let Some(command) = args.first() else {
        return Ok(Command::Empty);
    };
    let command = match *command {
        "once" => Command::Start(TriggerSpec::Once),
        "after" => Command::Start(TriggerSpec::After(seconds(arg(&args, 1, "after <S>")?)?)),
        "at" => Command::Start(TriggerSpec::At(time_of_day(arg(&args, 1, "at <HH:MM:SS>")?)?)),
        "every" => Command::Start(TriggerSpec::Every(seconds(arg(&args, 1, "every <S>")?)?)),
        "for" => {
            let usage = "for <LEN> <S>";
            Command::Start(TriggerSpec::For {
                length: seconds(arg(&args, 1, usage)?)?,
                interval: seconds(arg(&args, 2, usage)?)?,
            })
        }
        "until" => {
            let usage = "until <HH:MM:SS> <S>";
            Command::Start(TriggerSpec::Until {
                time: time_of_day(arg(&args, 1, usage)?)?,
                interval: seconds(arg(&args, 2, usage)?)?,
            })
        }
        "on" => {
            let usage = "on <FIELD> <V,V,..> <S>";
            Command::Start(TriggerSpec::On {
                field: arg(&args, 1, usage)?.parse()?,
                values: values(arg(&args, 2, usage)?)?,
                interval: seconds(arg(&args, 3, usage)?)?,
            })
        }
        "list" => Command::List,
        "cancel" => {
            let raw = arg(&args, 1, "cancel <H>")?;
            let handle = raw.trim_start_matches('#').parse().map_err(|_| {
                format!("Error: Handle must be a number (e.g., '0', '1'), got '{raw}'.")
            })?;
            Command::Cancel(handle)
        }
        "events" => match arg(&args, 1, "events on|off")? {
            "on" => Command::Events(true),
            "off" => Command::Events(false),
            other => return Err(format!("Error: expected 'on' or 'off', got '{other}'.")),
        },
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        _ => return Err(format!("Unknown command: '{}'. Type 'help'.", line.trim())),
    };
    Ok(command)
}

fn arg<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("Usage: {usage}"))
}

fn seconds(raw: &str) -> Result<Duration, String> {
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(format!("Error: '{raw}' is not a valid number of seconds.")),
    }
}

fn time_of_day(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("Error: '{raw}' is not a time of day (HH:MM:SS)."))
}

fn values(raw: &str) -> Result<Vec<u32>, String> {
    raw.split(',')
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| format!("Error: '{v}' is not a whole number."))
        })
        .collect()
}
