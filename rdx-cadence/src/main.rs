use anyhow::Result;
use cadence::prelude::*;
use cadence::ENGINE_NAME;
use chrono::{Local, Timelike};
use futures::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load tuning from a file if one was given, else use the defaults.
    let config = match std::env::args().nth(1) {
        Some(path) => CadenceConfig::load(path)?,
        None => CadenceConfig::default(),
    };

    // 3. Bind a computation to its arguments.
    let counter = Arc::new(AtomicU32::new(0));
    let task = {
        let counter = counter.clone();
        Task::new(
            move |label: &String| {
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(format!("{label} #{n} at {}", Local::now().format("%H:%M:%S%.3f")))
            },
            "demo".to_string(),
        )
        .with_config(config)
    };

    // 4. Log every lifecycle event the task's sequences report.
    spawn_event_listener(&task);

    info!("{} demo starting. Press Ctrl+C to stop.", ENGINE_NAME);

    // 5. Run several triggers side by side on the same task.
    let sequences = vec![
        ("once", task.fire_once()),
        ("after 2s", task.fire_after(Duration::from_secs(2))),
        (
            "every 1s for 5s",
            task.repeat_every_for(Duration::from_secs(5), Duration::from_secs(1)),
        ),
        (
            "on the current minute",
            task.repeat_on_minutes([Local::now().minute()], Duration::from_secs(3)),
        ),
    ];

    let mut tokens = Vec::new();
    let mut handles = Vec::new();
    for (label, firings) in sequences {
        tokens.push(firings.cancellation_token());
        handles.push(tokio::spawn(consume(label, firings)));
    }

    // 6. Stop everything still running on Ctrl+C.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Cancelling all sequences...");
    for token in tokens {
        token.cancel();
    }
    for handle in handles {
        handle.await?;
    }
    info!("{} demo has shut down.", ENGINE_NAME);
    Ok(())
}

/// Drains one sequence, logging each result.
async fn consume(label: &'static str, mut firings: Firings<String>) {
    while let Some(result) = firings.next().await {
        match result {
            Ok(value) => info!("[{}] => {}", label, value),
            Err(e) => warn!("[{}] failed: {}", label, e),
        }
    }
    info!("[{}] finished", label);
}

/// Spawns a task that logs the lifecycle events of every sequence.
fn spawn_event_listener(task: &Task<String, String>) {
    let mut events = task.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match event {
                TriggerEvent::Fired { .. } | TriggerEvent::TickSkipped { .. } => {
                    tracing::debug!("[EVENT] => {:?}", event)
                }
                _ => info!("[EVENT] => {:?}", event),
            }
        }
    });
}
