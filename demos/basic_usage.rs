//! Basic usage example for the countdown engine

use countdown_engine::{
    parse_duration, CancellationToken, Catalog, Duration, TimerConfig, TimerEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cancel_token = CancellationToken::new();

    // Create the catalog with configuration
    let (catalog, mut events) = Catalog::with_events(
        "example_catalog".to_string(),
        TimerConfig::default().with_resolution(Duration::from_millis(50)),
        100, // event buffer size
        cancel_token.clone(),
    );

    // Create multiple timers from human readable durations
    for (name, text) in [("short_timer", "1s"), ("medium_timer", "2"), ("long_timer", "3s")] {
        let timer = catalog.create(name, parse_duration(text)?)?;
        timer.on_end(|timer| {
            println!("Callback: '{}' rang", timer.name().unwrap_or("timer"));
        });
        catalog.start(name)?;
    }

    println!("Timers started! Waiting for them to finish...");

    // Give the long timer some extra time while it runs
    catalog.add_time("long_timer", Duration::from_secs(1))?;

    // Wait for timer completions
    let mut finished_count = 0;
    while finished_count < 3 {
        match events.recv_event().await {
            Some(TimerEvent::TimerStarted { name }) => println!("Timer '{}' started", name),
            Some(TimerEvent::TimerFinished { name }) => {
                println!("Timer '{}' finished!", name);
                finished_count += 1;
            }
            None => break,
        }
    }

    // Demonstrate pause, resume and stop
    let pomodoro = catalog.create("pomodoro", parse_duration("25m")?)?;
    catalog.start("pomodoro")?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    catalog.pause_or_resume("pomodoro")?;
    println!("Paused with {:?} left", pomodoro.remaining());
    tokio::time::sleep(Duration::from_millis(300)).await;
    catalog.pause_or_resume("pomodoro")?;
    println!("Resumed, progress {:.4}", pomodoro.progress());

    catalog.stop("pomodoro").await?;
    println!("Timer stopped: {:?}", pomodoro.snapshot());

    for name in catalog.list().keys() {
        catalog.remove(name)?;
    }

    // Shutdown gracefully
    catalog.shutdown().await;

    println!("Catalog shut down successfully!");
    Ok(())
}
