use std::time::Duration;

use anyhow::anyhow;
use coop_scheduler::{DriverHandle, Scheduler, TaskHandle, WorkItem};
use tracing::info;

pub const ROUND_START: &str = "round_start";
pub const GO: &str = "go";

/// Lap times of the runners, in seconds
const LAPS: [(&str, f64); 2] = [("tortoise", 2.5), ("hare", 1.2)];

/// Handles for every task in the demo race
pub struct Race {
    pub announcer: TaskHandle<()>,
    pub runners: Vec<TaskHandle<f64>>,
    pub saboteur: TaskHandle<()>,
    pub referee: TaskHandle<u32>,
}

impl Race {
    /// Print how each task ended
    pub fn report(&self) {
        println!("announcer: {}", self.announcer.status());
        for runner in &self.runners {
            let name = runner.name().unwrap_or("runner");
            match runner.take_result() {
                Some(Ok(lap)) => println!("{}: finished lap in {:.1}s", name, lap),
                Some(Err(err)) => println!("{}: {}", name, err),
                None => println!("{}: {}", name, runner.status()),
            }
        }
        println!("saboteur: {}", self.saboteur.status());
        match self.referee.take_result() {
            Some(Ok(beats)) => println!("referee: whistled after {} heartbeat(s)", beats),
            Some(Err(err)) => println!("referee: {}", err),
            None => println!("referee: {}", self.referee.status()),
        }
    }
}

/// Set up the race on `scheduler`
///
/// Nothing moves until `round_start` is signaled. The referee shuts the driver
/// down once every runner had time to finish.
pub fn spawn_race(scheduler: &Scheduler, driver: DriverHandle) -> Race {
    let s = scheduler.clone();
    let announcer = scheduler.spawn(move || async move {
        s.wait_event(ROUND_START).await;
        for n in (1..=3).rev() {
            info!(target: "demo", "{}...", n);
            s.sleep(Duration::from_secs(1)).await;
        }
        info!(target: "demo", "Go! (t={})", s.now());
        s.signal(GO);
        Ok(())
    });

    let runners = LAPS
        .iter()
        .filter_map(|&(name, lap)| {
            let s = scheduler.clone();
            let work = WorkItem::new(move || async move {
                s.wait_event(GO).await;
                let started = s.now();
                s.sleep_secs(lap).await;
                let elapsed = s.now().as_secs_f64() - started.as_secs_f64();
                info!(target: "demo", "{} crossed the line at {}", name, s.now());
                Ok(elapsed)
            })
            .named(name);
            scheduler.start(Some(work))
        })
        .collect();

    let s = scheduler.clone();
    let saboteur = scheduler.spawn(move || async move {
        s.wait_event(GO).await;
        s.sleep_secs(0.5).await;
        Err(anyhow!("tripped over the starting line"))
    });

    let s = scheduler.clone();
    let longest_lap = LAPS.iter().map(|(_, lap)| *lap).fold(0.0, f64::max);
    let referee = scheduler.spawn(move || async move {
        s.wait_event(GO).await;
        let mut beats = 0;
        while s.now().as_secs_f64() < 3.0 + longest_lap + 0.5 {
            s.sleep(Duration::from_millis(500)).await;
            beats += 1;
        }
        info!(target: "demo", "Referee calls the race at {}", s.now());
        driver.shutdown()?;
        Ok(beats)
    });

    Race {
        announcer,
        runners,
        saboteur,
        referee,
    }
}
