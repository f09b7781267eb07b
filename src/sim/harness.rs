//! CLI entry point for the simulation harness: runs a single-server queue
//! on the kernel with any of its run loops and prints a summary.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use evsim_rs::config::{Config, Flavor, load_config};
use evsim_rs::{
    Action, EventResult, Priority, ReplicationState, RunState, Simulator, SimulatorEvent,
};

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(
    name = "sim-harness",
    about = "Runs an M/M/1 queue on the discrete-event simulation kernel."
)]
pub struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run loop to use instead of the configured one
    #[arg(long, value_enum)]
    flavor: Option<FlavorArg>,

    /// Seed for the arrival and service streams
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Mean arrivals per time unit
    #[arg(long, default_value_t = 1.0)]
    arrival_rate: f64,

    /// Mean services per time unit
    #[arg(long, default_value_t = 1.25)]
    service_rate: f64,

    /// Pause before this time instead of running to the replication end
    #[arg(long, conflicts_with = "run_until_including")]
    run_until: Option<f64>,

    /// Pause after the events scheduled at this time
    #[arg(long)]
    run_until_including: Option<f64>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Maximum log level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlavorArg {
    Devs,
    Dess,
    Hybrid,
    RealTime,
}

impl From<FlavorArg> for Flavor {
    fn from(arg: FlavorArg) -> Self {
        match arg {
            FlavorArg::Devs => Flavor::Devs,
            FlavorArg::Dess => Flavor::Dess,
            FlavorArg::Hybrid => Flavor::Hybrid,
            FlavorArg::RealTime => Flavor::RealTime,
        }
    }
}

struct Queue {
    rng: StdRng,
    arrival_rate: f64,
    service_rate: f64,
    waiting: VecDeque<f64>,
    busy: bool,
    arrivals: u64,
    departures: u64,
    max_queue: usize,
    total_wait: f64,
}

type SharedQueue = Arc<Mutex<Queue>>;

fn exponential(rng: &mut StdRng, rate: f64) -> f64 {
    let u: f64 = rng.random();
    -(1.0 - u).ln() / rate
}

fn schedule_arrival(simulator: &Simulator<f64>, queue: &SharedQueue) -> EventResult {
    let delay = {
        let mut q = queue.lock();
        let rate = q.arrival_rate;
        exponential(&mut q.rng, rate)
    };
    let queue = Arc::clone(queue);
    simulator.schedule_event_rel(
        delay,
        Priority::NORMAL,
        Action::closure(move |sim| arrive(sim, &queue)),
    )?;
    Ok(())
}

fn schedule_departure(simulator: &Simulator<f64>, queue: &SharedQueue) -> EventResult {
    let delay = {
        let mut q = queue.lock();
        let rate = q.service_rate;
        exponential(&mut q.rng, rate)
    };
    let queue = Arc::clone(queue);
    simulator.schedule_event_rel(
        delay,
        Priority::NORMAL,
        Action::closure(move |sim| depart(sim, &queue)),
    )?;
    Ok(())
}

fn arrive(simulator: &Simulator<f64>, queue: &SharedQueue) -> EventResult {
    let now = simulator.simulator_time();
    let serve_now = {
        let mut q = queue.lock();
        q.arrivals += 1;
        if q.busy {
            q.waiting.push_back(now);
            q.max_queue = q.max_queue.max(q.waiting.len());
            false
        } else {
            q.busy = true;
            true
        }
    };
    if serve_now {
        schedule_departure(simulator, queue)?;
    }
    schedule_arrival(simulator, queue)
}

fn depart(simulator: &Simulator<f64>, queue: &SharedQueue) -> EventResult {
    let now = simulator.simulator_time();
    let serve_next = {
        let mut q = queue.lock();
        q.departures += 1;
        match q.waiting.pop_front() {
            Some(arrived) => {
                q.total_wait += now - arrived;
                true
            }
            None => {
                q.busy = false;
                false
            }
        }
    };
    if serve_next {
        schedule_departure(simulator, queue)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Summary {
    simulator: String,
    replication: String,
    final_time: f64,
    events_executed: u64,
    arrivals: u64,
    departures: u64,
    in_queue: usize,
    max_queue: usize,
    mean_wait: f64,
    run_state: RunState,
    replication_state: ReplicationState,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    // 1. Load config (default or from file)
    let mut config = if let Some(ref path) = cli.config {
        match load_config(&path.to_string_lossy()) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };
    if let Some(flavor) = cli.flavor {
        config.simulator.flavor = flavor.into();
    }

    // 2. Build simulator and replication
    let (simulator, replication) = match (config.build_simulator(), config.build_replication()) {
        (Ok(s), Ok(r)) => (s, r),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let context = replication.context().to_string();

    // 3. Construct the model
    let queue: SharedQueue = Arc::new(Mutex::new(Queue {
        rng: StdRng::seed_from_u64(cli.seed),
        arrival_rate: cli.arrival_rate,
        service_rate: cli.service_rate,
        waiting: VecDeque::new(),
        busy: false,
        arrivals: 0,
        departures: 0,
        max_queue: 0,
        total_wait: 0.0,
    }));
    let model_queue = Arc::clone(&queue);
    let mut model = move |sim: &Simulator<f64>| -> EventResult { schedule_arrival(sim, &model_queue) };
    let events = simulator.subscribe();
    if let Err(e) = simulator.initialize(&mut model, replication) {
        eprintln!("Failed to initialize: {e}");
        std::process::exit(1);
    }

    // 4. Run until the loop stops
    let started = match (cli.run_until, cli.run_until_including) {
        (Some(t), _) => simulator.run_up_to(t),
        (None, Some(t)) => simulator.run_up_to_and_including(t),
        (None, None) => simulator.start(),
    };
    if let Err(e) = started {
        eprintln!("Failed to start: {e}");
        std::process::exit(1);
    }
    while let Ok(event) = events.recv() {
        if event == SimulatorEvent::Stop {
            break;
        }
    }
    if let Some(e) = simulator.take_event_error() {
        tracing::error!("Run stopped by a failed event: {}", e);
    }

    // 5. Report
    let summary = {
        let q = queue.lock();
        Summary {
            simulator: simulator.id().to_string(),
            replication: context,
            final_time: simulator.simulator_time(),
            events_executed: simulator.events_executed(),
            arrivals: q.arrivals,
            departures: q.departures,
            in_queue: q.waiting.len(),
            max_queue: q.max_queue,
            mean_wait: if q.departures > 0 {
                q.total_wait / q.departures as f64
            } else {
                0.0
            },
            run_state: simulator.run_state(),
            replication_state: simulator.replication_state(),
        }
    };
    simulator.clean_up();

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize summary: {e}");
                std::process::exit(1);
            }
        }
    } else {
        println!("Simulator:        {}", summary.simulator);
        println!("Replication:      {}", summary.replication);
        println!("Final time:       {:.3}", summary.final_time);
        println!("Events executed:  {}", summary.events_executed);
        println!("Arrivals:         {}", summary.arrivals);
        println!("Departures:       {}", summary.departures);
        println!("In queue:         {}", summary.in_queue);
        println!("Max queue:        {}", summary.max_queue);
        println!("Mean wait:        {:.3}", summary.mean_wait);
        println!("Final state:      {} / {}", summary.run_state, summary.replication_state);
    }
}
