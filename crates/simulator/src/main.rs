//! Byzantine Generals simulator
//!
//! Runs one round of the Oral Messages algorithm OM(m): every lieutenant is
//! its own task relaying the commander's order to the others, traitors lie to
//! part of the army, and each lieutenant finally reports its majority vote.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use om_consensus::{Coordinator, Order, RoundOutcome, SettleStrategy};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::SimulatorConfig;

/// Settle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Settle {
    /// Stop after a quiet period
    Quiescence,
    /// Stop once every expected message has arrived
    Count,
}

impl From<Settle> for SettleStrategy {
    fn from(settle: Settle) -> Self {
        match settle {
            Settle::Quiescence => SettleStrategy::Quiescence,
            Settle::Count => SettleStrategy::ExpectedCount,
        }
    }
}

/// Byzantine Generals simulation with the Oral Messages algorithm
#[derive(Parser, Debug)]
#[command(name = "bgenerals")]
#[command(about = "Simulate OM(m) agreement among Byzantine generals", long_about = None)]
struct Args {
    /// Recursion bound m
    recursion_bound: Option<usize>,

    /// Number of generals, commander included
    num_participants: Option<usize>,

    /// Commander's order (A or R)
    order: Option<Order>,

    /// JSON config file; explicit arguments override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// How lieutenants decide relay traffic has settled
    #[arg(long, value_enum)]
    settle: Option<Settle>,

    /// Quiescence window in milliseconds
    #[arg(long)]
    quiescence_ms: Option<u64>,

    /// Wait for the first message in milliseconds
    #[arg(long)]
    initial_timeout_ms: Option<u64>,

    /// Seed for the random traitor draw
    #[arg(long)]
    seed: Option<u64>,

    /// Chance of each general being a traitor
    #[arg(long)]
    traitor_probability: Option<f64>,

    /// Make the commander a traitor (disables the random draw)
    #[arg(long)]
    commander_traitor: bool,

    /// Traitorous lieutenants, e.g. 2,5 (disables the random draw)
    #[arg(long, value_delimiter = ',')]
    traitors: Option<Vec<u16>>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Print every lieutenant's received messages
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Config file (or defaults) with explicit arguments applied on top
    fn resolve(&self) -> Result<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => SimulatorConfig::load(path)?,
            None => SimulatorConfig::default(),
        };

        if let Some(m) = self.recursion_bound {
            config.recursion_bound = m;
        }
        if let Some(n) = self.num_participants {
            config.num_participants = n;
        }
        if let Some(order) = self.order {
            config.order = order;
        }
        if let Some(settle) = self.settle {
            config.settle = settle.into();
        }
        if let Some(ms) = self.quiescence_ms {
            config.quiescence_ms = ms;
        }
        if let Some(ms) = self.initial_timeout_ms {
            config.initial_timeout_ms = ms;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(p) = self.traitor_probability {
            config.traitor_probability = p;
        }
        if self.commander_traitor {
            config.commander_traitor = true;
        }
        if let Some(traitors) = &self.traitors {
            config.traitors = Some(traitors.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.resolve()?;
    let simulation = config.simulation()?;
    let mut traitors = config.traitor_selector()?;

    tracing::info!("  Recursion bound: {}", simulation.recursion_bound);
    tracing::info!("  Generals: {}", simulation.num_participants);
    tracing::info!("  Settle: {:?} ({}ms window)", simulation.settle, config.quiescence_ms);

    let outcome = Coordinator::new(simulation)
        .run(traitors.as_mut())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, args.verbose);
    }

    Ok(())
}

fn print_outcome(outcome: &RoundOutcome, verbose: bool) {
    if outcome.commander_traitor {
        println!("The commander is a traitor!");
    }
    for id in outcome.traitors() {
        println!("Lieutenant {} is a traitor!", id);
    }

    if verbose {
        for report in &outcome.reports {
            for msg in report.log.messages() {
                println!(
                    "Lieutenant {} received {} via {}",
                    report.lieutenant, msg.order, msg.path
                );
            }
        }
    }

    for decision in &outcome.decisions {
        println!("Lieutenant {} votes {}", decision.lieutenant, decision.order);
    }

    match outcome.loyal_agreement() {
        Some(order) => println!("Loyal lieutenants agree on {}", order),
        None => println!("Loyal lieutenants disagree"),
    }
    println!(
        "{} messages relayed, {} corrupted",
        outcome.stats.messages_relayed, outcome.stats.messages_corrupted
    );
}
