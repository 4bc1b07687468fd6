use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;
use storesim::config::SimulationConfig;
use storesim::io;
use storesim::simulator::Simulator;

#[derive(Parser, Debug)]
#[command(about = "Trace-driven storage cache simulator")]
struct Args {
    /// Path to the JSON simulation config
    config: PathBuf,
    /// Path to the JSON trace file
    trace: PathBuf,

    /// Run each configured cache on its own thread
    #[arg(short = 'j', long)]
    parallel: bool,

    #[arg(short, long)]
    performance: bool,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let start = Instant::now();
    let args = Args::parse();

    let config_file = File::open(&args.config).map_err(|e| {
        format!(
            "Couldn't open the config file at path {}: {e}",
            args.config.display()
        )
    })?;
    let config: SimulationConfig = serde_json::from_reader(BufReader::new(config_file))
        .map_err(|e| format!("Couldn't parse the config file: {e}"))?;

    let trace = io::read_trace(&args.trace)?;

    let mut simulator = Simulator::new(config, trace).map_err(|e| e.to_string())?;
    let report = if args.parallel {
        simulator.simulate_parallel()
    } else {
        simulator.simulate()
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Couldn't serialise the output {e}"))?
    );

    if args.performance {
        let simulation_time = simulator.get_execution_time();
        let total_time = start.elapsed();
        println!("Simulation time: {}s", simulation_time.as_nanos() as f64 / 1e9);
        println!(
            "Total execution time (includes parsing, configuration, and output): {}s",
            total_time.as_nanos() as f64 / 1e9
        );
    }
    Ok(())
}
