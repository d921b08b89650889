use clap::Parser;
use std::process::ExitCode;

use landform_cli::{run, AppError, Args};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(summary) => {
            println!("Generated terrain: {}", summary.out_dir.display());
            println!(
                "Land fraction {:.3}; dominant landmass ratio {:.3}",
                summary.land_fraction, summary.largest_land_ratio
            );
            println!(
                "Generation time: {:.3} s ({}x{})",
                summary.generation_seconds, args.w, args.h
            );
            ExitCode::SUCCESS
        }
        Err(AppError::User(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
        Err(AppError::Fatal(err)) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
