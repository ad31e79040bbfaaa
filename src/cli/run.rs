//! Function for running the command line program.

use super::{build, scratch_size::run_scratch_size_subcommand, solve::run_solve_subcommand};
use clap::ArgMatches;
use std::time::Instant;

/// Runs the `regfmg` command line program.
pub fn run() {
    let command = build::build();
    run_with_args(command.get_matches());
}

/// Runs the `regfmg` command line program with the given parsed arguments.
pub fn run_with_args(arguments: ArgMatches) {
    let start_instant = Instant::now();

    if let Some(solve_arguments) = arguments.subcommand_matches("solve") {
        run_solve_subcommand(solve_arguments);
    }
    if let Some(scratch_size_arguments) = arguments.subcommand_matches("scratch_size") {
        run_scratch_size_subcommand(scratch_size_arguments);
    }

    if arguments.get_flag("timing") {
        println!("Elapsed time: {} s", start_instant.elapsed().as_secs_f64());
    }
}
