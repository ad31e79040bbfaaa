//! Command line interface for computing the scratch space a solve needs.

use super::utils;
use crate::scratch::fmg_scratch_size;
use clap::{ArgMatches, Command};

/// Builds a representation of the `scratch_size` command line subcommand.
pub fn create_scratch_size_subcommand() -> Command {
    Command::new("scratch_size")
        .about("Print the number of scratch values needed to solve on a grid")
        .arg(utils::create_shape_argument())
        .arg(utils::create_components_argument())
        .arg(utils::create_symmetric_argument())
}

/// Runs the actions for the `scratch_size` subcommand using the given arguments.
pub fn run_scratch_size_subcommand(arguments: &ArgMatches) {
    let shape = utils::parse_shape(arguments);
    let num_components = utils::parse_num_components(arguments);
    let layout = utils::parse_coefficient_layout(arguments);
    println!("{}", fmg_scratch_size(&shape, num_components, layout));
}
