//! sc-core CLI entry point.

use clap::Parser;
use sc_core::cli::{run, Cli};

fn main() {
    let cli = Cli::parse();
    let code = run(cli);
    std::process::exit(code.as_i32());
}
