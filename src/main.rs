use clap::Parser;
use ctd_processor::cli::{self, Args, Outcome};
use std::process;

fn main() {
    let args = Args::parse();

    match cli::run(args) {
        Ok(Outcome::Success) => process::exit(0),
        Ok(Outcome::IssuesFound) => process::exit(1),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
