mod args;
mod flip;

use clap::Parser;
use log::{debug, LevelFilter};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    debug!("main: args: {:?}", args);

    match flip::run_analysis(&args) {
        Ok(result) => {
            if result.has_unrecoverable() {
                eprintln!(
                    "The outcome of {} year(s) could not be determined",
                    result
                        .failures
                        .iter()
                        .filter(|f| f.kind == electoral_flip::FailureKind::UndeterminedOutcome)
                        .count()
                );
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("{}", bt);
            }
            std::process::exit(1);
        }
    }
}
