mod args;
mod pipeline;

use clap::Parser;
use log::{debug, info};

use std::error::Error;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    debug!("main: args: {:?}", args);

    let res = pipeline::run(&args);

    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
    info!("Done");
}
