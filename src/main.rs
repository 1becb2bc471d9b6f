//! Wordcoach - vocabulary flashcards with AI pronunciation feedback
//!
//! This is the main entry point for the Wordcoach application.

mod ai;
mod app;
mod audio;
mod cli;
mod error;
mod models;
mod settings;
mod state;

use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Wordcoach");

    // Device callbacks arrive on their own threads; everything else runs on
    // one cooperative thread
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(app::run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
