//! Command-line interface for Wordcoach
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// Wordcoach - vocabulary flashcards with AI pronunciation feedback
#[derive(Parser, Debug)]
#[command(name = "wordcoach")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = include HTTP internals
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Word list file (defaults to ~/.local/share/wordcoach/lse_words.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show every card and its mastery level
    List,

    /// Add a word, generating its phonetic, definition and example
    Add {
        /// The English word to add
        word: String,
    },

    /// Play the reference pronunciation of a word
    Say {
        /// Word text or card id
        word: String,
    },

    /// Practice cards interactively
    Practice {
        /// Start at this card (text or id)
        #[arg(long)]
        word: Option<String>,

        /// Save every attempt as a WAV file
        #[arg(long)]
        keep_recordings: bool,
    },

    /// Show or change collaborator settings
    Config {
        #[arg(long)]
        text_model: Option<String>,

        #[arg(long)]
        speech_model: Option<String>,

        /// Prebuilt voice for pronunciation playback
        #[arg(long)]
        voice: Option<String>,

        /// Language feedback is written in
        #[arg(long)]
        feedback_language: Option<String>,
    },
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    builder.filter_module("wordcoach", args.log_level());

    // HTTP stack only at -vvvv
    if args.verbose >= 4 {
        builder.filter_module("reqwest", args.log_level());
        builder.filter_module("hyper", args.log_level());
        builder.filter_module("hyper_util", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
