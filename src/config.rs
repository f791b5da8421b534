//! Configuration and CLI argument handling

use std::path::PathBuf;

use clap::Parser;

use crate::state::TimerState;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "focus-engine")]
#[command(about = "Pomodoro timer and ambience mixer behind a local HTTP control surface")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory for persisted state (timer, ambience, stats)
    #[arg(long, default_value = "./focus-data")]
    pub data_dir: PathBuf,

    /// Directory holding the ambience loop files
    #[arg(long, default_value = "./assets/audio")]
    pub assets_dir: PathBuf,

    /// Work phase length in minutes
    #[arg(short, long, default_value = "25", value_parser = clap::value_parser!(u32).range(1..))]
    pub work: u32,

    /// Short break length in minutes
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub short_break: u32,

    /// Long break length in minutes
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u32).range(1..))]
    pub long_break: u32,

    /// Completed work sessions between long breaks
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..))]
    pub long_break_interval: u32,

    /// Track volumes without loading or playing any audio
    #[arg(long)]
    pub no_audio: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Timer used when nothing has been persisted yet
    pub fn timer_defaults(&self) -> TimerState {
        TimerState::new(
            self.work.saturating_mul(60),
            self.short_break.saturating_mul(60),
            self.long_break.saturating_mul(60),
        )
            .with_long_break_interval(self.long_break_interval)
    }

    /// Assets directory, or `None` when audio is disabled
    pub fn audio_assets(&self) -> Option<PathBuf> {
        if self.no_audio {
            None
        } else {
            Some(self.assets_dir.clone())
        }
    }
}
