//! Mood-to-playlist service library
//!
//! This library turns a free-text mood prompt into a Spotify playlist. A user
//! logs in through OAuth 2.0 with PKCE, a planner interprets the prompt into a
//! structured seed plan, the recommendations API is queried with resolved seeds,
//! and the filtered result can be published back to the user's account.
//!
//! # Modules
//!
//! - `api` - HTTP handlers and the cookie-backed session transport
//! - `cli` - Command-line entry points (`serve`, `plan`)
//! - `config` - Environment loading and typed settings
//! - `error` - Error taxonomy shared by every layer
//! - `management` - Token store, single-flight refresh, login flow, rate limiting
//! - `pipeline` - Seed resolution, recommendation aggregation, publishing
//! - `planner` - Prompt-to-plan providers (LLM backends and heuristic)
//! - `preview` - Best-effort audio preview lookup with caching
//! - `server` - Router assembly and the HTTP serve loop
//! - `spotify` - Spotify Web API client behind the `MusicService` trait
//! - `types` - Data structures and wire types
//! - `utils` - PKCE primitives and string helpers
//!
//! # Example
//!
//! ```
//! use moodmix::{config, server};
//!
//! #[tokio::main]
//! async fn main() -> moodmix::Res<()> {
//!     config::load_env().await?;
//!     let settings = config::Settings::from_env()?;
//!     server::start_api_server(settings).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod management;
pub mod pipeline;
pub mod planner;
pub mod preview;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

pub use error::AppError;

/// A convenient Result type alias for command-level operations that may fail.
///
/// Library components return [`AppError`]; the CLI layer collapses everything
/// into a boxed error so that configuration, IO and server failures can be
/// reported the same way.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Listening on {}", addr);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only used from the binary for failures that leave nothing to recover,
/// e.g. a configuration that cannot be loaded at startup.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
