//! Command-line arguments.
//!
//! Credentials come from the environment (see [`crate::config`]); flags only
//! tune where the run points and how patient it is.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    about = "Keep a Zeabur dashboard session alive from a stored cookie string",
    version
)]
pub struct Args {
    /// Dashboard URL to visit.
    #[arg(long, default_value = "https://zeabur.com/projects")]
    pub dashboard_url: String,

    /// Where the evidence screenshot is written.
    #[arg(long, default_value = "/tmp/zeabur_dashboard.png")]
    pub screenshot_path: PathBuf,

    /// Explicit Chromium binary (otherwise CHROME_PATH or known locations).
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Navigation timeout in seconds (load event + network idle).
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Settle delay before the title check, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,
}
