//! Headless Chromium driver.
//!
//! This crate keeps the browser behind a narrow capability seam:
//!
//! - [`ChromeLauncher`]: finds a Chromium binary, spawns it headless with a
//!   throwaway profile, and scrapes the DevTools WebSocket endpoint.
//! - [`CdpConnection`]: minimal Chrome DevTools Protocol client. JSON-RPC
//!   command/response correlation plus an event broadcast channel.
//! - [`BrowserPage`]: the capability trait the rest of the system programs
//!   against (navigate, cookies, screenshot, url/title).
//! - [`verify::is_authenticated`]: the fail-closed session verifier.
//!
//! The browser engine itself stays an opaque external process; nothing here
//! interprets page content beyond URL and title.

pub mod cdp;
pub mod error;
pub mod launcher;
pub mod page;
pub mod verify;

pub use cdp::{CdpConnection, CdpEvent};
pub use error::{BrowserError, Result};
pub use launcher::{Chrome, ChromeLauncher};
pub use page::{BrowserPage, CdpPage};
pub use verify::{VerifyMarkers, is_authenticated};
