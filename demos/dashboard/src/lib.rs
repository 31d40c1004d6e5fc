//! Terminal dashboard driving the weathermap controller
//!
//! The page is simulated: scripts are fetched over HTTP, the URL bar and the
//! map are printed to stdout, and commands on stdin play the user.

pub mod api;
pub mod commands;
pub mod host;
pub mod widget;
