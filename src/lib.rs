//! A launcher for hourly animal bots on Telegram.
//!
//! Each bot is described by its own JSON settings file (see [`config`]) and
//! runs on its own thread with its own [`teloxide`](https://docs.rs/teloxide/latest/teloxide/)
//! update loop (see [`runner`]).
//!
//! ## Getting Started
//!
//! The crate ships a single-binary executable, pass one `-c` per bot:
//!
//! ```shell
//! $ /path/to/hourly-bot -c conf/cats.json -c conf/dogs.json
//! ```
//!
//! To embed the bots in another program, use [`app::App`].
//!
//! *Note: Only the `/start` command is answered for now. The commands listed
//! in the `bot_commands` catalog are not implemented yet.*

#[macro_use]
extern crate log;
#[macro_use]
extern crate async_trait;

pub mod app;
pub mod config;
mod dispatcher;
pub mod error;
mod module_mgr;
mod modules;
pub mod runner;
mod types;
mod utils;

pub use error::{Error, Result};
