//! OGforge Updater - self-update subsystem for the OGforge desktop app
//!
//! Embedders implement [`engine::updater::Host`], build an
//! [`UpdateController`](engine::updater::UpdateController), attach a
//! [`commands::StatusBridge`] as its window and route UI calls through the
//! functions in [`commands`].

pub mod commands;
pub mod engine;
