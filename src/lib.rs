//! Web service that captions uploaded images with a pretrained BLIP model.
//!
//! Uploads are written to a scratch directory only for the duration of the
//! caption call; see [`uploads`] for the lifecycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod routes;
pub mod ui;
pub mod uploads;

pub use config::Config;
pub use engine::{CaptionEngine, RemoteCaptionEngine};
pub use routes::{router, AppState};
