pub mod analytics;
pub mod binder;
pub mod config;
pub mod error;
pub mod events;
pub mod field;
pub mod impact;
pub mod io;
pub mod paths;
pub mod progression;
pub mod store;
pub mod types;
pub mod weave;

pub use error::{Result, WeaveError};
pub use weave::{SendMessage, SentMessage, Weave};
