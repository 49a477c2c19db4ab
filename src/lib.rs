//! ffencode - declarative ffmpeg jobs with typed lifecycle events
//!
//! Describe one or more encodings with the fluent [`Encoder`], then run each
//! resulting [`EncodingProcess`] and follow its [`EventStream`]: start, probe
//! metadata, progress, and a final end or error event.

pub mod cli;
pub mod config;
pub mod encoder;
pub mod encoding;
pub mod error;
pub mod media;
pub mod process;

pub use encoder::{Encoder, EventHandler, fan_in};
pub use encoding::{Encoding, EncodingOptions};
pub use error::{EncodeError, Result};
pub use process::{EncodingEvent, EncodingProcess, EncodingStatus, EventStream};
