//!A mod for the error types
use std::fmt::Debug;

use thiserror::Error;

use crate::BusAddress;

///Errors raised while talking to PWM chips. `E` is the error type of the underlying i2c transport.
#[derive(Debug, Error)]
pub enum PwmError<E: Debug> {
    ///The bus for a chip could not be opened. Fatal to building the chip and anything that owns it.
    #[error("could not open {target}: {message}")]
    Construction { target: BusAddress, message: String },

    ///A register write failed. Passed through unchanged, nothing is retried.
    #[error("i2c transport error: {0:?}")]
    Transport(E),

    ///Only raised when the out of range policy is `Reject`.
    #[error("channel {index} is out of range, only {available} channels are configured")]
    OutOfRangeChannel { index: usize, available: usize },

    #[error("local channel {0} is out of range, a PCA9685 has 16 outputs")]
    InvalidLocalChannel(u8),

    #[error("frequency {0} Hz is outside the supported range of 24 to 1526 Hz")]
    InvalidFrequency(u16),

    #[error("at least one bus/address pair is required")]
    NoDrivers,
}

///Common error type when building from configuration.
#[derive(Error)]
pub enum PwmuxBuildError {
    #[error("{0}")]
    Message(String),
    #[error("{}", .0.join("\n"))]
    Messages(Vec<String>),
}

impl PwmuxBuildError {
    pub fn from_string(msg: String) -> Self {
        PwmuxBuildError::Message(msg)
    }
    ///Merges several errors into one `Messages`, keeping their order.
    pub fn from_errs(errs: Vec<PwmuxBuildError>) -> Self {
        let mut messages = Vec::with_capacity(errs.len());
        for err in errs {
            match err {
                Self::Message(msg) => messages.push(msg),
                Self::Messages(mut msgs) => messages.append(&mut msgs),
            }
        }
        Self::Messages(messages)
    }
}

impl Debug for PwmuxBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => f.write_fmt(format_args!("PwmuxBuildError: {}", message)),
            Self::Messages(messages) => f.write_fmt(format_args!(
                "PwmuxBuildError (multiple): \n{}",
                messages.join("\n")
            )),
        }
    }
}

impl<E: Debug> From<PwmError<E>> for PwmuxBuildError {
    fn from(err: PwmError<E>) -> Self {
        PwmuxBuildError::from_string(err.to_string())
    }
}
