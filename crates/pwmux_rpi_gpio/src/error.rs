use std::fmt::{Debug, Formatter};

pub struct RpiI2cError {
    pub message: String,
}

impl Debug for RpiI2cError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(&self.message)
    }
}

impl From<rppal::i2c::Error> for RpiI2cError {
    fn from(err: rppal::i2c::Error) -> Self {
        Self {
            message: format!("RpiI2cError - Cause: {}", err),
        }
    }
}
