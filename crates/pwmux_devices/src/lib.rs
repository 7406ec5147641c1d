//!Drivers for pwm chips. Every driver is generic over an `embedded_hal` i2c bus so it can run on a Raspberry Pi
//! (see `pwmux_rpi_gpio`) or against a mock in tests.

pub mod devices;

#[cfg(feature = "pca9685")]
pub mod outputs;
