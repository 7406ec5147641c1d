//!This library provides access to the Raspberry Pi i2c buses. It is a wrapper around the rppal library.
//!
//! `open_bus` matches the bus provider signature taken by `pwmux_devices::devices::multi_pca9685::MultiPca9685::new`.

//internal error type for rpi i2c
pub mod error;

pub use rppal::i2c::I2c;

use error::RpiI2cError;
use pwmux_core::BusAddress;
use tracing::debug;

///Opens `/dev/i2c-{bus}` and points it at the chip's address.
pub fn open_bus(target: BusAddress) -> Result<I2c, RpiI2cError> {
    let mut i2c = I2c::with_bus(target.bus)?;
    i2c.set_slave_address(target.address as u16)?;
    debug!("opened {}", target);
    Ok(i2c)
}
