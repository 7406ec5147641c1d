//!This is the core library for the pwmux project. All other pwmux libraries depend on this one. It holds the
//! types shared between the device drivers, the bus providers and the configuration layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub mod error;

///Identifies one physical chip: the i2c bus it hangs off and its 7 bit address on that bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BusAddress {
    pub bus: u8,
    pub address: u8,
}

impl BusAddress {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl From<(u8, u8)> for BusAddress {
    fn from((bus, address): (u8, u8)) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c bus {}, address {:#x}", self.bus, self.address)
    }
}

///A sink that values can be written to. The receiving end is held by whatever task drives the hardware.
pub struct Output<T> {
    pub tx: mpsc::Sender<T>,
}

impl<T> Output<T> {
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
    pub fn sink(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }
}
