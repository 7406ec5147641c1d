use std::{collections::HashSet, fmt::{self, Debug}};

use embedded_hal::i2c::I2c;
use pwmux_core::{error::PwmError, BusAddress};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use super::pca9685::{check_frequency, Pca9685, OUTPUTS_PER_DRIVER};

///Used when no frequency is configured. Standard rate for hobby servos.
pub const DEFAULT_FREQUENCY_HZ: u16 = 50;

///What `set_channel` does with an index past the last configured chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OutOfRangePolicy {
    ///Drop the command without writing anything and report `Dispatch::Dropped`.
    #[default]
    Ignore,
    ///Fail with `PwmError::OutOfRangeChannel`.
    Reject,
}

///Outcome of a command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Written,
    Dropped,
}

///Where a global channel index lands: the position of the chip in the configured order and the output on that chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLocation {
    pub driver: usize,
    pub channel: u8,
}

impl ChannelLocation {
    pub fn index(&self) -> usize {
        self.driver * OUTPUTS_PER_DRIVER as usize + self.channel as usize
    }
}

///Splits a global index without checking it against any particular set of chips.
pub fn split_index(index: usize) -> ChannelLocation {
    let per_driver = OUTPUTS_PER_DRIVER as usize;
    ChannelLocation {
        driver: index / per_driver,
        channel: (index % per_driver) as u8,
    }
}

///Snapshot of how a `MultiPca9685` was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub frequency: u16,
    pub drivers: Vec<BusAddress>,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PCA9685 multiplexer configuration:")?;
        writeln!(f, "    drivers: {}", self.drivers.len())?;
        writeln!(f, "    frequency: {} Hz", self.frequency)?;
        for (i, target) in self.drivers.iter().enumerate() {
            writeln!(f, "    driver {} -> {}", i + 1, target)?;
        }
        Ok(())
    }
}

///A set of PCA9685 chips, possibly spread over several i2c buses, addressed as one flat range of channels.
///
/// Channel `i` is output `i % 16` of the chip at position `i / 16` in the order the chips were given to `new`.
pub struct MultiPca9685<I2C> {
    drivers: Vec<Pca9685<I2C>>,
    targets: Vec<BusAddress>,
    frequency: u16,
    policy: OutOfRangePolicy,
    debug: bool,
}

impl<I2C> MultiPca9685<I2C>
where
    I2C: I2c,
{
    ///Opens every target with `open_bus` and programs it with `frequency`, in order.
    ///
    /// Nothing is kept if any chip fails: the first error is returned and the chips built so far are dropped.
    pub fn new<F, E>(targets: &[BusAddress], frequency: u16, mut open_bus: F) -> Result<Self, PwmError<I2C::Error>>
    where
        F: FnMut(BusAddress) -> Result<I2C, E>,
        E: Debug,
    {
        if targets.is_empty() {
            return Err(PwmError::NoDrivers);
        }
        let frequency = check_frequency::<I2C::Error>(frequency)?;

        let mut seen = HashSet::with_capacity(targets.len());
        for target in targets {
            if !seen.insert(target) {
                warn!("{} is configured more than once, its channels will collide", target);
            }
        }

        let mut drivers = Vec::with_capacity(targets.len());
        for target in targets {
            let i2c = open_bus(*target).map_err(|err| PwmError::Construction {
                target: *target,
                message: format!("{:?}", err),
            })?;
            drivers.push(Pca9685::new(i2c, *target, frequency)?);
        }
        debug!("built {} PCA9685 drivers at {} Hz", drivers.len(), frequency);

        Ok(MultiPca9685 {
            drivers,
            targets: targets.to_vec(),
            frequency,
            policy: OutOfRangePolicy::default(),
            debug: false,
        })
    }

    pub fn with_default_frequency<F, E>(targets: &[BusAddress], open_bus: F) -> Result<Self, PwmError<I2C::Error>>
    where
        F: FnMut(BusAddress) -> Result<I2C, E>,
        E: Debug,
    {
        Self::new(targets, DEFAULT_FREQUENCY_HZ, open_bus)
    }

    pub fn num_drivers(&self) -> usize {
        self.drivers.len()
    }

    pub fn num_channels(&self) -> usize {
        self.drivers.len() * OUTPUTS_PER_DRIVER as usize
    }

    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    pub fn targets(&self) -> &[BusAddress] {
        &self.targets
    }

    pub fn policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: OutOfRangePolicy) {
        self.policy = policy;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    ///`None` when `index` is past the last configured chip.
    pub fn locate(&self, index: usize) -> Option<ChannelLocation> {
        let location = split_index(index);
        (location.driver < self.drivers.len()).then_some(location)
    }

    ///Routes on/off counts to the chip and output that `index` maps to.
    pub fn set_channel(&mut self, index: usize, on: u16, off: u16) -> Result<Dispatch, PwmError<I2C::Error>> {
        let Some(location) = self.locate(index) else {
            return match self.policy {
                OutOfRangePolicy::Ignore => {
                    trace!("dropping command for channel {}, only {} channels", index, self.num_channels());
                    Ok(Dispatch::Dropped)
                }
                OutOfRangePolicy::Reject => Err(PwmError::OutOfRangeChannel {
                    index,
                    available: self.num_channels(),
                }),
            };
        };

        if self.debug {
            let target = self.targets[location.driver];
            info!(
                "setting pwm ({}, {}) for channel {} on driver {}, output {} at address {:#x} on i2c bus {}",
                on, off, index, location.driver, location.channel, target.address, target.bus
            );
        }

        self.drivers[location.driver].set_channel(location.channel, on, off)?;
        Ok(Dispatch::Written)
    }

    pub fn set_channel_off_time(&mut self, index: usize, off: u16) -> Result<Dispatch, PwmError<I2C::Error>> {
        self.set_channel(index, 0, off)
    }

    ///Writes the same timing to every output of every chip. Stops at the first chip that fails.
    pub fn set_all(&mut self, on: u16, off: u16) -> Result<(), PwmError<I2C::Error>> {
        if self.debug {
            info!("setting pwm ({}, {}) on all {} drivers", on, off, self.drivers.len());
        }
        for driver in &mut self.drivers {
            driver.set_all(on, off)?;
        }
        Ok(())
    }

    pub fn configuration(&self) -> Configuration {
        Configuration {
            frequency: self.frequency,
            drivers: self.targets.clone(),
        }
    }

    ///Flips diagnostic logging of every routed command. Returns the new state.
    pub fn toggle_debug(&mut self) -> bool {
        self.debug = !self.debug;
        if self.debug {
            info!("debug output on");
        } else {
            info!("debug output off");
        }
        self.debug
    }

    ///Gives back the i2c handles in the order the chips were configured.
    pub fn destroy(self) -> Vec<I2C> {
        self.drivers.into_iter().map(Pca9685::destroy).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_index_divides_by_sixteen() {
        assert_eq!(split_index(0), ChannelLocation { driver: 0, channel: 0 });
        assert_eq!(split_index(15), ChannelLocation { driver: 0, channel: 15 });
        assert_eq!(split_index(17), ChannelLocation { driver: 1, channel: 1 });
        assert_eq!(split_index(95), ChannelLocation { driver: 5, channel: 15 });
        assert_eq!(split_index(17).index(), 17);
    }

    #[test]
    fn configuration_lists_drivers_from_one() {
        let cfg = Configuration {
            frequency: 60,
            drivers: vec![BusAddress::new(1, 0x40), BusAddress::new(3, 0x41)],
        };
        let expected = "PCA9685 multiplexer configuration:\n    drivers: 2\n    frequency: 60 Hz\n    driver 1 -> i2c bus 1, address 0x40\n    driver 2 -> i2c bus 3, address 0x41\n";
        assert_eq!(cfg.to_string(), expected);
    }

    #[test]
    fn default_policy_ignores_out_of_range() {
        assert_eq!(OutOfRangePolicy::default(), OutOfRangePolicy::Ignore);
    }
}
