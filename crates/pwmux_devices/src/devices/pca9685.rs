use embedded_hal::i2c::I2c;
use pwmux_core::{error::PwmError, BusAddress};
use tracing::{debug, trace};

///Number of pwm outputs on one chip.
pub const OUTPUTS_PER_DRIVER: u8 = 16;

///Frequency of the internal oscillator the prescaler divides.
pub const CLOCK_HZ: u32 = 25_000_000;

pub const MIN_FREQUENCY_HZ: u16 = 24;
pub const MAX_FREQUENCY_HZ: u16 = 1526;

///Bit 4 of the high byte. Set on the on time for a channel that is fully on, on the off time for fully off.
pub const FULL: u16 = 0x1000;

const MODE1_REGISTER: u8 = 0x00;
const LED0_ON_L_REGISTER: u8 = 0x06;
const ALL_LED_ON_L_REGISTER: u8 = 0xFA;
const PRESCALE_REGISTER: u8 = 0xFE;
const CHANNEL_STRIDE: u8 = 4;

const MODE1_RESET: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;
const MODE1_RESTART: u8 = 0xA0;

///Prescale register value for the given pwm frequency: `round(CLOCK_HZ / (4096 * frequency)) - 1`.
///
/// The rounding happens on the quotient, before the subtraction, using integer math only.
/// `frequency` must already be within `MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ`.
pub fn prescale(frequency: u16) -> u8 {
    let divisor = 4096 * frequency as u32;
    let rounded = (CLOCK_HZ + divisor / 2) / divisor;
    (rounded - 1) as u8
}

pub fn check_frequency<E: std::fmt::Debug>(frequency: u16) -> Result<u16, PwmError<E>> {
    if (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency) {
        Ok(frequency)
    } else {
        Err(PwmError::InvalidFrequency(frequency))
    }
}

//register address first, then on low/high and off low/high
fn timing_burst(register: u8, on: u16, off: u16) -> [u8; 5] {
    let [on_lo, on_hi] = on.to_le_bytes();
    let [off_lo, off_hi] = off.to_le_bytes();
    [register, on_lo, on_hi, off_lo, off_hi]
}

///One PCA9685 chip. Owns the i2c handle it was built with until `destroy` hands it back.
pub struct Pca9685<I2C> {
    i2c: I2C,
    target: BusAddress,
    frequency: u16,
    prescale: u8,
}

impl<I2C> Pca9685<I2C>
where
    I2C: I2c,
{
    ///Resets the chip at `target` and programs its pwm frequency. This is the only place the frequency is set.
    pub fn new(i2c: I2C, target: BusAddress, frequency: u16) -> Result<Self, PwmError<I2C::Error>> {
        let frequency = check_frequency::<I2C::Error>(frequency)?;
        let mut device = Pca9685 {
            i2c,
            target,
            frequency,
            prescale: prescale(frequency),
        };

        device.write_register(MODE1_REGISTER, MODE1_RESET)?;

        //the prescaler can only be written while the oscillator is asleep
        device.write_register(MODE1_REGISTER, MODE1_SLEEP)?;
        device.write_register(PRESCALE_REGISTER, device.prescale)?;
        device.write_register(MODE1_REGISTER, MODE1_RESTART)?;

        debug!(
            "configured PCA9685 on {} at {} Hz (prescale {})",
            target, frequency, device.prescale
        );
        Ok(device)
    }

    pub fn target(&self) -> BusAddress {
        self.target
    }

    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    pub fn prescale(&self) -> u8 {
        self.prescale
    }

    ///Writes the on and off counts (0-4095, or `FULL`) of one output in a single burst.
    pub fn set_channel(&mut self, channel: u8, on: u16, off: u16) -> Result<(), PwmError<I2C::Error>> {
        if channel >= OUTPUTS_PER_DRIVER {
            return Err(PwmError::InvalidLocalChannel(channel));
        }
        let register = LED0_ON_L_REGISTER + CHANNEL_STRIDE * channel;
        trace!("PCA9685 {} channel {}: on {} off {}", self.target, channel, on, off);
        self.write_burst(timing_burst(register, on, off))
    }

    ///Output goes high at the start of every cycle and low after `off` ticks.
    pub fn set_channel_off_time(&mut self, channel: u8, off: u16) -> Result<(), PwmError<I2C::Error>> {
        self.set_channel(channel, 0, off)
    }

    pub fn set_channel_full_on(&mut self, channel: u8) -> Result<(), PwmError<I2C::Error>> {
        self.set_channel(channel, FULL, 0)
    }

    pub fn set_channel_full_off(&mut self, channel: u8) -> Result<(), PwmError<I2C::Error>> {
        self.set_channel(channel, 0, FULL)
    }

    ///Same timing on all 16 outputs, written through the ALL_LED registers.
    pub fn set_all(&mut self, on: u16, off: u16) -> Result<(), PwmError<I2C::Error>> {
        self.write_burst(timing_burst(ALL_LED_ON_L_REGISTER, on, off))
    }

    ///Gives back the i2c handle.
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), PwmError<I2C::Error>> {
        self.i2c
            .write(self.target.address, &[register, value])
            .map_err(PwmError::Transport)
    }

    fn write_burst(&mut self, burst: [u8; 5]) -> Result<(), PwmError<I2C::Error>> {
        self.i2c
            .write(self.target.address, &burst)
            .map_err(PwmError::Transport)
    }
}
