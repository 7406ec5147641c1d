pub mod sequence;

use pwmux_core::{error::PwmuxBuildError, BusAddress};
use pwmux_devices::devices::{
    multi_pca9685::{MultiPca9685, OutOfRangePolicy, DEFAULT_FREQUENCY_HZ},
    pca9685::{FULL, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ, OUTPUTS_PER_DRIVER},
};
use embedded_hal::i2c::I2c;
use pwmux_rpi_gpio::open_bus;
use sequence::StepConfig;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Deserialize, Debug, Default)]
pub struct PwmuxMetadataConfig {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn default_frequency() -> u16 {
    DEFAULT_FREQUENCY_HZ
}

#[derive(Deserialize, Debug)]
pub struct PwmuxConfig {
    #[serde(default)]
    pub metadata: PwmuxMetadataConfig,
    //order matters: driver n owns channels 16n to 16n+15
    pub drivers: Vec<BusAddress>,
    #[serde(default = "default_frequency")]
    pub frequency: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
    #[serde(default)]
    pub all_off_on_exit: bool,
    #[serde(default)]
    pub sequence: Vec<StepConfig>,
}

impl PwmuxConfig {
    ///Global channels backed by the configured drivers: `0..num_channels()`.
    pub fn num_channels(&self) -> usize {
        self.drivers.len() * OUTPUTS_PER_DRIVER as usize
    }

    ///`(first, last, target)` global channel block of each driver, in index order.
    pub fn channel_blocks(&self) -> impl Iterator<Item = (usize, usize, BusAddress)> + '_ {
        let per_driver = OUTPUTS_PER_DRIVER as usize;
        self.drivers
            .iter()
            .enumerate()
            .map(move |(i, target)| (i * per_driver, i * per_driver + per_driver - 1, *target))
    }

    ///Collects every problem with the configuration instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), PwmuxBuildError> {
        let mut errors = Vec::new();

        if self.drivers.is_empty() {
            errors.push(PwmuxBuildError::from_string("at least one driver is required".to_string()));
        }
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency) {
            errors.push(PwmuxBuildError::from_string(format!(
                "frequency {} Hz is outside {}..={} Hz",
                self.frequency, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ
            )));
        }

        let num_channels = self.num_channels();
        for (i, step) in self.sequence.iter().enumerate() {
            if let StepConfig::Set { channel, on, off } = step {
                if *on > FULL || *off > FULL {
                    errors.push(PwmuxBuildError::from_string(format!(
                        "step {}: on and off must be at most {}",
                        i + 1,
                        FULL
                    )));
                }
                if *channel >= num_channels {
                    match self.out_of_range {
                        OutOfRangePolicy::Reject => errors.push(PwmuxBuildError::from_string(format!(
                            "step {}: channel {} is out of range, only {} channels are configured",
                            i + 1,
                            channel,
                            num_channels
                        ))),
                        OutOfRangePolicy::Ignore => {
                            warn!("step {}: channel {} is out of range and will be ignored", i + 1, channel)
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PwmuxBuildError::from_errs(errors))
        }
    }

    pub async fn start(self) -> Result<(), PwmuxBuildError> {
        self.validate()?;

        debug!("opening {} PCA9685 drivers ...", self.drivers.len());
        let mut mux = MultiPca9685::new(&self.drivers, self.frequency, open_bus)?;
        mux.set_policy(self.out_of_range);
        info!("{}", mux.configuration());
        if self.debug {
            mux.toggle_debug();
        }

        debug!("running {} steps ...", self.sequence.len());
        let res = tokio::select! {
            res = sequence::run(&self.sequence, &mut mux) => res,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping sequence");
                Ok(())
            }
        };

        shut_down(&mut mux, self.all_off_on_exit, res)
    }
}

///Optionally turns every output off. A failure here is logged and never hides the result of the sequence.
fn shut_down<I2C: I2c>(
    mux: &mut MultiPca9685<I2C>,
    all_off: bool,
    res: Result<(), PwmuxBuildError>,
) -> Result<(), PwmuxBuildError> {
    if all_off {
        debug!("turning all outputs off");
        if let Err(err) = mux.set_all(0, FULL) {
            error!("could not turn all outputs off: {}", err);
            return res.and(Err(err.into()));
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_rs::{Config, File, FileFormat};
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    fn parse(yaml: &str) -> PwmuxConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|config| config.try_deserialize::<PwmuxConfig>())
            .unwrap()
    }

    const SIX_DRIVERS: &str = r#"
metadata:
  name: arm
drivers:
  - { bus: 1, address: 0x40 }
  - { bus: 3, address: 0x41 }
  - { bus: 1, address: 0x42 }
  - { bus: 1, address: 0x48 }
  - { bus: 4, address: 0x55 }
  - { bus: 4, address: 0x80 }
sequence:
  - Set: { channel: 17, off: 110 }
  - Wait: { ms: 1000 }
  - ToggleDebug
  - Set: { channel: 17, on: 10, off: 550 }
"#;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let cfg = parse(SIX_DRIVERS);

        assert_eq!(cfg.metadata.name.as_deref(), Some("arm"));
        assert_eq!(cfg.drivers.len(), 6);
        assert_eq!(cfg.drivers[1], BusAddress::new(3, 0x41));
        assert_eq!(cfg.frequency, 50);
        assert!(!cfg.debug);
        assert!(!cfg.all_off_on_exit);
        assert_eq!(cfg.out_of_range, OutOfRangePolicy::Ignore);
        assert_eq!(
            cfg.sequence,
            vec![
                StepConfig::Set { channel: 17, on: 0, off: 110 },
                StepConfig::Wait { ms: 1000 },
                StepConfig::ToggleDebug,
                StepConfig::Set { channel: 17, on: 10, off: 550 },
            ]
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn channel_blocks_follow_driver_order() {
        let cfg = parse(SIX_DRIVERS);

        assert_eq!(cfg.num_channels(), 96);
        let blocks: Vec<_> = cfg.channel_blocks().collect();
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0], (0, 15, BusAddress::new(1, 0x40)));
        assert_eq!(blocks[1], (16, 31, BusAddress::new(3, 0x41)));
        assert_eq!(blocks[5], (80, 95, BusAddress::new(4, 0x80)));
    }

    #[test]
    fn validate_reports_every_problem() {
        let cfg = parse(
            r#"
drivers: []
frequency: 2000
out_of_range: Reject
sequence:
  - Set: { channel: 3, off: 5000 }
"#,
        );

        match cfg.validate() {
            Err(PwmuxBuildError::Messages(messages)) => {
                assert_eq!(messages.len(), 4);
                assert_eq!(messages[0], "at least one driver is required");
                assert_eq!(messages[1], "frequency 2000 Hz is outside 24..=1526 Hz");
                assert_eq!(messages[2], "step 1: on and off must be at most 4096");
                assert_eq!(
                    messages[3],
                    "step 1: channel 3 is out of range, only 0 channels are configured"
                );
            }
            other => panic!("expected multiple messages, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_steps_pass_when_ignored() {
        let cfg = parse(
            r#"
drivers:
  - { bus: 1, address: 0x40 }
frequency: 60
sequence:
  - Set: { channel: 95, off: 550 }
"#,
        );
        assert_eq!(cfg.frequency, 60);
        assert!(cfg.validate().is_ok());
    }

    fn one_driver(after_setup: Vec<I2cTransaction>) -> (MultiPca9685<I2cMock>, I2cMock) {
        let mut expected = vec![
            I2cTransaction::write(0x40, vec![0x00, 0x20]),
            I2cTransaction::write(0x40, vec![0x00, 0x10]),
            I2cTransaction::write(0x40, vec![0xFE, 121]),
            I2cTransaction::write(0x40, vec![0x00, 0xA0]),
        ];
        expected.extend(after_setup);
        let i2c = I2cMock::new(&expected);
        let handle = i2c.clone();
        let mut bus = Some(i2c);

        let mux = MultiPca9685::with_default_frequency(&[BusAddress::new(1, 0x40)], |_| bus.take().ok_or("taken")).unwrap();
        (mux, handle)
    }

    #[test]
    fn shut_down_turns_everything_off() {
        let (mut mux, mut handle) = one_driver(vec![I2cTransaction::write(0x40, vec![0xFA, 0x00, 0x00, 0x00, 0x10])]);

        assert!(shut_down(&mut mux, true, Ok(())).is_ok());

        drop(mux);
        handle.done();
    }

    #[test]
    fn failed_shut_down_keeps_the_sequence_error() {
        let (mut mux, mut handle) = one_driver(vec![
            I2cTransaction::write(0x40, vec![0xFA, 0x00, 0x00, 0x00, 0x10]).with_error(ErrorKind::Other)
        ]);
        let res = Err(PwmuxBuildError::from_string("step 3 failed".to_string()));

        let err = shut_down(&mut mux, true, res).unwrap_err();
        assert_eq!(err.to_string(), "step 3 failed");

        drop(mux);
        handle.done();
    }

    #[test]
    fn failed_shut_down_is_reported_after_a_clean_sequence() {
        let (mut mux, mut handle) = one_driver(vec![
            I2cTransaction::write(0x40, vec![0xFA, 0x00, 0x00, 0x00, 0x10]).with_error(ErrorKind::Other)
        ]);

        let err = shut_down(&mut mux, true, Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "i2c transport error: Other");

        drop(mux);
        handle.done();
    }

    #[test]
    fn shut_down_without_all_off_writes_nothing() {
        let (mut mux, mut handle) = one_driver(vec![]);

        assert!(shut_down(&mut mux, false, Ok(())).is_ok());

        drop(mux);
        handle.done();
    }
}
