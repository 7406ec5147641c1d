use std::time::Duration;

use embedded_hal::i2c::I2c;
use pwmux_core::error::PwmuxBuildError;
use pwmux_devices::devices::multi_pca9685::{Dispatch, MultiPca9685};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, trace, warn};

///One entry of the configured command sequence. Steps run in order, once.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum StepConfig {
    //write on/off counts to a global channel
    Set {
        channel: usize,
        #[serde(default)]
        on: u16,
        off: u16,
    },
    Wait {
        ms: u64,
    },
    ToggleDebug,
    ShowConfiguration,
}

pub async fn run<I2C: I2c>(steps: &[StepConfig], mux: &mut MultiPca9685<I2C>) -> Result<(), PwmuxBuildError> {
    for step in steps {
        trace!("step {:?}", step);
        match step {
            StepConfig::Set { channel, on, off } => {
                if mux.set_channel(*channel, *on, *off)? == Dispatch::Dropped {
                    warn!("channel {} is not backed by a driver, nothing was written", channel);
                }
            }
            StepConfig::Wait { ms } => sleep(Duration::from_millis(*ms)).await,
            StepConfig::ToggleDebug => {
                mux.toggle_debug();
            }
            StepConfig::ShowConfiguration => info!("{}", mux.configuration()),
        }
    }
    Ok(())
}
