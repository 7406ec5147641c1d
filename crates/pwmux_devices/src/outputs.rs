//!Named float outputs on top of a shared `MultiPca9685`.
//!
//! Each name maps to a global channel index. Values written to an output are clamped to `[0.0, 1.0]` and turned
//! into an off time of `value * 4095` ticks with an on time of 0.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use embedded_hal::i2c::I2c;
use futures::future::join_all;
use pwmux_core::Output;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::devices::multi_pca9685::{Dispatch, MultiPca9685};

pub struct ChannelOutputs {
    pub join_handle: JoinHandle<()>,
    pub outputs: HashMap<String, Output<f64>>,
}

fn off_time(value: f64) -> u16 {
    (value.min(1.0).max(0.0) * 4095.0) as u16
}

fn spawn_channel_task<I2C>(
    mux: Arc<Mutex<MultiPca9685<I2C>>>,
    index: usize,
    mut rx: mpsc::Receiver<f64>,
    cancel_token: CancellationToken,
) -> JoinHandle<()>
where
    I2C: I2c + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let new_value = tokio::select! {
                _ = cancel_token.cancelled() => break,
                received = rx.recv() => match received {
                    Some(new_value) => new_value,
                    None => break,
                },
            };
            let mut mux = match mux.lock() {
                Ok(mux) => mux,
                Err(poisoned) => poisoned.into_inner(),
            };
            match mux.set_channel_off_time(index, off_time(new_value)) {
                Ok(Dispatch::Written) => {}
                Ok(Dispatch::Dropped) => warn!("channel {} has no configured driver, value dropped", index),
                Err(err) => error!("error setting pwm channel {}! {:?}", index, err),
            }
        }
        debug!("output task for channel {} shutting down.", index)
    })
}

impl ChannelOutputs {
    ///Spawns one task per named channel. Every task stops when its `Output` is dropped or `cancel_token` fires.
    pub fn spawn<I2C>(
        mux: Arc<Mutex<MultiPca9685<I2C>>>,
        channels: &HashMap<String, usize>,
        cancel_token: CancellationToken,
    ) -> ChannelOutputs
    where
        I2C: I2c + Send + 'static,
    {
        {
            let mux = match mux.lock() {
                Ok(mux) => mux,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (name, index) in channels {
                if mux.locate(*index).is_none() {
                    warn!("output {} uses channel {} but only {} channels exist", name, index, mux.num_channels());
                }
            }
        }

        let mut outputs = HashMap::with_capacity(channels.len());
        let mut join_handles = Vec::with_capacity(channels.len());
        for (name, index) in channels {
            let (output, rx) = Output::new();
            join_handles.push(spawn_channel_task(mux.clone(), *index, rx, cancel_token.clone()));
            outputs.insert(name.to_string(), output);
        }

        let join_handle = tokio::spawn(async move {
            join_all(join_handles).await;
            debug!("channel output tasks all done!")
        });

        ChannelOutputs { join_handle, outputs }
    }
}
