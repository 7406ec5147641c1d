///The PCA9685 is an i2c device from NXP with 16 pwm output channels with 12 bit resolution.
#[cfg(feature = "pca9685")]
pub mod pca9685;

///Many PCA9685 chips, on one or more i2c buses, driven as a single flat range of channels.
#[cfg(feature = "pca9685")]
pub mod multi_pca9685;
