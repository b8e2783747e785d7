/// MPU-6050 accelerometer on a Linux i2c-dev node
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use super::tilt::Accelerometer;
use crate::error::{CoreError, Result};

/// Bus address with AD0 pulled low
const ADDRESS: libc::c_ulong = 0x68;

/// From linux/i2c-dev.h
const I2C_SLAVE: libc::c_ulong = 0x0703;

const PWR_MGMT_1: u8 = 0x6B;
const ACCEL_XOUT_H: u8 = 0x3B;

pub struct Mpu6050 {
    bus: File,
    name: String,
}

impl Mpu6050 {
    /// Select the sensor on `path` and wake it from sleep
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let bus = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| CoreError::hardware(name.clone(), e))?;

        let ret = unsafe { libc::ioctl(bus.as_raw_fd(), I2C_SLAVE as _, ADDRESS) };
        if ret < 0 {
            return Err(CoreError::hardware(name, std::io::Error::last_os_error()));
        }

        let mut sensor = Self { bus, name };
        sensor.write(&[PWR_MGMT_1, 0])?;

        tracing::info!("accelerometer on {} at 0x{:02X}", sensor.name, ADDRESS);
        Ok(sensor)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.bus
            .write_all(bytes)
            .map_err(|e| CoreError::hardware(self.name.clone(), e))
    }
}

impl Accelerometer for Mpu6050 {
    fn read_raw(&mut self) -> Result<[i16; 3]> {
        self.write(&[ACCEL_XOUT_H])?;

        let mut buf = [0u8; 6];
        self.bus
            .read_exact(&mut buf)
            .map_err(|e| CoreError::hardware(self.name.clone(), e))?;

        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
    }
}
