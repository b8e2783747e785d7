use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Open a serial port raw at 9600 baud 8N1.
///
/// Reads return `Ok(0)` after `timeout_ds` tenths of a second without data.
pub fn open_9600_8n1(path: &Path, timeout_ds: u8) -> Result<File> {
    let device = path.display().to_string();
    let fail = |e: io::Error| CoreError::hardware(device.clone(), e);

    let port = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(fail)?;
    let fd = port.as_raw_fd();

    let mut tty: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tty) } != 0 {
        return Err(fail(io::Error::last_os_error()));
    }

    unsafe { libc::cfmakeraw(&mut tty) };
    if unsafe { libc::cfsetspeed(&mut tty, libc::B9600) } != 0 {
        return Err(fail(io::Error::last_os_error()));
    }

    tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
    tty.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
    tty.c_cc[libc::VMIN] = 0;
    tty.c_cc[libc::VTIME] = timeout_ds;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } != 0 {
        return Err(fail(io::Error::last_os_error()));
    }
    // Drop whatever the reader sent before we were listening
    if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } != 0 {
        return Err(fail(io::Error::last_os_error()));
    }

    tracing::debug!("opened {} at 9600 8N1", device);
    Ok(port)
}
