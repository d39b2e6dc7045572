//! Raw register transport for the SoC.
//!
//! The C0-microSD exposes its registers and buffers at fixed offsets of the
//! block device it presents to the host. [`FileTransport`] performs
//! positioned reads and writes on that device node.

use crate::device::types::{DeviceCommand, DeviceMode, DeviceStatus};
use crate::device::DeviceError;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Register boundary the [`DeviceSession`](crate::device::DeviceSession) drives.
///
/// Implementations perform single register accesses only; sequencing,
/// polling and state checks belong to the session.
pub trait SocTransport {
    /// Read the status register.
    fn read_status(&mut self) -> Result<DeviceStatus, DeviceError>;

    /// Read the operating mode from the configuration string.
    fn configuration(&mut self) -> Result<DeviceMode, DeviceError>;

    /// Size of the MOSI (host to device) buffer in bytes.
    fn mosi_buffer_size(&self) -> usize;

    /// Size of the MISO (device to host) buffer in bytes.
    fn miso_buffer_size(&self) -> usize;

    fn write_mosi_buffer(&mut self, buffer: &[u8]) -> Result<(), DeviceError>;

    fn write_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError>;

    fn read_miso_buffer(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Release the underlying connection.
    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Byte offsets of the SoC registers and buffers on the device node.
///
/// The defaults are placeholders, not the vendor register map; set the
/// offsets for the actual device in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLayout {
    /// Configuration string (NUL padded ASCII)
    pub configuration_offset: u64,
    pub configuration_len: usize,
    /// Status register (u32, little-endian)
    pub status_offset: u64,
    /// Command register (u32, little-endian)
    pub command_offset: u64,
    pub mosi_offset: u64,
    pub mosi_size: usize,
    pub miso_offset: u64,
    pub miso_size: usize,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            configuration_offset: 0x0000,
            configuration_len: 16,
            status_offset: 0x0200,
            command_offset: 0x0400,
            mosi_offset: 0x1000,
            mosi_size: 4096,
            miso_offset: 0x2000,
            miso_size: 4096,
        }
    }
}

/// Transport over the device node (or a disk image standing in for it).
pub struct FileTransport {
    path: PathBuf,
    file: Option<File>,
    layout: DeviceLayout,
}

impl FileTransport {
    /// Open the device node for reading and writing.
    pub fn open(path: impl AsRef<Path>, layout: DeviceLayout) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.read(true).write(true);

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_SYNC);
        }

        let file = options.open(&path)?;
        debug!(path = %path.display(), "opened device node");

        Ok(Self {
            path,
            file: Some(file),
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File, DeviceError> {
        self.file.as_mut().ok_or(DeviceError::Closed)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, DeviceError> {
        let file = self.file()?;
        drop_cached_range(file, offset, len);
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.sync_data()?;
        Ok(())
    }

    fn read_u32(&mut self, offset: u64) -> Result<u32, DeviceError> {
        let bytes = self.read_at(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl SocTransport for FileTransport {
    fn read_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let code = self.read_u32(self.layout.status_offset)?;
        DeviceStatus::try_from(code).map_err(DeviceError::UnknownStatus)
    }

    fn configuration(&mut self) -> Result<DeviceMode, DeviceError> {
        let raw = self.read_at(
            self.layout.configuration_offset,
            self.layout.configuration_len,
        )?;
        Ok(DeviceMode::parse(&String::from_utf8_lossy(&raw)))
    }

    fn mosi_buffer_size(&self) -> usize {
        self.layout.mosi_size
    }

    fn miso_buffer_size(&self) -> usize {
        self.layout.miso_size
    }

    fn write_mosi_buffer(&mut self, buffer: &[u8]) -> Result<(), DeviceError> {
        if buffer.len() != self.layout.mosi_size {
            return Err(DeviceError::PayloadSize {
                expected: self.layout.mosi_size,
                actual: buffer.len(),
            });
        }
        self.write_at(self.layout.mosi_offset, buffer)
    }

    fn write_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        self.write_at(self.layout.command_offset, &command.code().to_le_bytes())
    }

    fn read_miso_buffer(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.read_at(self.layout.miso_offset, self.layout.miso_size)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            debug!(path = %self.path.display(), "closed device node");
        }
        Ok(())
    }
}

/// Ask the kernel to forget cached pages so register reads hit the device.
#[cfg(target_os = "linux")]
fn drop_cached_range(file: &File, offset: u64, len: usize) {
    use std::os::unix::io::AsRawFd;
    // Advisory only; a failure just means the read may be served from cache.
    unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            offset as libc::off_t,
            len as libc::off_t,
            libc::POSIX_FADV_DONTNEED,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn drop_cached_range(_file: &File, _offset: u64, _len: usize) {}
