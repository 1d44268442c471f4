use core::fmt::Write;

use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use log::debug;

use super::{FileMedium, StoreError};

type SdError = embedded_sdmmc::Error<SdCardError>;

/// [`FileMedium`] on the first FAT volume of an SD card, root directory only.
///
/// These operations are blocking (as is everything else sharing the SPI bus).
/// Every call opens the volume, directory and file it needs and closes them
/// again before returning, so no handle is held between cycles and pulling
/// the card only fails the operations in flight.
pub struct SdCardMedium<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardMedium<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }
}

/// A device error means the card is gone or not answering.
fn to_store_error(e: SdError) -> StoreError {
    match e {
        embedded_sdmmc::Error::DeviceError(e) => {
            debug!("SD card device error: {:?}", e);
            StoreError::Unavailable
        }
        other => StoreError::io(other),
    }
}

impl<S, D, T> FileMedium for SdCardMedium<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn size(&mut self, name: &str) -> Result<Option<u32>, StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;

        let size = match root_dir.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => {
                let length = file.length();
                file.close().map_err(to_store_error)?;
                Some(length)
            }
            Err(embedded_sdmmc::Error::NotFound) => None,
            Err(e) => return Err(to_store_error(e)),
        };

        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(size)
    }

    fn read_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;

        let file = match root_dir.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(0),
            Err(e) => return Err(to_store_error(e)),
        };

        let mut count = 0;
        if offset < file.length() {
            file.seek_from_start(offset).map_err(to_store_error)?;

            while count < buf.len() {
                let bytes_read = file.read(&mut buf[count..]).map_err(to_store_error)?;
                if bytes_read == 0 {
                    break; // EOF
                }
                count += bytes_read;
            }
        }

        file.close().map_err(to_store_error)?;
        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(count)
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;
        let file = root_dir
            .open_file_in_dir(name, Mode::ReadWriteCreateOrAppend)
            .map_err(to_store_error)?;

        file.write(bytes).map_err(to_store_error)?;

        file.close().map_err(to_store_error)?;
        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(())
    }

    fn replace(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;
        let file = root_dir
            .open_file_in_dir(name, Mode::ReadWriteCreateOrTruncate)
            .map_err(to_store_error)?;

        file.write(bytes).map_err(to_store_error)?;

        file.close().map_err(to_store_error)?;
        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;

        match root_dir.delete_file_in_dir(name) {
            Ok(()) | Err(embedded_sdmmc::Error::NotFound) => {}
            Err(e) => return Err(to_store_error(e)),
        }

        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(())
    }

    fn for_each_name(&mut self, f: &mut dyn FnMut(&str)) -> Result<(), StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(to_store_error)?;
        let root_dir = volume0.open_root_dir().map_err(to_store_error)?;

        root_dir
            .iterate_dir(|entry| {
                if entry.attributes.is_directory() || entry.attributes.is_volume() {
                    return;
                }
                // 8.3 names are at most 12 characters.
                let mut name = heapless::String::<16>::new();
                if write!(name, "{}", entry.name).is_ok() {
                    f(name.as_str());
                }
            })
            .map_err(to_store_error)?;

        root_dir.close().map_err(to_store_error)?;
        volume0.close().map_err(to_store_error)?;

        Ok(())
    }
}
