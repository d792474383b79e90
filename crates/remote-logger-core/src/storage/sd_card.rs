use alloc::string::String;
use alloc::vec::Vec;

use embedded_sdmmc::{
    BlockDevice, Error, Mode, RawDirectory, RawFile, RawVolume, TimeSource, VolumeIdx,
    VolumeManager,
};
use log::{debug, error};

use super::{LINE_ENDING, Storage, StorageError};

/// Read chunk size for [`Storage::read_to_string`].
const READ_CHUNK: usize = 64;

/// Open file plus the volume and directory it lives in, closed together.
pub struct SdHandle {
    volume: RawVolume,
    dir: RawDirectory,
    file: RawFile,
}

/// FAT-formatted SD card backend.
///
/// Every operation opens the volume and root directory, does its work and
/// closes them again, so the card is reopened for each line. This keeps
/// the card consistent if power drops between wakes. Operations are blocking; nothing else runs while they do.
pub struct SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, 4, 4, 1>,
}

impl<D, T> SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    /// Create a new SD card storage backend over any block device
    pub fn new(block_device: D, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(block_device, ts);

        Self { volume_mgr }
    }

    fn open_root(&self) -> Result<(RawVolume, RawDirectory), StorageError> {
        let volume = self
            .volume_mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(|e| {
                error!("Failed to open SD volume: {:?}", e);
                StorageError::Unavailable
            })?;

        match self.volume_mgr.open_root_dir(volume) {
            Ok(dir) => Ok((volume, dir)),
            Err(e) => {
                error!("Failed to open SD root directory: {:?}", e);
                let _ = self.volume_mgr.close_volume(volume);
                Err(StorageError::Unavailable)
            }
        }
    }

    fn close_root(&self, volume: RawVolume, dir: RawDirectory) {
        if let Err(e) = self.volume_mgr.close_dir(dir) {
            debug!("Closing SD root directory failed: {:?}", e);
        }
        if let Err(e) = self.volume_mgr.close_volume(volume) {
            debug!("Closing SD volume failed: {:?}", e);
        }
    }

    fn read_file(&self, file: RawFile) -> Result<String, StorageError> {
        let mut bytes = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = self.volume_mgr.read(file, &mut chunk).map_err(map_error)?;
            if n == 0 {
                break; // EOF
            }
            bytes.extend_from_slice(&chunk[..n]);
        }

        String::from_utf8(bytes).map_err(|_| StorageError::Io)
    }
}

/// FAT short names have no directory prefix in the root.
fn short_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

fn map_error<E: core::fmt::Debug>(e: Error<E>) -> StorageError {
    match e {
        Error::NotFound => StorageError::NotFound,
        other => {
            error!("SD card error: {:?}", other);
            StorageError::Io
        }
    }
}

impl<D, T> Storage for SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Handle = SdHandle;

    fn len(&mut self, name: &str) -> Result<u64, StorageError> {
        let (volume, dir) = self.open_root()?;
        let result = self
            .volume_mgr
            .find_directory_entry(dir, short_name(name))
            .map(|entry| u64::from(entry.size))
            .map_err(map_error);
        self.close_root(volume, dir);
        result
    }

    fn open_append(&mut self, name: &str) -> Result<Self::Handle, StorageError> {
        let (volume, dir) = self.open_root()?;

        match self
            .volume_mgr
            .open_file_in_dir(dir, short_name(name), Mode::ReadWriteCreateOrAppend)
        {
            Ok(file) => Ok(SdHandle { volume, dir, file }),
            Err(e) => {
                error!("Failed to open {} for append: {:?}", name, e);
                self.close_root(volume, dir);
                Err(StorageError::Unavailable)
            }
        }
    }

    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<(), StorageError> {
        self.volume_mgr
            .write(handle.file, text.as_bytes())
            .map_err(map_error)?;
        self.volume_mgr
            .write(handle.file, LINE_ENDING.as_bytes())
            .map_err(map_error)
    }

    fn close(&mut self, handle: Self::Handle) {
        // Closing the file flushes its directory entry (size, mtime).
        if let Err(e) = self.volume_mgr.close_file(handle.file) {
            error!("Failed to close SD file: {:?}", e);
        }
        self.close_root(handle.volume, handle.dir);
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let (volume, dir) = self.open_root()?;
        let result = match self.volume_mgr.delete_file_in_dir(dir, short_name(name)) {
            Ok(()) | Err(Error::NotFound) => Ok(()),
            Err(e) => Err(map_error(e)),
        };
        self.close_root(volume, dir);
        result
    }

    fn read_to_string(&mut self, name: &str) -> Result<String, StorageError> {
        let (volume, dir) = self.open_root()?;

        let result = match self
            .volume_mgr
            .open_file_in_dir(dir, short_name(name), Mode::ReadOnly)
        {
            Ok(file) => {
                let contents = self.read_file(file);
                if let Err(e) = self.volume_mgr.close_file(file) {
                    debug!("Closing {} after read failed: {:?}", name, e);
                }
                contents
            }
            Err(e) => Err(map_error(e)),
        };

        self.close_root(volume, dir);
        result
    }
}
