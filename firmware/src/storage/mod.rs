//! Flash-backed credential cache.
//!
//! The serialized credential list lives in a dedicated data partition managed
//! by `sequential-storage`. [`CredentialStore`] owns the on-flash layout and
//! [`CredentialCache`] pairs it with the in-memory list the UI reads from.

mod cache;
mod store;

pub use cache::CredentialCache;
pub use store::{CACHE_CAPACITY, CredentialStore};

use alloc::string::String;
#[cfg(target_arch = "xtensa")]
use core::ops::Range;
#[cfg(target_arch = "xtensa")]
use embedded_storage::nor_flash::NorFlash as BlockingNorFlash;
#[cfg(target_arch = "xtensa")]
use embedded_storage_async::nor_flash::{NorFlash as _, ReadNorFlash as _};
use sequential_storage::Error as FlashStorageError;

#[derive(Debug)]
pub enum StoreError<E> {
    /// Nothing has ever been persisted under the cache key.
    NotFound,
    /// A cache record exists but holds a zero-length blob.
    Empty,
    /// The persisted blob could not be reassembled or decoded.
    Corrupt(String),
    /// The serialized list does not fit the cache buffer.
    TooLarge { len: usize, capacity: usize },
    ReadFailed(FlashStorageError<E>),
    WriteFailed(FlashStorageError<E>),
}

impl<E: core::fmt::Debug> core::fmt::Display for StoreError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "no credential cache stored"),
            StoreError::Empty => write!(f, "credential cache is empty"),
            StoreError::Corrupt(err) => write!(f, "credential cache corrupt: {err}"),
            StoreError::TooLarge { len, capacity } => {
                write!(f, "credential cache too large ({len} > {capacity})")
            }
            StoreError::ReadFailed(err) => write!(f, "flash read failed: {err:?}"),
            StoreError::WriteFailed(err) => write!(f, "flash write failed: {err:?}"),
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for StoreError<E> {}

#[cfg(target_arch = "xtensa")]
pub struct BootFlash<'d> {
    storage: embassy_embedded_hal::adapter::BlockingAsync<esp_storage::FlashStorage<'d>>,
}

#[cfg(target_arch = "xtensa")]
impl<'d> BootFlash<'d> {
    pub fn new(storage: esp_storage::FlashStorage<'d>) -> Self {
        Self {
            storage: embassy_embedded_hal::adapter::BlockingAsync::new(storage),
        }
    }

    pub fn flash_capacity(&self) -> usize {
        embedded_storage_async::nor_flash::ReadNorFlash::capacity(&self.storage)
    }

    /// Locate the credential cache partition in the ESP-IDF partition table.
    ///
    /// A partition whose label matches one of [`crate::config::CACHE_PARTITION_LABELS`]
    /// wins; otherwise the first custom data partition is used.
    pub async fn credential_partition(&mut self) -> Option<Range<u32>> {
        use core::str;
        use embedded_storage_async::nor_flash::ReadNorFlash;

        const PARTITION_MAGIC: u16 = 0x50AA;
        const PARTITION_TABLE_OFFSET: u32 = 0x8000;
        const PARTITION_TABLE_SIZE: usize = 0x1000;
        const PARTITION_ENTRY_SIZE: usize = 32;
        const DATA_PARTITION_TYPE: u8 = 0x01;

        let mut table = [0u8; PARTITION_TABLE_SIZE];
        if ReadNorFlash::read(&mut self.storage, PARTITION_TABLE_OFFSET, &mut table)
            .await
            .is_err()
        {
            return None;
        }

        let mut custom: Option<Range<u32>> = None;

        for entry in table.chunks_exact(PARTITION_ENTRY_SIZE) {
            let magic = u16::from_le_bytes([entry[0], entry[1]]);
            if magic == 0xFFFF {
                break;
            }
            if magic != PARTITION_MAGIC || entry[2] != DATA_PARTITION_TYPE {
                continue;
            }

            let subtype = entry[3];
            let offset = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            let size = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
            let Some(end) = offset.checked_add(size).filter(|_| size > 0) else {
                continue;
            };

            let label_bytes = &entry[12..28];
            let label_end = label_bytes
                .iter()
                .position(|&byte| byte == 0)
                .unwrap_or(label_bytes.len());
            let Ok(label) = str::from_utf8(&label_bytes[..label_end]) else {
                continue;
            };

            if crate::config::CACHE_PARTITION_LABELS
                .iter()
                .any(|expected| label.eq_ignore_ascii_case(expected))
            {
                return Some(offset..end);
            }

            if subtype >= 0x40 && custom.is_none() {
                custom = Some(offset..end);
            }
        }

        custom
    }
}

#[cfg(target_arch = "xtensa")]
impl<'d> embedded_storage_async::nor_flash::ErrorType for BootFlash<'d> {
    type Error = esp_storage::FlashStorageError;
}

#[cfg(target_arch = "xtensa")]
impl<'d> embedded_storage_async::nor_flash::ReadNorFlash for BootFlash<'d> {
    const READ_SIZE: usize = esp_storage::FlashStorage::READ_SIZE as usize;

    fn capacity(&self) -> usize {
        self.flash_capacity()
    }

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.storage.read(offset, bytes).await
    }
}

#[cfg(target_arch = "xtensa")]
impl<'d> embedded_storage_async::nor_flash::NorFlash for BootFlash<'d> {
    const WRITE_SIZE: usize = <esp_storage::FlashStorage as BlockingNorFlash>::WRITE_SIZE as usize;
    const ERASE_SIZE: usize = <esp_storage::FlashStorage as BlockingNorFlash>::ERASE_SIZE as usize;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.storage.erase(from, to).await
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.storage.write(offset, bytes).await
    }
}
