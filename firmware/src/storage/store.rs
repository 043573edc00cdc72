use alloc::{format, string::ToString, vec, vec::Vec};
use core::ops::Range;

use embedded_storage_async::nor_flash::NorFlash;
use postcard::{from_bytes as postcard_from_bytes, to_allocvec as postcard_to_allocvec};
use sequential_storage::{cache::NoCache, map};
use serde::{Deserialize, Serialize};
use shared::CredentialList;
use shared::schema::{decode_envelope, encode_envelope};
use zeroize::Zeroizing;

use super::StoreError;

/// Upper bound for the serialized credential list.
pub const CACHE_CAPACITY: usize = 5120;

/// Flash items must fit a single erase page, so the blob is split up.
const CHUNK_SIZE: usize = 1024;
const MAX_CHUNKS: usize = CACHE_CAPACITY.div_ceil(CHUNK_SIZE);
const STORAGE_DATA_BUFFER_CAPACITY: usize = CHUNK_SIZE + 64;

const STORAGE_KEY_HEADER: u8 = 0x10;
const STORAGE_KEY_CHUNK_BASE: u8 = 0x20;
const SLOT_COUNT: u8 = 2;

const fn chunk_key(slot: u8, index: u8) -> u8 {
    STORAGE_KEY_CHUNK_BASE + slot * 0x10 + index
}

/// Commit record pointing at the slot holding the live blob.
///
/// Chunks are written into the idle slot first and the header last, so an
/// interrupted save leaves the previous header and blob in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CacheHeader {
    generation: u32,
    slot: u8,
    length: u16,
    chunks: u8,
}

impl CacheHeader {
    fn validate<E>(self) -> Result<Self, StoreError<E>> {
        let expected_chunks = (self.length as usize).div_ceil(CHUNK_SIZE);
        if self.slot >= SLOT_COUNT
            || self.length as usize > CACHE_CAPACITY
            || self.chunks as usize != expected_chunks
            || self.chunks as usize > MAX_CHUNKS
        {
            return Err(StoreError::Corrupt(format!(
                "invalid cache header {self:?}"
            )));
        }
        Ok(self)
    }
}

/// Persists the credential list as one logical record in a flash range.
pub struct CredentialStore<S> {
    flash: S,
    range: Range<u32>,
}

impl<S> CredentialStore<S>
where
    S: NorFlash,
{
    pub fn new(flash: S, range: Range<u32>) -> Self {
        Self { flash, range }
    }

    /// Read and decode the persisted credential list.
    pub async fn load(&mut self) -> Result<CredentialList, StoreError<S::Error>> {
        let blob = self.load_blob().await?;
        if blob.is_empty() {
            return Err(StoreError::Empty);
        }

        decode_envelope(&blob).map_err(|err| StoreError::Corrupt(err.to_string()))
    }

    /// Serialize `list` and commit it, returning the blob length.
    ///
    /// Oversized lists are rejected before anything is written.
    pub async fn save(&mut self, list: &CredentialList) -> Result<usize, StoreError<S::Error>> {
        let blob = Zeroizing::new(
            encode_envelope(list).map_err(|err| StoreError::Corrupt(err.to_string()))?,
        );
        if blob.len() > CACHE_CAPACITY {
            return Err(StoreError::TooLarge {
                len: blob.len(),
                capacity: CACHE_CAPACITY,
            });
        }

        self.save_blob(&blob).await?;
        Ok(blob.len())
    }

    /// Raw bytes of the committed blob.
    pub async fn load_blob(&mut self) -> Result<Zeroizing<Vec<u8>>, StoreError<S::Error>> {
        let mut cache = NoCache::new();
        let mut scratch = Zeroizing::new(vec![0u8; STORAGE_DATA_BUFFER_CAPACITY]);

        let header = self
            .fetch_header(&mut cache, scratch.as_mut_slice())
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut blob = Zeroizing::new(Vec::with_capacity(header.length as usize));
        for index in 0..header.chunks {
            let chunk = map::fetch_item::<u8, Vec<u8>, _>(
                &mut self.flash,
                self.range.clone(),
                &mut cache,
                scratch.as_mut_slice(),
                &chunk_key(header.slot, index),
            )
            .await
            .map_err(StoreError::ReadFailed)?
            .ok_or_else(|| {
                StoreError::Corrupt(format!("chunk {index} of slot {} missing", header.slot))
            })?;
            let chunk = Zeroizing::new(chunk);
            blob.extend_from_slice(&chunk);
        }

        if blob.len() != header.length as usize {
            return Err(StoreError::Corrupt(format!(
                "blob length {} does not match header length {}",
                blob.len(),
                header.length
            )));
        }

        Ok(blob)
    }

    pub(crate) async fn save_blob(&mut self, blob: &[u8]) -> Result<(), StoreError<S::Error>> {
        if blob.len() > CACHE_CAPACITY {
            return Err(StoreError::TooLarge {
                len: blob.len(),
                capacity: CACHE_CAPACITY,
            });
        }

        let mut cache = NoCache::new();
        let mut scratch = Zeroizing::new(vec![0u8; STORAGE_DATA_BUFFER_CAPACITY]);

        let current = match self.fetch_header(&mut cache, scratch.as_mut_slice()).await {
            Ok(header) => header,
            Err(StoreError::Corrupt(reason)) => {
                log::warn!("overwriting corrupt cache header: {reason}");
                None
            }
            Err(err) => return Err(err),
        };

        let slot = current.map_or(0, |header| (header.slot + 1) % SLOT_COUNT);
        let generation = current.map_or(1, |header| header.generation.wrapping_add(1));

        let mut chunks = 0u8;
        for (index, part) in blob.chunks(CHUNK_SIZE).enumerate() {
            let chunk = Zeroizing::new(part.to_vec());
            map::store_item(
                &mut self.flash,
                self.range.clone(),
                &mut cache,
                scratch.as_mut_slice(),
                &chunk_key(slot, index as u8),
                &*chunk,
            )
            .await
            .map_err(StoreError::WriteFailed)?;
            chunks += 1;
        }

        let header = CacheHeader {
            generation,
            slot,
            length: blob.len() as u16,
            chunks,
        };
        let encoded = postcard_to_allocvec(&header)
            .map_err(|err| StoreError::Corrupt(format!("failed to encode cache header: {err}")))?;

        map::store_item(
            &mut self.flash,
            self.range.clone(),
            &mut cache,
            scratch.as_mut_slice(),
            &STORAGE_KEY_HEADER,
            &encoded,
        )
        .await
        .map_err(StoreError::WriteFailed)?;

        log::debug!(
            "committed credential cache generation {generation} ({} bytes, slot {slot})",
            blob.len()
        );
        Ok(())
    }

    async fn fetch_header(
        &mut self,
        cache: &mut NoCache,
        scratch: &mut [u8],
    ) -> Result<Option<CacheHeader>, StoreError<S::Error>> {
        let Some(bytes) = map::fetch_item::<u8, Vec<u8>, _>(
            &mut self.flash,
            self.range.clone(),
            cache,
            scratch,
            &STORAGE_KEY_HEADER,
        )
        .await
        .map_err(StoreError::ReadFailed)?
        else {
            return Ok(None);
        };

        let header: CacheHeader = postcard_from_bytes(&bytes).map_err(|err| {
            StoreError::Corrupt(format!("failed to decode cache header: {err}"))
        })?;
        header.validate().map(Some)
    }

    #[cfg(test)]
    pub(crate) fn flash_mut(&mut self) -> &mut S {
        &mut self.flash
    }

    /// Replace the header record with raw bytes, bypassing validation.
    #[cfg(test)]
    pub(crate) async fn overwrite_header(&mut self, bytes: &[u8]) -> Result<(), StoreError<S::Error>> {
        let mut cache = NoCache::new();
        let mut scratch = vec![0u8; STORAGE_DATA_BUFFER_CAPACITY];
        map::store_item(
            &mut self.flash,
            self.range.clone(),
            &mut cache,
            scratch.as_mut_slice(),
            &STORAGE_KEY_HEADER,
            &bytes.to_vec(),
        )
        .await
        .map_err(StoreError::WriteFailed)
    }
}

/// Encoded header record as `save` would write it.
#[cfg(test)]
pub(crate) fn encoded_header(slot: u8, length: u16, chunks: u8) -> Vec<u8> {
    let header = CacheHeader {
        generation: 7,
        slot,
        length,
        chunks,
    };
    postcard_to_allocvec(&header).unwrap_or_default()
}
