use embedded_storage_async::nor_flash::NorFlash;
use shared::{Credential, CredentialList};

use super::{CredentialStore, StoreError};

/// Store plus the in-memory list decoded from it.
///
/// The list is only swapped after the store accepted the new value, so memory
/// and flash never disagree after a failed sync.
pub struct CredentialCache<S> {
    store: CredentialStore<S>,
    list: CredentialList,
}

impl<S> CredentialCache<S>
where
    S: NorFlash,
{
    /// Load the persisted list, falling back to an empty one.
    pub async fn boot(mut store: CredentialStore<S>) -> Self {
        let list = match store.load().await {
            Ok(list) => {
                log::info!("restored {} credentials from flash", list.len());
                list
            }
            Err(StoreError::NotFound) => {
                log::info!("no credential cache stored yet");
                CredentialList::new()
            }
            Err(err) => {
                log::warn!("failed to restore credential cache: {err}");
                CredentialList::new()
            }
        };

        Self { store, list }
    }

    pub fn credentials(&self) -> &CredentialList {
        &self.list
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.list.get(index)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Persist `list` and make it the live list; returns the new count.
    pub async fn replace(&mut self, list: CredentialList) -> Result<usize, StoreError<S::Error>> {
        self.store.save(&list).await?;
        self.list = list;
        Ok(self.list.len())
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore<S> {
        &mut self.store
    }
}
