//! Selected credential over the cached list.

use shared::{Credential, CredentialList};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    /// Nothing selectable: the list was empty at the last (re)selection.
    #[default]
    None,
    Index(usize),
}

impl Selection {
    pub fn for_len(len: usize) -> Self {
        if len > 0 {
            Selection::Index(0)
        } else {
            Selection::None
        }
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Selection::None => None,
            Selection::Index(index) => Some(index),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    selection: Selection,
}

impl Navigation {
    /// Navigation over a freshly loaded list of `len` credentials.
    pub fn new(len: usize) -> Self {
        Self {
            selection: Selection::for_len(len),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Move to the next credential, wrapping after the last one.
    pub fn advance(&mut self, len: usize) -> Selection {
        if let Selection::Index(index) = self.selection {
            self.selection = if len == 0 {
                Selection::None
            } else {
                Selection::Index((index + 1) % len)
            };
        }
        self.selection
    }

    pub fn reset_after_sync(&mut self, len: usize) {
        self.selection = Selection::for_len(len);
    }

    pub fn current<'a>(&self, list: &'a CredentialList) -> Option<&'a Credential> {
        self.selection.index().and_then(|index| list.get(index))
    }
}
