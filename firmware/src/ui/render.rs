use alloc::{format, string::String, vec, vec::Vec};
use core::fmt;

use shared::CredentialList;

use super::navigation::Navigation;

/// Text shown on the status display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusFrame {
    /// Boot screen with the advertised device name.
    Banner(String),
    NotFound,
    Entry {
        index: usize,
        title: String,
        userid: String,
    },
    PassKey(u32),
    Updating,
    UpdateSucceeded(usize),
    UpdateFailed,
}

impl StatusFrame {
    /// Frame describing the current selection over `list`.
    pub fn for_selection(navigation: &Navigation, list: &CredentialList) -> Self {
        match navigation.selection().index().zip(navigation.current(list)) {
            Some((index, credential)) => StatusFrame::Entry {
                index,
                title: credential.title.clone(),
                userid: credential.userid.clone(),
            },
            None => StatusFrame::NotFound,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            StatusFrame::Banner(name) => vec![format!("[{name}]"), String::from("start BLE")],
            StatusFrame::NotFound => vec![String::from("not found")],
            StatusFrame::Entry {
                index,
                title,
                userid,
            } => vec![format!("({index}) {title}"), userid.clone()],
            StatusFrame::PassKey(key) => vec![String::from("PIN"), format!("{key:06}")],
            StatusFrame::Updating => vec![String::from("updating")],
            StatusFrame::UpdateSucceeded(count) => vec![
                String::from("updating"),
                format!("update succeeded ({count})"),
            ],
            StatusFrame::UpdateFailed => {
                vec![String::from("updating"), String::from("update failed")]
            }
        }
    }
}

/// Output side of the status display.
pub trait StatusDisplay {
    fn show(&mut self, frame: &StatusFrame);
}

impl fmt::Display for StatusFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in self.lines() {
            if !first {
                f.write_str("\n")?;
            }
            f.write_str(&line)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Credential;

    #[test]
    fn selection_frame_shows_index_title_and_user() {
        let list: CredentialList = vec![
            Credential::new("Mail", "bob", "Ab12!"),
            Credential::new("Bank", "alice", "pw"),
        ]
        .into();
        let mut navigation = Navigation::new(list.len());
        navigation.advance(list.len());

        let frame = StatusFrame::for_selection(&navigation, &list);

        assert_eq!(
            frame,
            StatusFrame::Entry {
                index: 1,
                title: "Bank".into(),
                userid: "alice".into(),
            }
        );
        assert_eq!(frame.to_string(), "(1) Bank\nalice");
    }

    #[test]
    fn empty_list_renders_not_found() {
        let list = CredentialList::new();
        let frame = StatusFrame::for_selection(&Navigation::new(0), &list);
        assert_eq!(frame.to_string(), "not found");
    }

    #[test]
    fn pass_key_is_zero_padded() {
        assert_eq!(StatusFrame::PassKey(42).to_string(), "PIN\n000042");
        assert_eq!(StatusFrame::PassKey(123_456).to_string(), "PIN\n123456");
    }

    #[test]
    fn frames_never_contain_the_password() {
        let list: CredentialList = vec![Credential::new("Mail", "bob", "hunter2")].into();
        let frame = StatusFrame::for_selection(&Navigation::new(1), &list);
        assert!(!frame.to_string().contains("hunter2"));
    }
}
