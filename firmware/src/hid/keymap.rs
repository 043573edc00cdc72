//! US-layout character to HID usage table.
//!
//! The table is total over printable ASCII plus newline and tab. Anything
//! else has no entry and the emulator refuses to type it.

/// Left shift bit in the modifier byte.
pub const MODIFIER_LEFT_SHIFT: u8 = 0x02;

const USAGE_A: u8 = 0x04;
const USAGE_1: u8 = 0x1E;
const USAGE_0: u8 = 0x27;
const USAGE_ENTER: u8 = 0x28;
const USAGE_TAB: u8 = 0x2B;
const USAGE_SPACE: u8 = 0x2C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub modifiers: u8,
    pub usage: u8,
}

impl KeyStroke {
    const fn plain(usage: u8) -> Self {
        Self {
            modifiers: 0,
            usage,
        }
    }

    const fn shifted(usage: u8) -> Self {
        Self {
            modifiers: MODIFIER_LEFT_SHIFT,
            usage,
        }
    }
}

/// Punctuation keys: (unshifted char, shifted char, usage).
const SYMBOL_KEYS: [(u8, u8, u8); 11] = [
    (b'-', b'_', 0x2D),
    (b'=', b'+', 0x2E),
    (b'[', b'{', 0x2F),
    (b']', b'}', 0x30),
    (b'\\', b'|', 0x31),
    (b';', b':', 0x33),
    (b'\'', b'"', 0x34),
    (b'`', b'~', 0x35),
    (b',', b'<', 0x36),
    (b'.', b'>', 0x37),
    (b'/', b'?', 0x38),
];

/// Shifted digit row, starting at `1`.
const DIGIT_SYMBOLS: [u8; 10] = [b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')'];

static ASCII_KEYMAP: [Option<KeyStroke>; 128] = build_ascii_keymap();

const fn build_ascii_keymap() -> [Option<KeyStroke>; 128] {
    let mut map = [None; 128];

    let mut offset = 0;
    while offset < 26 {
        map[(b'a' + offset) as usize] = Some(KeyStroke::plain(USAGE_A + offset));
        map[(b'A' + offset) as usize] = Some(KeyStroke::shifted(USAGE_A + offset));
        offset += 1;
    }

    let mut digit = 0;
    while digit < 9 {
        map[(b'1' + digit) as usize] = Some(KeyStroke::plain(USAGE_1 + digit));
        digit += 1;
    }
    map[b'0' as usize] = Some(KeyStroke::plain(USAGE_0));

    let mut index = 0;
    while index < DIGIT_SYMBOLS.len() {
        let usage = if index == 9 { USAGE_0 } else { USAGE_1 + index as u8 };
        map[DIGIT_SYMBOLS[index] as usize] = Some(KeyStroke::shifted(usage));
        index += 1;
    }

    let mut index = 0;
    while index < SYMBOL_KEYS.len() {
        let (plain, shifted, usage) = SYMBOL_KEYS[index];
        map[plain as usize] = Some(KeyStroke::plain(usage));
        map[shifted as usize] = Some(KeyStroke::shifted(usage));
        index += 1;
    }

    map[b' ' as usize] = Some(KeyStroke::plain(USAGE_SPACE));
    map[b'\n' as usize] = Some(KeyStroke::plain(USAGE_ENTER));
    map[b'\t' as usize] = Some(KeyStroke::plain(USAGE_TAB));

    map
}

pub fn lookup(ch: char) -> Option<KeyStroke> {
    if ch.is_ascii() {
        ASCII_KEYMAP[ch as usize]
    } else {
        None
    }
}

/// First character of `text` without a key, with its char index.
pub fn first_unmapped(text: &str) -> Option<(usize, char)> {
    text.chars()
        .enumerate()
        .find(|(_, ch)| lookup(*ch).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits_follow_usage_order() {
        assert_eq!(lookup('a'), Some(KeyStroke::plain(0x04)));
        assert_eq!(lookup('z'), Some(KeyStroke::plain(0x1D)));
        assert_eq!(lookup('A'), Some(KeyStroke::shifted(0x04)));
        assert_eq!(lookup('1'), Some(KeyStroke::plain(0x1E)));
        assert_eq!(lookup('9'), Some(KeyStroke::plain(0x26)));
        assert_eq!(lookup('0'), Some(KeyStroke::plain(0x27)));
    }

    #[test]
    fn shifted_symbols_share_keys_with_their_base() {
        assert_eq!(lookup('!'), Some(KeyStroke::shifted(0x1E)));
        assert_eq!(lookup(')'), Some(KeyStroke::shifted(0x27)));
        assert_eq!(lookup('?'), Some(KeyStroke::shifted(0x38)));
        assert_eq!(lookup('/'), Some(KeyStroke::plain(0x38)));
        assert_eq!(lookup('"'), Some(KeyStroke::shifted(0x34)));
    }

    #[test]
    fn every_printable_ascii_character_is_mapped() {
        for byte in 0x20u8..=0x7E {
            assert!(lookup(byte as char).is_some(), "missing {:?}", byte as char);
        }
        assert_eq!(lookup('\n'), Some(KeyStroke::plain(0x28)));
        assert_eq!(lookup('\t'), Some(KeyStroke::plain(0x2B)));
    }

    #[test]
    fn control_and_non_ascii_characters_are_unmapped() {
        assert_eq!(lookup('\u{7f}'), None);
        assert_eq!(lookup('\u{1b}'), None);
        assert_eq!(lookup('é'), None);
        assert_eq!(first_unmapped("pass\u{e9}word"), Some((4, 'é')));
        assert_eq!(first_unmapped("Ab12!"), None);
    }
}
