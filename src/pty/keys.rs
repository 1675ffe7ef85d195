//! Terminal key sequences.

/// A key that can be sent to the terminal by name.
#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub label: &'static str,
    pub sequence: &'static [u8],
}

const fn key(label: &'static str, sequence: &'static [u8]) -> Key {
    Key { label, sequence }
}

/// Keypad layout, row by row.
pub const KEYPAD: &[&[Key]] = &[
    &[
        key("Esc", b"\x1b"),
        key("Tab", b"\t"),
        key("↑", b"\x1b[A"),
        key("Backspace", b"\x7f"),
    ],
    &[
        key("Home", b"\x1b[H"),
        key("←", b"\x1b[D"),
        key("↓", b"\x1b[B"),
        key("→", b"\x1b[C"),
    ],
    &[
        key("End", b"\x1b[F"),
        key("PgUp", b"\x1b[5~"),
        key("PgDn", b"\x1b[6~"),
        key("Enter", b"\r"),
    ],
    &[
        key("Ctrl+C", b"\x03"),
        key("Ctrl+D", b"\x04"),
        key("Ctrl+Z", b"\x1a"),
    ],
];

/// Sequence for the keypad key labelled `label`.
pub fn key_sequence(label: &str) -> Option<&'static [u8]> {
    KEYPAD
        .iter()
        .flat_map(|row| row.iter())
        .find(|key| key.label == label)
        .map(|key| key.sequence)
}

/// Keypad labels, row by row.
pub fn keypad_labels() -> Vec<Vec<String>> {
    KEYPAD
        .iter()
        .map(|row| row.iter().map(|key| key.label.to_string()).collect())
        .collect()
}

/// Control code for Ctrl+`letter`. Accepts a single ASCII letter in
/// either case.
pub fn ctrl_code(letter: &str) -> Option<u8> {
    let mut chars = letter.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase() as u8 - 0x40),
        _ => None,
    }
}
