// External crates
use std::collections::BTreeMap;
use std::fmt;

/// One decoded line from the meter.
///
/// The TIC link is 7-bit ASCII; any byte outside that range is line noise
/// and is replaced with U+FFFD instead of failing the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(String);

impl RawLine {
    pub fn decode(bytes: &[u8]) -> Self {
        let text = bytes
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    char::from(b)
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect::<String>();
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two whitespace separated tokens, if the line has them.
    ///
    /// Anything after the value (the TIC checksum character, trailing noise)
    /// is ignored.
    pub fn label_value(&self) -> Option<(&str, &str)> {
        let mut tokens = self.0.split_whitespace();
        let label = tokens.next()?;
        let value = tokens.next()?;
        Some((label, value))
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label to value mapping assembled from the lines of one read cycle.
///
/// Inserting a label that is already present replaces its value, so the
/// last line read for a label wins. Ordering carries no meaning; a sorted
/// map only keeps `Debug` output and comparisons stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    fields: BTreeMap<String, String>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `label`, returning the value it replaced.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(label.into(), value.into())
    }

    /// Merge a decoded line into the frame. Returns `false` when the line does
    /// not carry both a label and a value.
    pub fn merge_line(&mut self, line: &RawLine) -> bool {
        match line.label_value() {
            Some((label, value)) => {
                self.insert(label, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl<L, V> FromIterator<(L, V)> for Frame
where
    L: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (L, V)>>(iter: I) -> Self {
        let mut frame = Frame::new();
        for (label, value) in iter {
            frame.insert(label, value);
        }
        frame
    }
}
