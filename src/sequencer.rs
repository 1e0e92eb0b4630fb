//! Sequencer module for ordering local entries
//!
//! This module turns an unordered set of filesystem paths into a deterministic
//! sequence, using either natural ordering (embedded numbers compare by value)
//! or plain lexicographic byte ordering of the full path.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Comparator used to order local entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Digit runs compare by numeric value (`ep2` before `ep10`)
    #[default]
    Natural,
    /// Byte order of the full path (`ep10` before `ep2`)
    Lexicographic,
}

impl SortMode {
    /// Compares two paths, falling back to byte order so the result is total
    pub fn compare(self, a: &Path, b: &Path) -> Ordering {
        let primary = match self {
            SortMode::Natural => natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()),
            SortMode::Lexicographic => lexicographic_cmp(a, b),
        };

        primary.then_with(|| lexicographic_cmp(a, b))
    }
}

/// A path together with its position in the sequencer output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path of the file or directory
    pub path: PathBuf,
    /// Zero-based position in the ordered sequence
    pub position: usize,
}

/// Orders a set of paths into a deterministic sequence
///
/// Duplicate paths are collapsed, so the input behaves like a set.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use tv_rename::{SortMode, sequence};
///
/// let entries = sequence(
///     vec![PathBuf::from("ep10.mkv"), PathBuf::from("ep2.mkv")],
///     SortMode::Natural,
/// );
/// assert_eq!(entries[0].path, PathBuf::from("ep2.mkv"));
/// ```
pub fn sequence<I>(entries: I, mode: SortMode) -> Vec<LocalEntry>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut paths: Vec<PathBuf> = entries.into_iter().collect();
    paths.sort_by(|a, b| mode.compare(a, b));
    paths.dedup();

    paths
        .into_iter()
        .enumerate()
        .map(|(position, path)| LocalEntry { path, position })
        .collect()
}

/// Byte-wise comparison of two paths
pub fn lexicographic_cmp(a: &Path, b: &Path) -> Ordering {
    a.as_os_str()
        .as_encoded_bytes()
        .cmp(b.as_os_str().as_encoded_bytes())
}

/// Natural comparison of two names
///
/// Both names are split into alternating runs of ASCII digits and other
/// characters. Digit runs compare by numeric value of any length; equal values
/// written with a different number of digits order the shorter run first.
/// All other runs compare literally.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Runs { rest: a };
    let mut right = Runs { rest: b };

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = compare_runs(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

impl<'a> Run<'a> {
    fn as_str(self) -> &'a str {
        match self {
            Run::Digits(s) | Run::Text(s) => s,
        }
    }
}

/// Iterator over the digit / non-digit runs of a name
struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();

        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;

        Some(if digits {
            Run::Digits(run)
        } else {
            Run::Text(run)
        })
    }
}

fn compare_runs(a: Run<'_>, b: Run<'_>) -> Ordering {
    match (a, b) {
        (Run::Digits(x), Run::Digits(y)) => compare_numeric(x, y),
        (x, y) => x.as_str().cmp(y.as_str()),
    }
}

/// Compares two digit runs by value without parsing them into integers
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a_value = a.trim_start_matches('0');
    let b_value = b.trim_start_matches('0');

    a_value
        .len()
        .cmp(&b_value.len())
        .then_with(|| a_value.cmp(b_value))
        .then_with(|| a.len().cmp(&b.len()))
}
