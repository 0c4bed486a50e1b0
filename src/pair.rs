//! Orientation of paired-end alignments.

use serde::Serialize;

/// Relative orientation of the two ends of a mapped pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairType {
    /// Leftmost end forward, rightmost end reverse.
    Normal,
    /// Both ends reverse.
    InvertedRead,
    /// Both ends forward.
    InvertedMate,
    /// Leftmost end reverse, rightmost end forward.
    Everted,
}

/// Classify a pair from the start coordinates and strands of both ends.
///
/// The end with the smaller start is taken as first. When both ends start at
/// the same position the forward end is taken as first, so the result does not
/// depend on which end is passed as the read.
pub fn classify(read_start: u64, mate_start: u64, read_reverse: bool, mate_reverse: bool) -> PairType {
    let read_first = match read_start.cmp(&mate_start) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => !read_reverse,
    };

    let (first_reverse, second_reverse) = if read_first {
        (read_reverse, mate_reverse)
    } else {
        (mate_reverse, read_reverse)
    };

    match (first_reverse, second_reverse) {
        (false, true) => PairType::Normal,
        (true, true) => PairType::InvertedRead,
        (false, false) => PairType::InvertedMate,
        (true, false) => PairType::Everted,
    }
}
