// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! The forward-only cursor that walks one alignment's CIGAR ops and expanded sequence, answering
//! "what does this read look like at reference position p" in amortised O(1) per forward step.
//!
//! [`CursorState`] holds only the walk indices, not a borrow of the record it walks — the record
//! is passed in on every call. That keeps a `(record, cursor)` pair plain data instead of a
//! self-referential struct, which matters once the sliding iterator starts storing both together
//! in its working set.

use crate::cigar::{CigarOp, Kind};

/// The byte reported for a position covered by a reference skip (`N`).
pub const SKIP_BASE: u8 = b'.';

/// Result of [`CursorState::at`]: the CIGAR context of one read at one reference position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CigarSummary {
    pub at: CigarOp,
    pub left: CigarOp,
    pub right: CigarOp,
    pub head: bool,
    pub tail: bool,
    pub base: u8,
    pub qual: u8,
    pub insertion: Vec<u8>,
}

/// The walk state for one alignment's cursor: how far through the CIGAR ops, reference span, and
/// read span it has advanced, plus the monotonicity guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorState {
    cigar_idx: usize,
    ref_offset: usize,
    read_offset: usize,
    last_queried: Option<usize>,
}

impl CursorState {
    pub fn new() -> CursorState {
        CursorState::default()
    }

    /// The reference position this cursor has consumed up to so far, given the alignment's
    /// reference start.
    pub fn frontier(&self, ref_start: usize) -> usize {
        ref_start + self.ref_offset
    }

    /// Queries the read's context at reference position `pos0`, given the alignment's CIGAR,
    /// reference start, and expanded sequence/quality bytes. `pos0` must be strictly greater than
    /// the position of any previous call on this cursor; violating that is a caller bug and
    /// panics rather than returning a `Result`.
    pub fn at(
        &mut self,
        cigar: &[CigarOp],
        ref_start: usize,
        sequence: &[u8],
        qualities: &[u8],
        pos0: usize,
    ) -> Option<CigarSummary> {
        if let Some(last) = self.last_queried {
            assert!(
                pos0 > last,
                "cursor queried at {} after already queried at {}",
                pos0,
                last
            );
        }
        self.last_queried = Some(pos0);

        if cigar.is_empty() {
            return None;
        }
        let mut pos = ref_start + self.ref_offset;
        if pos0 < pos {
            return None;
        }

        let mut left = cigar[self.cigar_idx.saturating_sub(1)];
        let head = pos0 == pos && self.ref_offset == 0;

        for &op in &cigar[self.cigar_idx..] {
            let lr = if op.kind.consumes_reference() { op.len } else { 0 };
            let lq = if op.kind.consumes_query() { op.len } else { 0 };

            if pos0 > pos {
                left = op;
            }

            if pos + lr > pos0 {
                let at = op;
                let mut right = op;
                let readi = self.read_offset + (pos0 - pos);
                let (base, qual) = if lq > 0 {
                    (sequence[readi], qualities[readi])
                } else if op.kind == Kind::Skip {
                    (SKIP_BASE, 0)
                } else {
                    (b'*', 0)
                };

                let mut tail = false;
                if pos + lr - 1 == pos0 {
                    let idx = self.cigar_idx + 1;
                    if idx == cigar.len() {
                        tail = true;
                    } else {
                        right = cigar[idx];
                    }
                }

                let insertion = if right.kind == Kind::Insertion {
                    sequence[readi + 1..readi + 1 + right.len].to_vec()
                } else {
                    Vec::new()
                };

                return Some(CigarSummary {
                    at,
                    left,
                    right,
                    head,
                    tail,
                    base,
                    qual,
                    insertion,
                });
            }

            left = op;
            self.cigar_idx += 1;
            self.ref_offset += lr;
            self.read_offset += lq;
            pos += lr;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar;

    #[test]
    fn test_worked_example_at_18_19_21() {
        // r001 from the canonical worked example: 8M2I4M1D3M at refStart 6.
        let ops = cigar::parse("8M2I4M1D3M").unwrap();
        let seq = vec![b'A'; 17]; // 8 (M) + 2 (I) + 4 (M) + 3 (M) query-consuming bases
        let qual = vec![30u8; 17];
        let mut cursor = CursorState::new();

        cursor.at(&ops, 6, &seq, &qual, 6).unwrap(); // prime the cursor at the first position
        let s18 = cursor.at(&ops, 6, &seq, &qual, 18).unwrap();
        assert_eq!(s18.at.kind, Kind::Deletion);
        assert_eq!(s18.left.kind, Kind::Match);

        let s19 = cursor.at(&ops, 6, &seq, &qual, 19).unwrap();
        assert_eq!(s19.at.kind, Kind::Match);

        let s21 = cursor.at(&ops, 6, &seq, &qual, 21).unwrap();
        assert!(s21.tail);
    }

    #[test]
    fn test_head_flag_on_first_query() {
        let ops = cigar::parse("10M").unwrap();
        let seq = vec![b'A'; 10];
        let qual = vec![30u8; 10];
        let mut cursor = CursorState::new();
        let s = cursor.at(&ops, 100, &seq, &qual, 100).unwrap();
        assert!(s.head);
        let s = cursor.at(&ops, 100, &seq, &qual, 101).unwrap();
        assert!(!s.head);
    }

    #[test]
    fn test_insertion_reported_on_right() {
        let ops = cigar::parse("4M2I4M").unwrap();
        let seq = b"AAAAGGAAAA".to_vec();
        let qual = vec![30u8; 10];
        let mut cursor = CursorState::new();
        let s = cursor.at(&ops, 0, &seq, &qual, 3).unwrap();
        assert_eq!(s.right.kind, Kind::Insertion);
        assert_eq!(s.insertion, b"GG".to_vec());
    }

    #[test]
    fn test_deletion_base_is_star() {
        let ops = cigar::parse("2M1D2M").unwrap();
        let seq = b"AATT".to_vec();
        let qual = vec![30u8; 4];
        let mut cursor = CursorState::new();
        let s = cursor.at(&ops, 10, &seq, &qual, 12).unwrap();
        assert_eq!(s.at.kind, Kind::Deletion);
        assert_eq!(s.base, b'*');
    }

    #[test]
    fn test_skip_base_is_sentinel() {
        let ops = cigar::parse("2M3N2M").unwrap();
        let seq = b"AATT".to_vec();
        let qual = vec![30u8; 4];
        let mut cursor = CursorState::new();
        let s = cursor.at(&ops, 10, &seq, &qual, 13).unwrap();
        assert_eq!(s.at.kind, Kind::Skip);
        assert_eq!(s.base, SKIP_BASE);
    }

    #[test]
    #[should_panic]
    fn test_non_monotonic_query_panics() {
        let ops = cigar::parse("10M").unwrap();
        let seq = vec![b'A'; 10];
        let qual = vec![30u8; 10];
        let mut cursor = CursorState::new();
        cursor.at(&ops, 0, &seq, &qual, 5).unwrap();
        cursor.at(&ops, 0, &seq, &qual, 5).unwrap();
    }

    #[test]
    fn test_returns_none_past_alignment_end() {
        let ops = cigar::parse("10M").unwrap();
        let seq = vec![b'A'; 10];
        let qual = vec![30u8; 10];
        let mut cursor = CursorState::new();
        assert!(cursor.at(&ops, 0, &seq, &qual, 20).is_none());
    }
}
