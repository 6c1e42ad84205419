// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! CIGAR operation kinds and the small set of pure functions (`ref_pieces`, `read_pieces`,
//! `first_match`) that the cursor and pile aggregator build on.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CIGAR_RE: Regex = Regex::new(r"\d+[MIDNSHP=X]").unwrap();
}

/// The nine standard SAM CIGAR operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    Equal,
    Diff,
}

impl Kind {
    fn from_char(c: char) -> Option<Kind> {
        match c {
            'M' => Some(Kind::Match),
            'I' => Some(Kind::Insertion),
            'D' => Some(Kind::Deletion),
            'N' => Some(Kind::Skip),
            'S' => Some(Kind::SoftClip),
            'H' => Some(Kind::HardClip),
            'P' => Some(Kind::Pad),
            '=' => Some(Kind::Equal),
            'X' => Some(Kind::Diff),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Kind::Match => 'M',
            Kind::Insertion => 'I',
            Kind::Deletion => 'D',
            Kind::Skip => 'N',
            Kind::SoftClip => 'S',
            Kind::HardClip => 'H',
            Kind::Pad => 'P',
            Kind::Equal => '=',
            Kind::Diff => 'X',
        }
    }

    /// Whether an operation of this kind advances the reference coordinate.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Kind::Match | Kind::Deletion | Kind::Skip | Kind::Equal | Kind::Diff
        )
    }

    /// Whether an operation of this kind advances the read coordinate.
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            Kind::Match | Kind::Insertion | Kind::SoftClip | Kind::Equal | Kind::Diff
        )
    }

    /// A base reported at a position covered by an operation of this kind is a sequence match
    /// against the reference ('M', '=' and 'X' all carry a real read base; only 'M' is ambiguous
    /// about whether it matches, which is resolved by comparing bases directly).
    pub fn is_match_like(self) -> bool {
        matches!(self, Kind::Match | Kind::Equal | Kind::Diff)
    }
}

/// One CIGAR operation: a kind plus a length in bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: Kind,
    pub len: usize,
}

impl CigarOp {
    pub fn new(kind: Kind, len: usize) -> CigarOp {
        CigarOp { kind, len }
    }

    fn ref_len(self) -> usize {
        if self.kind.consumes_reference() {
            self.len
        } else {
            0
        }
    }

    fn query_len(self) -> usize {
        if self.kind.consumes_query() {
            self.len
        } else {
            0
        }
    }
}

/// Parses a raw CIGAR string (e.g. `"8M2I4M1D3M"`) into a list of operations. A bare `"*"` (no
/// CIGAR available) parses to an empty list.
pub fn parse(cigar: &str) -> Result<Vec<CigarOp>, &'static str> {
    if cigar == "*" {
        return Ok(Vec::new());
    }
    let mut ops = Vec::with_capacity(cigar.len() / 2);
    let mut total_len = 0;
    for m in CIGAR_RE.find_iter(cigar) {
        let num: usize = cigar[m.start()..m.end() - 1].parse().map_err(|_| "bad CIGAR length")?;
        let letter = cigar[m.end() - 1..m.end()].chars().next().unwrap();
        let kind = Kind::from_char(letter).ok_or("bad CIGAR operator")?;
        ops.push(CigarOp::new(kind, num));
        total_len += m.end() - m.start();
    }
    if cigar.len() != total_len {
        return Err("CIGAR string is not fully covered by operators");
    }
    Ok(ops)
}

/// Returns flat `[start0, end0, start1, end1, ...]` pairs of reference intervals the CIGAR
/// covers, merging adjacent pieces that share a boundary. Only operations that consume both
/// reference and query open or extend a piece; pure reference-consuming operations (deletions,
/// skips) extend the current piece without starting a new one.
pub fn ref_pieces(pos: usize, cigar: &[CigarOp]) -> Vec<usize> {
    if let [op] = cigar {
        if op.kind == Kind::Match {
            return vec![pos, pos + op.len];
        }
    }
    let mut pieces = Vec::with_capacity(4);
    let mut pos = pos;
    for op in cigar {
        if op.kind.consumes_reference() {
            if op.kind.consumes_query() {
                if pieces.is_empty() || pos != pieces[pieces.len() - 1] {
                    pieces.push(pos);
                    pieces.push(pos + op.len);
                } else {
                    let last = pieces.len() - 1;
                    pieces[last] = pos + op.len;
                }
            }
            pos += op.len;
        }
    }
    pieces
}

/// Like [`ref_pieces`] but in read coordinates: flat `[start, end, ...]` offsets into the read
/// that are covered by reference-consuming operations.
pub fn read_pieces(cigar: &[CigarOp]) -> Vec<usize> {
    if let [op] = cigar {
        if op.kind == Kind::Match {
            return vec![0, op.len];
        }
    }
    let mut pieces = Vec::with_capacity(4);
    let mut off = 0;
    for op in cigar {
        if op.kind.consumes_query() && op.kind.consumes_reference() {
            if pieces.is_empty() || off != pieces[pieces.len() - 1] {
                pieces.push(off);
                pieces.push(off + op.len);
            } else {
                let last = pieces.len() - 1;
                pieces[last] = off + op.len;
            }
        }
        if op.kind.consumes_query() {
            off += op.len;
        }
    }
    pieces
}

/// The read offset of the first `Match` operation, counting query-consuming lengths of every
/// operation before it.
pub fn first_match(cigar: &[CigarOp]) -> usize {
    let mut start = 0;
    for op in cigar {
        if op.kind == Kind::Match {
            return start;
        }
        start += op.query_len();
    }
    start
}
