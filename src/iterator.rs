// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! The sliding per-position iterator: owns the alignment source and the working set of alignments
//! still covering the current reference position, and advances one position per `next()` call.
//!
//! Resource cleanup is RAII: dropping a [`PileIterator`] drops its `source` and `reference`
//! fields, releasing whatever file handles back them. There is no explicit `close()` to forget to
//! call.

use std::collections::VecDeque;

use crate::error::PileError;
use crate::pile::{Options, Pile, WorkingAlignment};
use crate::record::{AlignmentRecord, AlignmentSource};
use crate::reference::ReferenceSource;

const GC_WINDOW_SMALL: usize = 32;
const GC_WINDOW_LARGE: usize = 128;

/// Walks `[start, end)` on `chrom`, emitting one [`Pile`] per covered reference position.
pub struct PileIterator<S: AlignmentSource> {
    source: S,
    options: Options,
    reference: Option<Box<dyn ReferenceSource>>,
    chrom: String,
    pos: usize,
    end: usize,
    working_set: VecDeque<WorkingAlignment<S::Record>>,
    next_record: Option<S::Record>,
    source_exhausted: bool,
    error: Option<PileError>,
}

impl<S: AlignmentSource> PileIterator<S> {
    /// Builds an iterator over `[start, end)` on `chrom`. `source` must already be restricted (by
    /// index) to that interval; construction primes the working set and, if the first passing
    /// record starts after `start`, fast-forwards `pos` to it.
    pub fn new(
        source: S,
        chrom: String,
        start: usize,
        end: usize,
        options: Options,
        reference: Option<Box<dyn ReferenceSource>>,
    ) -> Result<PileIterator<S>, PileError> {
        let mut iter = PileIterator {
            source,
            options,
            reference,
            chrom,
            pos: start,
            end,
            working_set: VecDeque::new(),
            next_record: None,
            source_exhausted: false,
            error: None,
        };
        iter.next_record = iter.pull_one()?;

        if let Some(rec) = &iter.next_record {
            if rec.ref_start() > iter.pos {
                iter.pos = rec.ref_start();
            }
        }

        Ok(iter)
    }

    fn passes(&self, record: &S::Record) -> bool {
        self.options.passes_flags(record.flags()) && record.mapq() >= self.options.min_mapping_quality
    }

    /// Pulls alignments from the source (skipping those that fail `passes`) until one passes or
    /// the source is exhausted.
    fn pull_one(&mut self) -> Result<Option<S::Record>, PileError> {
        loop {
            match self.source.next_record() {
                None => {
                    self.source_exhausted = true;
                    return Ok(None);
                }
                Some(Err(e)) => return Err(PileError::Io(e)),
                Some(Ok(record)) => {
                    if self.passes(&record) {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    /// Evicts alignments from the head of the working set whose coverage ends strictly before
    /// `pos`, then ingests alignments from the lookahead buffer until the buffered record starts
    /// strictly after `pos` (or the source is exhausted).
    fn refill(&mut self, pos: usize) -> Result<(), PileError> {
        while let Some(front) = self.working_set.front() {
            if front.ref_end() < pos {
                self.working_set.pop_front();
            } else {
                break;
            }
        }

        loop {
            match &self.next_record {
                Some(rec) if rec.ref_start() <= pos => {
                    let record = self.next_record.take().unwrap();
                    self.working_set.push_back(WorkingAlignment::new(record));
                    self.next_record = self.pull_one()?;
                }
                _ => break,
            }
        }

        Ok(())
    }

    fn build_pile(&mut self, pos: usize) -> Result<Pile, PileError> {
        let mut pile = Pile::new(self.chrom.clone(), pos);
        if let Some(reference) = self.reference.as_mut() {
            pile.ref_base = reference.base_at(&self.chrom, pos)?;

            let lo = pos.saturating_sub(GC_WINDOW_SMALL);
            let hi = pos + GC_WINDOW_SMALL;
            let stats = reference.window_stats(&self.chrom, lo, hi)?;
            pile.gc65 = stats.gc_count;
            pile.duplicity65 = stats.duplicity;

            let lo = pos.saturating_sub(GC_WINDOW_LARGE);
            let hi = pos + GC_WINDOW_LARGE;
            let stats = reference.window_stats(&self.chrom, lo, hi)?;
            pile.gc257 = stats.gc_count;
            pile.duplicity257 = stats.duplicity;
        }

        let mut alignments: Vec<WorkingAlignment<S::Record>> =
            std::mem::take(&mut self.working_set).into();
        pile.update(&self.options, &mut alignments);
        self.working_set = alignments.into();

        Ok(pile)
    }

    /// Any latched error, distinguishing it from ordinary end-of-stream (reported as `None` from
    /// `next()`, not here).
    pub fn error(&self) -> Option<&PileError> {
        self.error.as_ref()
    }
}

impl<S: AlignmentSource> Iterator for PileIterator<S> {
    type Item = Pile;

    fn next(&mut self) -> Option<Pile> {
        if self.error.is_some() || self.pos >= self.end {
            return None;
        }

        if let Err(e) = self.refill(self.pos) {
            self.error = Some(e);
            return None;
        }

        if self.working_set.is_empty() && self.source_exhausted {
            return None;
        }

        let pos = self.pos;
        let pile = match self.build_pile(pos) {
            Ok(p) => p,
            Err(e) => {
                self.error = Some(e);
                return None;
            }
        };
        self.pos += 1;

        if pile.depth == 0 && self.working_set.is_empty() {
            if let Some(next) = &self.next_record {
                if next.ref_start() > self.pos {
                    self.pos = next.ref_start();
                }
            }
        }

        Some(pile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::{FakeRecord, FakeSource};
    use crate::record::Flags;
    use std::collections::HashMap;

    fn fake(ref_start: usize, cigar_str: &str, seq: &[u8]) -> FakeRecord {
        FakeRecord {
            ref_id: 0,
            ref_start,
            mapq: 60,
            flags: Flags(0),
            mate_ref_id: None,
            mate_pos: None,
            cigar: crate::cigar::parse(cigar_str).unwrap(),
            sequence: seq.to_vec(),
            qualities: vec![40; seq.len()],
            sa_tag: None,
        }
    }

    #[test]
    fn test_emits_one_pile_per_position_in_range() {
        let source = FakeSource::new(vec![fake(0, "5M", b"AAAAA")]);
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            5,
            Options::default(),
            None,
        )
        .unwrap();
        let piles: Vec<Pile> = (&mut iter).collect();
        assert_eq!(piles.len(), 5);
        assert!(piles.iter().all(|p| p.depth == 1));
        assert!(iter.error().is_none());
    }

    #[test]
    fn test_fast_forwards_to_first_record_start() {
        let source = FakeSource::new(vec![fake(10, "5M", b"AAAAA")]);
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            15,
            Options::default(),
            None,
        )
        .unwrap();
        let piles: Vec<Pile> = (&mut iter).collect();
        assert_eq!(piles.first().unwrap().pos, 10);
        assert_eq!(piles.len(), 5);
    }

    #[test]
    fn test_evicts_alignment_once_its_coverage_ends() {
        let source = FakeSource::new(vec![fake(0, "3M", b"AAA"), fake(5, "3M", b"TTT")]);
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            8,
            Options::default(),
            None,
        )
        .unwrap();
        let piles: Vec<Pile> = (&mut iter).collect();
        assert_eq!(piles[3].depth, 0); // gap at position 3-4
        assert_eq!(piles[5].depth, 1);
    }

    #[test]
    fn test_skips_empty_gap_between_alignments() {
        let source = FakeSource::new(vec![fake(0, "2M", b"AA"), fake(20, "2M", b"TT")]);
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            22,
            Options::default(),
            None,
        )
        .unwrap();
        let piles: Vec<Pile> = (&mut iter).collect();
        // The gap from 2..20 is fast-forwarded rather than walked one position at a time, so it
        // contributes only the handful of zero-depth piles emitted before the working set is
        // truly empty (matching pileiter.go's own one-call-behind eviction), not all 18 positions
        // in between.
        assert!(piles.iter().filter(|p| p.depth == 0).count() < 18);
        assert_eq!(piles.last().unwrap().pos, 21);
    }

    #[test]
    fn test_gap_skip_gated_on_working_set_not_just_lookahead() {
        // A long-running alignment (covers [0, 10)) plus a short one fully nested inside its
        // span ([2, 4)), then a distant third alignment starting at 50. While the short read is
        // still the lone item fed to `pull_one`'s lookahead slot, the long read must still be
        // covering every position in between -- the gap-skip must not jump ahead just because
        // `next_record`'s start is far away; it has to wait until the working set itself empties.
        let source = FakeSource::new(vec![
            fake(0, "10M", b"AAAAAAAAAA"),
            fake(2, "2M", b"TT"),
            fake(50, "2M", b"GG"),
        ]);
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            52,
            Options::default(),
            None,
        )
        .unwrap();
        let piles: Vec<Pile> = (&mut iter).collect();
        // positions 0..10 must all be reported (depth >= 1 throughout), none skipped, since the
        // 10M alignment covers them regardless of the 50-start lookahead record sitting far ahead.
        for pos in 0..10 {
            let pile = piles.iter().find(|p| p.pos == pos).unwrap_or_else(|| {
                panic!("position {} was skipped even though the long alignment covers it", pos)
            });
            assert!(pile.depth >= 1);
        }
    }

    #[test]
    fn test_reference_supplies_ref_base_and_window_stats() {
        use crate::reference::test_support::FakeReference;

        let source = FakeSource::new(vec![fake(0, "5M", b"AAAAA")]);
        let mut contigs = HashMap::new();
        contigs.insert("chr1".to_string(), b"AGCATGTTAG".to_vec());
        let reference: Box<dyn ReferenceSource> = Box::new(FakeReference::new(contigs));
        let mut iter = PileIterator::new(
            source,
            "chr1".to_string(),
            0,
            5,
            Options::default(),
            Some(reference),
        )
        .unwrap();
        let pile = iter.next().unwrap();
        assert_eq!(pile.ref_base, b'A');
    }
}
