// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! The pile aggregator: folds a set of alignments, each queried at the current reference
//! position through its cursor, into one [`Pile`] record.

use crate::cigar::Kind;
use crate::cursor::CursorState;
use crate::entropy::entropy;
use crate::record::{AlignmentRecord, Flags};

/// Recognised switches controlling which bases and reads are counted and how verbosely split-read
/// evidence is reported.
#[derive(Debug, Clone)]
pub struct Options {
    pub min_base_quality: u8,
    pub min_mapping_quality: u8,
    pub exclude_flag: u16,
    pub include_flag: u16,
    pub min_clip_length: usize,
    pub include_bases: bool,
    pub splitter_verbosity: u8,
    pub concordant_cutoff: i64,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            min_base_quality: 10,
            min_mapping_quality: 5,
            exclude_flag: Flags::UNMAPPED | Flags::QC_FAIL | Flags::DUPLICATE,
            include_flag: 0,
            min_clip_length: 15,
            include_bases: false,
            splitter_verbosity: 0,
            concordant_cutoff: 10_000,
        }
    }
}

impl Options {
    /// Whether an alignment passes the flag mask filters (mapping quality is checked separately,
    /// against the cursor query itself, since the cursor also needs to run regardless).
    pub fn passes_flags(&self, flags: Flags) -> bool {
        if self.exclude_flag != 0 && flags.0 & self.exclude_flag != 0 {
            return false;
        }
        if self.include_flag != 0 && flags.0 & self.include_flag != self.include_flag {
            return false;
        }
        true
    }
}

/// One reference position in a split-read's other placement, as recorded in the `SA:Z` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub chrom: String,
    pub start: usize,
    pub end: usize,
    pub strand: i8,
}

/// An alignment plus its forward-only cursor, as held in the sliding iterator's working set.
pub struct WorkingAlignment<R: AlignmentRecord> {
    pub record: R,
    cursor: CursorState,
}

impl<R: AlignmentRecord> WorkingAlignment<R> {
    pub fn new(record: R) -> WorkingAlignment<R> {
        WorkingAlignment {
            record,
            cursor: CursorState::new(),
        }
    }

    /// The reference position one past the last base this alignment covers.
    pub fn ref_end(&self) -> usize {
        let mut end = self.record.ref_start();
        for op in self.record.cigar() {
            if op.kind.consumes_reference() {
                end += op.len;
            }
        }
        end
    }
}

/// The per-position summary emitted by the sliding iterator.
#[derive(Debug, Clone)]
pub struct Pile {
    pub chrom: String,
    pub pos: usize,
    pub depth: u32,
    pub ref_base: u8,
    pub mismatches: u32,
    pub proper_pairs: u32,
    pub soft_starts: u32,
    pub soft_ends: u32,
    pub hard_starts: u32,
    pub hard_ends: u32,
    pub insertion_starts: u32,
    pub insertion_ends: u32,
    pub deletions: u32,
    pub heads: u32,
    pub tails: u32,
    pub splitters: u32,
    pub splitters1: u32,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    pub insert_size_lps: Vec<i64>,
    pub insert_size_rms: Vec<i64>,
    pub orientation_plus_plus: u32,
    pub orientation_minus_minus: u32,
    pub orientation_minus_plus: u32,
    pub orientation_splitter: u32,
    pub discordant: u32,
    pub discordant_chrom: u32,
    pub discordant_chrom_entropy: f32,
    pub gc65: u32,
    pub gc257: u32,
    pub duplicity65: f32,
    pub duplicity257: f32,
    pub splitter_positions: Vec<Position>,
}

impl Pile {
    pub fn new(chrom: String, pos: usize) -> Pile {
        Pile {
            chrom,
            pos,
            depth: 0,
            ref_base: b'N',
            mismatches: 0,
            proper_pairs: 0,
            soft_starts: 0,
            soft_ends: 0,
            hard_starts: 0,
            hard_ends: 0,
            insertion_starts: 0,
            insertion_ends: 0,
            deletions: 0,
            heads: 0,
            tails: 0,
            splitters: 0,
            splitters1: 0,
            bases: Vec::new(),
            quals: Vec::new(),
            insert_size_lps: Vec::new(),
            insert_size_rms: Vec::new(),
            orientation_plus_plus: 0,
            orientation_minus_minus: 0,
            orientation_minus_plus: 0,
            orientation_splitter: 0,
            discordant: 0,
            discordant_chrom: 0,
            discordant_chrom_entropy: 0.0,
            gc65: 0,
            gc257: 0,
            duplicity65: 0.0,
            duplicity257: 0.0,
            splitter_positions: Vec::new(),
        }
    }

    /// Folds every alignment currently covering this pile's position into it. Alignments whose
    /// cursor returns nothing at this position, or whose reported base quality is too low, are
    /// silently dropped rather than failing the whole pile.
    pub fn update<R: AlignmentRecord>(&mut self, options: &Options, alignments: &mut [WorkingAlignment<R>]) {
        let mut disc_mates: Vec<i32> = Vec::new();

        for wa in alignments.iter_mut() {
            if wa.record.mapq() < options.min_mapping_quality {
                continue;
            }
            let summary = match wa.cursor.at(
                wa.record.cigar(),
                wa.record.ref_start(),
                wa.record.sequence(),
                wa.record.qualities(),
                self.pos,
            ) {
                Some(s) => s,
                None => continue,
            };
            if summary.qual < options.min_base_quality {
                continue;
            }

            let flags = wa.record.flags();
            let strand: i8 = if flags.is_reverse() { -1 } else { 1 };

            if flags.is_paired() {
                if flags.is_proper_pair() {
                    self.proper_pairs += 1;
                }
                if let Some(mate_pos) = wa.record.mate_pos() {
                    let dist = (wa.record.ref_start() as i64 - mate_pos as i64).abs();
                    if dist > options.concordant_cutoff {
                        self.discordant += 1;
                    }
                }
                match (wa.record.mate_ref_id(), wa.record.mate_pos()) {
                    (Some(mate_ref), _) if mate_ref != wa.record.ref_id() => {
                        self.discordant_chrom += 1;
                        disc_mates.push(mate_ref as i32);
                    }
                    (Some(_), Some(mate_pos)) => {
                        let ref_start = wa.record.ref_start();
                        if ref_start < mate_pos && !flags.is_reverse() {
                            self.insert_size_lps.push((mate_pos - ref_start) as i64);
                        } else if ref_start > mate_pos && flags.is_reverse() {
                            self.insert_size_rms.push((ref_start - mate_pos) as i64);
                        } else if flags.is_reverse() && flags.is_set(Flags::MATE_REVERSE) {
                            self.orientation_minus_minus += 1;
                        } else if !flags.is_reverse() && !flags.is_set(Flags::MATE_REVERSE) {
                            self.orientation_plus_plus += 1;
                        } else {
                            self.orientation_minus_plus += 1;
                        }
                    }
                    _ => {}
                }
            }

            if !wa.record.is_secondary() {
                if let Some(sa_raw) = wa.record.sa_tag() {
                    self.splitters += 1;
                    if sa_raw.matches(';').count() <= 1 {
                        self.splitters1 += 1;
                    }
                    self.fold_splitters(options, sa_raw, strand);
                }
            }

            self.depth += 1;

            match summary.right.kind {
                Kind::Insertion => self.insertion_starts += 1,
                Kind::SoftClip if summary.right.len >= options.min_clip_length => self.soft_starts += 1,
                Kind::HardClip if summary.right.len >= options.min_clip_length => self.hard_starts += 1,
                _ => {}
            }
            match summary.left.kind {
                Kind::Insertion => self.insertion_ends += 1,
                Kind::SoftClip if summary.left.len >= options.min_clip_length => self.soft_ends += 1,
                Kind::HardClip if summary.left.len >= options.min_clip_length => self.hard_ends += 1,
                _ => {}
            }

            if summary.head {
                self.heads += 1;
            } else if summary.tail {
                self.tails += 1;
            }

            if summary.at.kind == Kind::Deletion {
                self.deletions += 1;
            }

            if options.include_bases {
                self.bases.push(summary.base);
                self.quals.push(summary.qual);
            }

            if summary.base != self.ref_base {
                self.mismatches += 1;
            }
        }

        if self.discordant_chrom > 1 {
            self.discordant_chrom_entropy = entropy(&disc_mates) as f32;
        }
        if self.ref_base == b'N' {
            self.mismatches = 0;
        }
    }

    /// Records per-tag split evidence according to `splitter_verbosity`, and bumps
    /// `orientation_splitter` once if any SA entry in this tag disagrees with the alignment's own
    /// strand (not once per distinct disagreeing entry).
    fn fold_splitters(&mut self, options: &Options, raw_tag: &str, read_strand: i8) {
        if options.splitter_verbosity == 0 {
            return;
        }
        let mut orientation_change = false;
        for sa in crate::sa::parse_tag(raw_tag) {
            if sa.mapq >= options.min_mapping_quality {
                let end = sa.end();
                self.splitter_positions.push(Position {
                    chrom: sa.chrom.clone(),
                    start: sa.pos,
                    end,
                    strand: sa.strand,
                });
                if read_strand != sa.strand {
                    orientation_change = true;
                }
            }
        }
        if orientation_change {
            self.orientation_splitter += 1;
        }
    }
}

/// Mean of a list of insert sizes, rounded `(0.5 + sum/n).floor()`; 0 when empty. This is
/// round-half-up, not banker's rounding: a mean landing exactly on `k.5` always rounds to `k+1`,
/// matching the Go original's `int(0.5 + s/float64(len(arr)))`.
pub fn mean_insert_size(sizes: &[i64]) -> u32 {
    if sizes.is_empty() {
        return 0;
    }
    let sum: f64 = sizes.iter().sum::<i64>() as f64;
    (0.5 + sum / sizes.len() as f64).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar;
    use crate::record::test_support::FakeRecord;

    fn fake(ref_start: usize, cigar_str: &str, seq: &[u8], flags: u16) -> FakeRecord {
        FakeRecord {
            ref_id: 0,
            ref_start,
            mapq: 60,
            flags: Flags(flags),
            mate_ref_id: None,
            mate_pos: None,
            cigar: cigar::parse(cigar_str).unwrap(),
            sequence: seq.to_vec(),
            qualities: vec![40; seq.len()],
            sa_tag: None,
        }
    }

    #[test]
    fn test_depth_and_mismatch_against_reference() {
        let mut pile = Pile::new("chr1".to_string(), 10);
        pile.ref_base = b'A';
        let options = Options::default();
        let mut alignments = vec![
            WorkingAlignment::new(fake(10, "5M", b"AAAAA", 0)),
            WorkingAlignment::new(fake(10, "5M", b"TAAAA", 0)),
        ];
        pile.update(&options, &mut alignments);
        assert_eq!(pile.depth, 2);
        assert_eq!(pile.mismatches, 1);
    }

    #[test]
    fn test_mismatches_reset_when_ref_base_unknown() {
        let mut pile = Pile::new("chr1".to_string(), 10);
        // ref_base defaults to 'N'
        let options = Options::default();
        let mut alignments = vec![WorkingAlignment::new(fake(10, "5M", b"TAAAA", 0))];
        pile.update(&options, &mut alignments);
        assert_eq!(pile.mismatches, 0);
    }

    #[test]
    fn test_low_mapq_alignment_dropped() {
        let mut pile = Pile::new("chr1".to_string(), 10);
        pile.ref_base = b'A';
        let options = Options::default();
        let mut low = fake(10, "5M", b"AAAAA", 0);
        low.mapq = 1;
        let mut alignments = vec![WorkingAlignment::new(low)];
        pile.update(&options, &mut alignments);
        assert_eq!(pile.depth, 0);
    }

    #[test]
    fn test_discordant_chrom_pair() {
        let mut pile = Pile::new("chr1".to_string(), 10);
        let options = Options::default();
        let mut a1 = fake(10, "5M", b"AAAAA", Flags::PAIRED);
        a1.mate_ref_id = Some(1);
        a1.mate_pos = Some(500);
        let mut a2 = fake(10, "5M", b"AAAAA", Flags::PAIRED);
        a2.mate_ref_id = Some(2);
        a2.mate_pos = Some(600);
        let mut alignments = vec![WorkingAlignment::new(a1), WorkingAlignment::new(a2)];
        pile.update(&options, &mut alignments);
        assert_eq!(pile.discordant_chrom, 2);
        assert!(pile.discordant_chrom_entropy > 0.0);
    }

    #[test]
    fn test_mean_insert_size() {
        assert_eq!(mean_insert_size(&[]), 0);
        assert_eq!(mean_insert_size(&[100, 200, 300]), 200);
        assert_eq!(mean_insert_size(&[1, 2]), 2); // round-half-up of 1.5 -> 2
        // 2.5 discriminates round-half-up (3) from banker's round-half-to-even (2).
        assert_eq!(mean_insert_size(&[2, 3]), 3);
    }

    #[test]
    fn test_splitters_counted_for_non_secondary_with_sa() {
        let mut pile = Pile::new("chr1".to_string(), 10);
        pile.ref_base = b'A';
        let options = Options::default();
        let mut a = fake(10, "5M", b"AAAAA", 0);
        a.sa_tag = Some("chr2,100,+,5M,60,0".to_string());
        let mut alignments = vec![WorkingAlignment::new(a)];
        pile.update(&options, &mut alignments);
        assert_eq!(pile.splitters, 1);
        assert_eq!(pile.splitters1, 1);
    }
}
