// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! The reference sidecar: per-base lookups and windowed GC/complexity stats, backed by an
//! indexed FASTA. Out-of-range windows clamp to the contig bounds; a missing contig is a
//! programmer-misuse error (fatal), per the error handling design.

use std::collections::HashSet;
use std::convert::TryFrom;
use std::fs::File;
use std::path::Path;

use noodles::core::{Position, Region};
use noodles::fasta::{self, io::BufReader};

use crate::error::PileError;

/// GC fraction and local-repeat complexity over one reference window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub gc_count: u32,
    pub duplicity: f32,
}

/// The interface the pile aggregator consumes from whatever supplies reference context. Kept
/// narrow enough to be satisfied by a plain in-memory map in tests.
pub trait ReferenceSource {
    fn base_at(&mut self, chrom: &str, pos: usize) -> Result<u8, PileError>;
    fn window_stats(&mut self, chrom: &str, lo: usize, hi: usize) -> Result<WindowStats, PileError>;
}

/// A [`ReferenceSource`] backed by an indexed FASTA (`.fai` sidecar).
pub struct FastaReference {
    reader: fasta::io::IndexedReader<BufReader<File>>,
}

impl FastaReference {
    pub fn open(path: &Path) -> std::io::Result<FastaReference> {
        let reader = fasta::io::indexed_reader::Builder::default().build_from_path(path)?;
        Ok(FastaReference { reader })
    }

    fn contig_length(&self, chrom: &str) -> Option<usize> {
        self.reader
            .index()
            .as_ref()
            .iter()
            .find(|record| AsRef::<[u8]>::as_ref(record.name()) == chrom.as_bytes())
            .map(|record| record.length() as usize)
    }

    fn fetch(&mut self, chrom: &str, start1: usize, end1: usize) -> Result<Vec<u8>, PileError> {
        let contig_len = self
            .contig_length(chrom)
            .ok_or_else(|| PileError::MissingContig(chrom.to_string()))?;
        let start1 = start1.max(1);
        let end1 = end1.min(contig_len);
        if start1 > end1 {
            return Ok(Vec::new());
        }
        let start = Position::try_from(start1)
            .map_err(|_| PileError::MissingContig(chrom.to_string()))?;
        let end =
            Position::try_from(end1).map_err(|_| PileError::MissingContig(chrom.to_string()))?;
        let region = Region::new(chrom.to_string(), start..=end);
        let record = self.reader.query(&region)?;
        Ok(record.sequence().as_ref().to_vec())
    }
}

impl ReferenceSource for FastaReference {
    fn base_at(&mut self, chrom: &str, pos: usize) -> Result<u8, PileError> {
        let bases = self.fetch(chrom, pos + 1, pos + 1)?;
        Ok(bases.first().copied().unwrap_or(b'N'))
    }

    fn window_stats(&mut self, chrom: &str, lo: usize, hi: usize) -> Result<WindowStats, PileError> {
        let start1 = lo.saturating_add(1);
        let bases = self.fetch(chrom, start1, hi + 1)?;
        Ok(window_stats_of(&bases))
    }
}

/// Computes GC count and 4-mer repeat-fraction duplicity over a window's raw bases. Broken out
/// from [`FastaReference`] so it can be exercised without a real FASTA file.
fn window_stats_of(bases: &[u8]) -> WindowStats {
    let gc_count = bases
        .iter()
        .filter(|b| matches!(b.to_ascii_uppercase(), b'G' | b'C'))
        .count() as u32;

    const K: usize = 4;
    let duplicity = if bases.len() < K {
        0.0
    } else {
        let mut seen = HashSet::new();
        let mut repeats = 0usize;
        let mut total = 0usize;
        for window in bases.windows(K) {
            total += 1;
            if !seen.insert(window.to_vec()) {
                repeats += 1;
            }
        }
        repeats as f32 / total as f32
    };

    WindowStats { gc_count, duplicity }
}
