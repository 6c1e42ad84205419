// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! Adapts an indexed BAM file into the [`AlignmentSource`]/[`AlignmentRecord`] traits the core
//! pileup machinery consumes.

use std::cell::OnceCell;
use std::convert::TryFrom;
use std::fs::File;
use std::io;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::core::{Position, Region};
use noodles::sam::{self as sam, alignment::record::data::field::Tag};

use crate::cigar::{CigarOp, Kind};
use crate::record::{AlignmentRecord, AlignmentSource, Flags};

type InnerReader = bgzf::io::Reader<File>;
type IndexedReader = bam::io::IndexedReader<InnerReader>;
type RecordQuery = bam::io::reader::Query<'static, InnerReader>;

fn convert_kind(kind: sam::alignment::record::cigar::op::Kind) -> Kind {
    use sam::alignment::record::cigar::op::Kind as SamKind;
    match kind {
        SamKind::Match => Kind::Match,
        SamKind::Insertion => Kind::Insertion,
        SamKind::Deletion => Kind::Deletion,
        SamKind::Skip => Kind::Skip,
        SamKind::SoftClip => Kind::SoftClip,
        SamKind::HardClip => Kind::HardClip,
        SamKind::Pad => Kind::Pad,
        SamKind::SequenceMatch => Kind::Equal,
        SamKind::SequenceMismatch => Kind::Diff,
    }
}

/// One alignment decoded from the BAM. Only the fields the sliding iterator needs for ordering
/// and eviction (`ref_id`, `ref_start`, `mapq`, `flags`, mate coordinates) are decoded eagerly;
/// the CIGAR, sequence, qualities and SA tag stay packed in the underlying `bam::Record` and are
/// expanded on first access, matching the "lazily-expanded sequence" invariant.
pub struct BamRecord {
    record: bam::Record,
    ref_id: usize,
    ref_start: usize,
    mapq: u8,
    flags: Flags,
    mate_ref_id: Option<usize>,
    mate_pos: Option<usize>,
    cigar: OnceCell<Vec<CigarOp>>,
    sequence: OnceCell<Vec<u8>>,
    qualities: OnceCell<Vec<u8>>,
    sa_tag: OnceCell<Option<String>>,
}

impl AlignmentRecord for BamRecord {
    fn ref_id(&self) -> usize {
        self.ref_id
    }
    fn ref_start(&self) -> usize {
        self.ref_start
    }
    fn mapq(&self) -> u8 {
        self.mapq
    }
    fn flags(&self) -> Flags {
        self.flags
    }
    fn mate_ref_id(&self) -> Option<usize> {
        self.mate_ref_id
    }
    fn mate_pos(&self) -> Option<usize> {
        self.mate_pos
    }
    fn cigar(&self) -> &[CigarOp] {
        self.cigar.get_or_init(|| decode_cigar(&self.record))
    }
    fn sequence(&self) -> &[u8] {
        self.sequence
            .get_or_init(|| self.record.sequence().iter().collect())
    }
    fn qualities(&self) -> &[u8] {
        self.qualities
            .get_or_init(|| self.record.quality_scores().iter().collect())
    }
    fn sa_tag(&self) -> Option<&str> {
        self.sa_tag.get_or_init(|| decode_sa_tag(&self.record)).as_deref()
    }
}

fn decode_cigar(record: &bam::Record) -> Vec<CigarOp> {
    record
        .cigar()
        .iter()
        .map(|op| {
            let op = op.expect("malformed CIGAR operation in BAM record");
            CigarOp::new(convert_kind(op.kind()), op.len())
        })
        .collect()
}

fn decode_sa_tag(record: &bam::Record) -> Option<String> {
    match record.data().get(&Tag::OTHER_ALIGNMENTS) {
        Some(Ok(sam::alignment::record::data::field::Value::String(s))) => Some(s.to_string()),
        _ => None,
    }
}

/// Decodes the cheap, always-needed fields eagerly and defers the rest. Returns `None` for
/// unmapped records, which the working set never needs to see.
fn adapt(record: bam::Record) -> io::Result<Option<BamRecord>> {
    let ref_id = match record.reference_sequence_id() {
        Some(id) => id?,
        None => return Ok(None),
    };
    let ref_start = match record.alignment_start() {
        Some(pos) => pos?.get() - 1,
        None => return Ok(None),
    };

    let mapq = record.mapping_quality().map(|q| q.get()).unwrap_or(0);
    let flags = Flags(record.flags().bits());

    let mate_ref_id = match record.mate_reference_sequence_id() {
        Some(id) => Some(id?),
        None => None,
    };
    let mate_pos = match record.mate_alignment_start() {
        Some(pos) => Some(pos?.get() - 1),
        None => None,
    };

    Ok(Some(BamRecord {
        record,
        ref_id,
        ref_start,
        mapq,
        flags,
        mate_ref_id,
        mate_pos,
        cigar: OnceCell::new(),
        sequence: OnceCell::new(),
        qualities: OnceCell::new(),
        sa_tag: OnceCell::new(),
    }))
}

/// An [`AlignmentSource`] backed by an indexed BAM file, restricted to one query region. Reads
/// records lazily off disk through noodles' own chunked `Query` iterator — nothing is collected
/// into memory up front, so a bare-`chrom` region spanning a whole reference streams one record
/// at a time instead of materialising it.
pub struct BamSource {
    // Borrows `header` and `reader` below (lifetime unsafely extended to 'static in `open`, see
    // its safety comment); declared first so it is dropped before the data it borrows.
    query: RecordQuery,
    header: Box<sam::Header>,
    reader: Box<IndexedReader>,
}

impl BamSource {
    /// Opens `path` (with its `.bai`/`.csi` sidecar) and restricts the stream to `region`.
    pub fn open(path: &Path, region: &Region) -> io::Result<BamSource> {
        let mut reader = Box::new(bam::io::indexed_reader::Builder::default().build_from_path(path)?);
        let header = Box::new(reader.read_header()?);

        // SAFETY: `reader` and `header` are heap-allocated via `Box` and owned by the `BamSource`
        // this function returns for exactly as long as `query` (which borrows them) is alive.
        // Moving the returned `BamSource` moves the `Box` handles, not their heap-allocated
        // pointees, so the addresses `query` borrows stay valid. `query` is declared before
        // `reader`/`header` in the struct so it is dropped first.
        let reader_ptr: *mut IndexedReader = &mut *reader;
        let header_ptr: *const sam::Header = &*header;
        let reader_ref: &'static mut IndexedReader = unsafe { &mut *reader_ptr };
        let header_ref: &'static sam::Header = unsafe { &*header_ptr };
        let query = reader_ref.query(header_ref, region)?;

        Ok(BamSource {
            query,
            header,
            reader,
        })
    }
}

impl AlignmentSource for BamSource {
    type Record = BamRecord;

    fn next_record(&mut self) -> Option<io::Result<BamRecord>> {
        loop {
            match self.query.next()? {
                Ok(record) => match adapt(record) {
                    Ok(Some(adapted)) => return Some(Ok(adapted)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Parses a user-facing region string (`chrom` or `chrom:start-end`, 1-based inclusive start,
/// exclusive end) into a [`Region`] plus the 0-based half-open `[start, end)` the core iterator
/// wants, resolved against `header` to find the contig's id and full length.
pub fn resolve_region(
    raw: &str,
    header: &sam::Header,
) -> Result<(Region, usize, usize, usize), crate::error::PileError> {
    let (name, start1, end1) = parse_region_string(raw)?;

    let (ref_id, ref_seq) = header
        .reference_sequences()
        .get_full(name.as_bytes())
        .map(|(idx, _, v)| (idx, v))
        .ok_or_else(|| crate::error::PileError::MissingContig(name.clone()))?;
    let contig_len = usize::from(ref_seq.length());

    let start1 = start1.unwrap_or(1);
    let end1 = end1.unwrap_or(contig_len);

    let start_pos = Position::try_from(start1)
        .map_err(|_| crate::error::PileError::MalformedRegion(raw.to_string()))?;
    let end_pos = Position::try_from(end1.max(start1))
        .map_err(|_| crate::error::PileError::MalformedRegion(raw.to_string()))?;

    let region = Region::new(name, start_pos..=end_pos);
    Ok((region, ref_id, start1 - 1, end1))
}

fn parse_region_string(
    raw: &str,
) -> Result<(String, Option<usize>, Option<usize>), crate::error::PileError> {
    match raw.split_once(':') {
        None => Ok((raw.to_string(), None, None)),
        Some((chrom, range)) => {
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| crate::error::PileError::MalformedRegion(raw.to_string()))?;
            let start: usize = start
                .parse()
                .map_err(|_| crate::error::PileError::MalformedRegion(raw.to_string()))?;
            let end: usize = end
                .parse()
                .map_err(|_| crate::error::PileError::MalformedRegion(raw.to_string()))?;
            Ok((chrom.to_string(), Some(start), Some(end)))
        }
    }
}
