// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

use thiserror::Error;

/// Errors surfaced by the sliding iterator and its collaborators. The pile aggregator itself
/// never returns one of these: it silently drops alignments that fail filters.
#[derive(Error, Debug)]
pub enum PileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed SA tag: {0}")]
    MalformedSa(String),

    #[error("malformed region {0:?}: expected \"chrom\" or \"chrom:start-end\"")]
    MalformedRegion(String),

    #[error("unknown reference contig {0:?}")]
    MissingContig(String),

    #[error("cursor queried at non-increasing position {pos} (previous query was {previous})")]
    NonMonotonicQuery { pos: usize, previous: usize },
}
