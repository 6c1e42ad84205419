// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! Renders a [`Pile`] as one tab-delimited output line.

use crate::entropy::mode;
use crate::pile::{mean_insert_size, Options, Pile};

/// Formats `pile` as the tab-delimited line described by the output contract, using `options`
/// only for its `splitter_verbosity`.
pub fn format_pile(pile: &Pile, options: &Options) -> String {
    let orientation_sum = pile.orientation_plus_plus
        + pile.orientation_minus_plus
        + pile.orientation_minus_minus
        + pile.orientation_splitter;

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}\t{:.2}\t{:.2}\t{}",
        pile.chrom,
        pile.pos + 1,
        pile.depth,
        pile.ref_base as char,
        pile.mismatches,
        pile.proper_pairs,
        pile.soft_starts,
        pile.soft_ends,
        pile.hard_starts,
        pile.hard_ends,
        pile.insertion_starts,
        pile.insertion_ends,
        pile.deletions,
        pile.splitters,
        pile.splitters1,
        mean_insert_size(&pile.insert_size_lps),
        mean_insert_size(&pile.insert_size_rms),
        orientation_sum,
        pile.discordant,
        pile.discordant_chrom,
        pile.discordant_chrom_entropy,
        pile.gc65,
        pile.gc257,
        pile.duplicity65,
        pile.duplicity257,
        splitter_field(pile, options.splitter_verbosity),
    )
}

fn splitter_field(pile: &Pile, verbosity: u8) -> String {
    if verbosity == 0 || pile.splitter_positions.is_empty() {
        return String::new();
    }

    if verbosity == 1 {
        let starts: Vec<i32> = pile
            .splitter_positions
            .iter()
            .map(|p| p.start as i32)
            .collect();
        let (mode_start, mode_count) = mode(&starts);
        return format!(
            "{}/{}/{}",
            mode_start,
            mode_count,
            pile.splitter_positions.len()
        );
    }

    pile.splitter_positions
        .iter()
        .map(|p| {
            if verbosity == 2 && p.chrom == pile.chrom {
                if p.start < pile.pos {
                    p.end.to_string()
                } else {
                    (p.start + 1).to_string()
                }
            } else {
                format!("{}:{}-{}", p.chrom, p.start + 1, p.end)
            }
        })
        .collect::<Vec<String>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pile::Position;

    fn base_pile() -> Pile {
        let mut pile = Pile::new("chr1".to_string(), 99);
        pile.ref_base = b'A';
        pile.depth = 3;
        pile
    }

    #[test]
    fn test_basic_fields_and_one_based_position() {
        let pile = base_pile();
        let options = Options::default();
        let line = format_pile(&pile, &options);
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], "chr1");
        assert_eq!(fields[1], "100");
        assert_eq!(fields[2], "3");
        assert_eq!(fields[3], "A");
    }

    #[test]
    fn test_splitter_field_empty_below_verbosity_one() {
        let mut pile = base_pile();
        pile.splitter_positions.push(Position {
            chrom: "chr1".to_string(),
            start: 10,
            end: 20,
            strand: 1,
        });
        assert_eq!(splitter_field(&pile, 0), "");
    }

    #[test]
    fn test_splitter_field_verbosity_one_reports_mode() {
        let mut pile = base_pile();
        pile.splitter_positions.push(Position {
            chrom: "chr2".to_string(),
            start: 10,
            end: 20,
            strand: 1,
        });
        pile.splitter_positions.push(Position {
            chrom: "chr2".to_string(),
            start: 10,
            end: 20,
            strand: 1,
        });
        assert_eq!(splitter_field(&pile, 1), "10/2/2");
    }

    #[test]
    fn test_splitter_field_verbosity_two_collapses_same_chrom() {
        let mut pile = base_pile(); // pile.pos = 99, pile.chrom = "chr1"
        pile.splitter_positions.push(Position {
            chrom: "chr1".to_string(),
            start: 10, // to the left of pile.pos
            end: 20,
            strand: 1,
        });
        pile.splitter_positions.push(Position {
            chrom: "chr2".to_string(),
            start: 200,
            end: 250,
            strand: -1,
        });
        assert_eq!(splitter_field(&pile, 2), "20,chr2:201-250");
    }

    #[test]
    fn test_splitter_field_verbosity_three_never_collapses() {
        let mut pile = base_pile();
        pile.splitter_positions.push(Position {
            chrom: "chr1".to_string(),
            start: 10,
            end: 20,
            strand: 1,
        });
        assert_eq!(splitter_field(&pile, 3), "chr1:11-20");
    }
}
