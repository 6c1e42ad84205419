// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! Parses the `SA:Z` supplementary-alignment tag: one or more comma-separated 6-tuples
//! (`chrom,pos,strand,cigar,mapq,nm`) joined by `;`, describing other placements of a split read.

use crate::cigar;
use crate::misc::quit_with_error;

/// One parsed entry from an `SA:Z` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaTag {
    pub chrom: String,
    /// 0-based.
    pub pos: usize,
    pub strand: i8,
    pub cigar: String,
    pub mapq: u8,
    pub nm: u16,
}

impl SaTag {
    /// The reference end of this supplementary alignment: `pos + sum(ref-consuming op lengths)`.
    /// A malformed CIGAR degrades to `pos` (matching the distilled spec's "logged and degrades"
    /// contract, minus the logging since `End()` is a pure query here and the caller already saw
    /// the raw CIGAR string if it wants to report the problem).
    pub fn end(&self) -> usize {
        match cigar::parse(&self.cigar) {
            Ok(ops) => {
                self.pos
                    + ops
                        .iter()
                        .filter(|op| op.kind.consumes_reference())
                        .map(|op| op.len)
                        .sum::<usize>()
            }
            Err(_) => self.pos,
        }
    }
}

/// Parses every `;`-separated tuple in a raw `SA:Z` tag value. A leading `SA:Z:` prefix and a
/// trailing `;` are permitted and stripped. Malformed numeric fields are fatal, matching the
/// distilled spec ("Malformed numeric fields are fatal").
pub fn parse_tag(raw: &str) -> Vec<SaTag> {
    let mut s = raw;
    if let Some(stripped) = s.strip_prefix("SA:Z:") {
        s = stripped;
    }
    if let Some(stripped) = s.strip_suffix(';') {
        s = stripped;
    }
    s.split(';').map(parse_one).collect()
}

/// Parses a single `chrom,pos,strand,cigar,mapq,nm` tuple.
fn parse_one(entry: &str) -> SaTag {
    let parts: Vec<&str> = entry.splitn(6, ',').collect();
    if parts.len() != 6 {
        quit_with_error(&format!("malformed SA tag entry: {:?}", entry));
    }

    let pos = parts[1]
        .parse::<usize>()
        .unwrap_or_else(|_| quit_with_error(&format!("bad SA position in {:?}", entry)));
    let strand = if parts[2].starts_with('-') { -1 } else { 1 };
    let mapq = parts[4]
        .parse::<u8>()
        .unwrap_or_else(|_| quit_with_error(&format!("bad SA mapq in {:?}", entry)));
    let nm = parts[5]
        .parse::<u16>()
        .unwrap_or_else(|_| quit_with_error(&format!("bad SA NM in {:?}", entry)));

    SaTag {
        chrom: parts[0].to_string(),
        pos: pos - 1,
        strand,
        cigar: parts[3].to_string(),
        mapq,
        nm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let tags = parse_tag("7,70999871,+,117S83M50S,42,8");
        assert_eq!(tags.len(), 1);
        let sa = &tags[0];
        assert_eq!(sa.chrom, "7");
        assert_eq!(sa.pos, 70999870);
        assert_eq!(sa.strand, 1);
        assert_eq!(sa.cigar, "117S83M50S");
        assert_eq!(sa.mapq, 42);
        assert_eq!(sa.nm, 8);
        assert_eq!(sa.end(), 70999870 + 83);
    }

    #[test]
    fn test_parse_with_prefix_and_trailing_semicolon() {
        let tags = parse_tag("SA:Z:7,70999871,+,117S83M50S,42,8;");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].chrom, "7");
    }

    #[test]
    fn test_parse_multiple() {
        let tags = parse_tag("1,100,+,10M,60,0;2,200,-,5S10M,30,1");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].chrom, "1");
        assert_eq!(tags[1].chrom, "2");
        assert_eq!(tags[1].strand, -1);
        assert_eq!(tags[1].end(), 200 - 1 + 10);
    }

    #[test]
    fn test_end_degrades_on_bad_cigar() {
        let sa = SaTag {
            chrom: "1".to_string(),
            pos: 42,
            strand: 1,
            cigar: "nonsense".to_string(),
            mapq: 10,
            nm: 0,
        };
        assert_eq!(sa.end(), 42);
    }
}
