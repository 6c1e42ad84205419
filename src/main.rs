// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

mod bam_source;
mod cigar;
mod cursor;
mod entropy;
mod error;
mod format;
mod iterator;
mod log;
mod misc;
mod pile;
mod record;
mod reference;
mod sa;

use std::path::PathBuf;
use std::time::Instant;

use clap::{crate_version, Parser};
use num_format::{Locale, ToFormattedString};

use crate::pile::Options;
use crate::reference::ReferenceSource;

#[derive(Parser)]
#[clap(name = "bigly",
       version = concat!("v", crate_version!()),
       about = "per-base pileup summaries from indexed alignments\ngithub.com/rrwick/bigly",
       before_help = concat!(r#"  _     _       _       "#, "\n",
                             r#" | |__ (_) __ _| |_   _ "#, "\n",
                             r#" | '_ \| |/ _` | | | | |"#, "\n",
                             r#" | |_) | | (_| | | |_| |"#, "\n",
                             r#" |_.__/|_|\__, |_|\__, |"#, "\n",
                             r#"          |___/   |___/ "#))]
struct Cli {
    /// Indexed BAM file (.bai or .csi sidecar required)
    bam_path: PathBuf,

    /// Region to pile up: "chrom" or "chrom:start-end" (1-based inclusive start, exclusive end)
    region: String,

    /// Indexed FASTA reference (.fai sidecar required); omit for no reference-derived fields
    #[clap(short = 'r', long = "reference")]
    reference: Option<PathBuf>,

    /// Base quality threshold
    #[clap(short = 'q', long = "min-base-quality", default_value = "10")]
    min_base_quality: u8,

    /// Mapping quality threshold
    #[clap(short = 'Q', long = "min-mapping-quality", default_value = "5")]
    min_mapping_quality: u8,

    /// SAM flag bits that exclude a read when any are set
    #[clap(short = 'F', long = "exclude-flag", default_value = "1540")]
    exclude_flag: u16,

    /// SAM flag bits that must all be set for a read to be counted
    #[clap(short = 'f', long = "include-flag", default_value = "0")]
    include_flag: u16,

    /// Only count H/S clips of at least this length
    #[clap(short = 'c', long = "min-clip-length", default_value = "15")]
    min_clip_length: usize,

    /// Output each base and base quality score
    #[clap(short = 'b', long = "include-bases")]
    include_bases: bool,

    /// 0: only count split reads; 1: count and single most frequent; 2: all SAs; 3: all SAs, unabbreviated
    #[clap(short = 's', long = "splitter-verbosity", default_value = "0")]
    splitter_verbosity: u8,

    /// Distance beyond which mates are called discordant
    #[clap(short = 'o', long = "concordant-cutoff", default_value = "10000")]
    concordant_cutoff: i64,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            min_base_quality: self.min_base_quality,
            min_mapping_quality: self.min_mapping_quality,
            exclude_flag: self.exclude_flag,
            include_flag: self.include_flag,
            min_clip_length: self.min_clip_length,
            include_bases: self.include_bases,
            splitter_verbosity: self.splitter_verbosity,
            concordant_cutoff: self.concordant_cutoff,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    misc::check_if_file_exists(&cli.bam_path);
    if let Some(reference) = &cli.reference {
        misc::check_if_file_exists(reference);
    }

    let start_time = Instant::now();
    starting_message(&cli);

    let header = match noodles::bam::io::indexed_reader::Builder::default()
        .build_from_path(&cli.bam_path)
        .and_then(|mut reader| reader.read_header())
    {
        Ok(header) => header,
        Err(e) => misc::quit_with_error(&format!("failed to read BAM header: {}", e)),
    };

    let (region, _ref_id, start, end) =
        match bam_source::resolve_region(&cli.region, &header) {
            Ok(resolved) => resolved,
            Err(e) => misc::quit_with_error(&format!("{}", e)),
        };

    let source = match bam_source::BamSource::open(&cli.bam_path, &region) {
        Ok(source) => source,
        Err(e) => misc::quit_with_error(&format!("failed to query BAM: {}", e)),
    };

    let reference: Option<Box<dyn ReferenceSource>> = match &cli.reference {
        Some(path) => match reference::FastaReference::open(path) {
            Ok(r) => Some(Box::new(r)),
            Err(e) => misc::quit_with_error(&format!("failed to open reference: {}", e)),
        },
        None => None,
    };

    let chrom = region.name().to_string();
    let mut rows = 0u64;
    let options = cli.options();

    let mut piles = match iterator::PileIterator::new(source, chrom, start, end, options.clone(), reference)
    {
        Ok(piles) => piles,
        Err(e) => misc::quit_with_error(&format!("{}", e)),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    use std::io::Write;
    for pile in &mut piles {
        if writeln!(out, "{}", format::format_pile(&pile, &options)).is_err() {
            break;
        }
        rows += 1;
    }

    if let Some(e) = piles.error() {
        misc::quit_with_error(&format!("{}", e));
    }

    finished_message(rows, start_time);
}

fn starting_message(cli: &Cli) {
    log::section_header("Starting bigly");
    log::explanation(
        "bigly computes per-base pileup summaries (depth, mismatches, split-read and pair \
         concordance evidence, and optional reference GC/complexity context) from an indexed \
         alignment file over a single region.",
    );
    eprintln!("bigly version: {}", crate_version!());
    eprintln!();
    eprintln!("Input alignments:");
    eprintln!("  {}", cli.bam_path.display());
    eprintln!();
    eprintln!("Region: {}", cli.region);
    eprintln!();
    match &cli.reference {
        Some(path) => eprintln!("Reference: {}", path.display()),
        None => eprintln!("Reference: none (gc/duplicity fields will be zero)"),
    }
    eprintln!();
    eprintln!("Settings:");
    eprintln!("  --min-base-quality {}", cli.min_base_quality);
    eprintln!("  --min-mapping-quality {}", cli.min_mapping_quality);
    eprintln!("  --exclude-flag {}", cli.exclude_flag);
    eprintln!("  --include-flag {}", cli.include_flag);
    eprintln!("  --min-clip-length {}", cli.min_clip_length);
    eprintln!("  --include-bases {}", cli.include_bases);
    eprintln!("  --splitter-verbosity {}", cli.splitter_verbosity);
    eprintln!("  --concordant-cutoff {}", cli.concordant_cutoff);
    eprintln!();
}

fn finished_message(rows: u64, start_time: Instant) {
    log::section_header("Finished!");
    eprintln!(
        "Piles written (to stdout): {}",
        rows.to_formatted_string(&Locale::en)
    );
    eprintln!();
    eprintln!("Time to run: {}", misc::format_duration(start_time.elapsed()));
    eprintln!();
}
