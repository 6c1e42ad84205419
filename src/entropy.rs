// Copyright 2021 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Polypolish

// This file is part of Polypolish. Polypolish is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Polypolish
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Polypolish. If not, see <http://www.gnu.org/licenses/>.

//! Shannon entropy and mode over small integer multisets, used to summarise how a read's mate
//! alignments are scattered across chromosomes.

/// Number of buckets used to fold reference ids into a fixed-size histogram. Reference ids in a
/// typical genome are small (well under this), so collisions in practice only bite assemblies
/// with an unusually large number of contigs/chromosomes.
const BUCKETS: usize = 92;

/// Returns a value in `[0, 1]`: 0 when every element is equal, approaching 1 as the elements
/// become more evenly spread across distinct values.
pub fn entropy(xs: &[i32]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    if xs.len() == 2 {
        return if xs[0] == xs[1] { 0.0 } else { 0.630_929_753_571_457_5 };
    }
    if xs.len() == 3 && xs[0] == xs[1] && xs[0] == xs[2] {
        return 0.0;
    }

    let mut counts = [0u32; BUCKETS];
    for &v in xs {
        counts[v.rem_euclid(BUCKETS as i32) as usize] += 1;
    }

    let n = xs.len() as f64;
    let mut k = 0usize;
    let mut s = 0.0f64;
    for &c in counts.iter() {
        if c != 0 {
            k += 1;
            let p = c as f64 / n;
            s += p * p.ln();
        }
    }
    -s / ((k + 1) as f64).ln()
}

/// Returns `(value, count)` of the most frequent element. Ties resolve to the first maximal run
/// encountered after sorting.
pub fn mode(xs: &[i32]) -> (i32, usize) {
    if xs.is_empty() {
        return (0, 0);
    }
    let mut sorted = xs.to_vec();
    sorted.sort_unstable();

    let mut value = sorted[0];
    let mut best_value = value;
    let mut best_count = 1usize;
    let mut current = 0usize;

    for &v in &sorted {
        if v == value {
            current += 1;
        } else {
            if current > best_count {
                best_count = current;
                best_value = value;
            }
            value = v;
            current = 1;
        }
    }
    if current > best_count {
        best_value = value;
        best_count = current;
    }
    (best_value, best_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_short_circuits() {
        assert_eq!(entropy(&[]), 0.0);
        assert_eq!(entropy(&[7]), 0.0);
        assert_eq!(entropy(&[1, 1]), 0.0);
        assert_eq!(entropy(&[1, 2]), 0.630_929_753_571_457_5);
        assert_eq!(entropy(&[5, 5, 5]), 0.0);
    }

    #[test]
    fn test_entropy_bounds() {
        let distinct: Vec<i32> = (1..=11).collect();
        assert!(entropy(&distinct) > 0.9);
        let same = vec![1; 13];
        assert!(entropy(&same) < 0.01);
    }

    #[test]
    fn test_entropy_range() {
        let xs = vec![1, 2, 3, 1, 2, 1, 4, 4, 4, 4];
        let e = entropy(&xs);
        assert!((0.0..=1.0).contains(&e));
    }

    #[test]
    fn test_mode() {
        let mut xs = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];
        assert_eq!(mode(&xs), (1, 8));
        xs = vec![];
        assert_eq!(mode(&xs), (0, 0));
        xs = vec![3];
        assert_eq!(mode(&xs), (3, 1));
    }

    #[test]
    fn test_mode_respects_k_bound() {
        let xs = vec![1, 1, 2, 2, 2, 3];
        let (_, count) = mode(&xs);
        let k = 3; // distinct values
        let min_expected = (xs.len() as f64 / k as f64).ceil() as usize;
        assert!(count >= min_expected);
    }
}
