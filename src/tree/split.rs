//! Node split strategies (§4.5).
//!
//! Each strategy takes the `M+1` entries of an overflowing node (already
//! including the entry that triggered the overflow) and partitions them
//! into two groups, each respecting the node's `min_entries` floor. Hilbert
//! R-tree nodes never reach these: their entries stay lhv-sorted and split
//! positionally (see `tree::mod::RTree::split`).

use itertools::Itertools;

use crate::config::SplitStrategy;
use crate::geometry::{union_all, BBox};
use crate::page::Entry;

/// Splits `entries` (length `M+1`) into two non-empty groups, each with at
/// least `min_entries`, per the configured strategy.
pub fn split_entries(entries: Vec<Entry>, strategy: SplitStrategy, min_entries: usize, dims: usize) -> (Vec<Entry>, Vec<Entry>) {
    match strategy {
        SplitStrategy::Exponential => exponential_split(entries, min_entries),
        SplitStrategy::Quadratic => quadratic_split(entries, min_entries),
        SplitStrategy::Linear => linear_split(entries, min_entries, dims),
        SplitStrategy::Greene => greene_split(entries, min_entries, dims),
        SplitStrategy::AngTan => ang_tan_split(entries, min_entries, dims),
        SplitStrategy::RStar => rstar_split(entries, min_entries, dims),
    }
}

fn bbox_of<'a>(entries: impl Iterator<Item = &'a Entry>) -> BBox {
    union_all(entries.map(|e| &e.bbox)).expect("split group must be non-empty")
}

/// Upper bound only: enumerates every size-valid bipartition and keeps the
/// one with least total area.
fn exponential_split(entries: Vec<Entry>, min_entries: usize) -> (Vec<Entry>, Vec<Entry>) {
    let n = entries.len();
    let mut best: Option<(f64, Vec<usize>)> = None;
    for k in min_entries..=(n - min_entries) {
        for combo in (0..n).combinations(k) {
            let a: Vec<usize> = combo;
            let a_set: std::collections::HashSet<usize> = a.iter().copied().collect();
            let area_a = bbox_of(a.iter().map(|&i| &entries[i])).area();
            let area_b = bbox_of((0..n).filter(|i| !a_set.contains(i)).map(|i| &entries[i])).area();
            let total = area_a + area_b;
            if best.as_ref().map(|(b, _)| total < *b).unwrap_or(true) {
                best = Some((total, a));
            }
        }
    }
    let a_idx: std::collections::HashSet<usize> = best.unwrap().1.into_iter().collect();
    partition_by_index(entries, &a_idx)
}

fn partition_by_index(entries: Vec<Entry>, a_idx: &std::collections::HashSet<usize>) -> (Vec<Entry>, Vec<Entry>) {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for (i, e) in entries.into_iter().enumerate() {
        if a_idx.contains(&i) {
            a.push(e);
        } else {
            b.push(e);
        }
    }
    (a, b)
}

fn quadratic_pick_seeds(entries: &[Entry]) -> (usize, usize) {
    let n = entries.len();
    let mut best = (0usize, 1usize, f64::NEG_INFINITY);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = entries[i].bbox.union(&entries[j].bbox).area() - entries[i].bbox.area() - entries[j].bbox.area();
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    (best.0, best.1)
}

fn quadratic_split(entries: Vec<Entry>, min_entries: usize) -> (Vec<Entry>, Vec<Entry>) {
    let n = entries.len();
    let (seed_a, seed_b) = quadratic_pick_seeds(&entries);
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];
    let mut bbox_a = entries[seed_a].bbox.clone();
    let mut bbox_b = entries[seed_b].bbox.clone();
    let mut remaining: Vec<usize> = (0..n).filter(|&i| i != seed_a && i != seed_b).collect();

    while !remaining.is_empty() {
        if group_a.len() + remaining.len() == min_entries {
            group_a.extend(remaining.drain(..));
            break;
        }
        if group_b.len() + remaining.len() == min_entries {
            group_b.extend(remaining.drain(..));
            break;
        }
        let (pick_pos, to_a) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let enl_a = BBox::required_expansion_area(&entries[i].bbox, &bbox_a);
                let enl_b = BBox::required_expansion_area(&entries[i].bbox, &bbox_b);
                (pos, (enl_a - enl_b).abs(), enl_a, enl_b)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(pos, _, enl_a, enl_b)| {
                let to_a = enl_a < enl_b
                    || (enl_a == enl_b && bbox_a.area() < bbox_b.area())
                    || (enl_a == enl_b && bbox_a.area() == bbox_b.area() && group_a.len() <= group_b.len());
                (pos, to_a)
            })
            .unwrap();
        let idx = remaining.remove(pick_pos);
        if to_a {
            bbox_a.increment_union(&entries[idx].bbox);
            group_a.push(idx);
        } else {
            bbox_b.increment_union(&entries[idx].bbox);
            group_b.push(idx);
        }
    }
    let a_set: std::collections::HashSet<usize> = group_a.into_iter().collect();
    partition_by_index(entries, &a_set)
}

/// Greatest normalized separation along any axis: for each dim, the
/// highest-low minus lowest-high, divided by the group's overall extent.
fn greatest_separation(entries: &[Entry], dims: usize) -> (usize, usize, usize) {
    let mut best = (0usize, 0usize, 1usize, f64::NEG_INFINITY);
    for d in 0..dims {
        let (hi_low_idx, _) = entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.bbox.min[d].partial_cmp(&b.bbox.min[d]).unwrap())
            .unwrap();
        let (lo_high_idx, _) = entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.bbox.max[d].partial_cmp(&b.bbox.max[d]).unwrap())
            .unwrap();
        let overall_min = entries.iter().map(|e| e.bbox.min[d]).fold(f64::INFINITY, f64::min);
        let overall_max = entries.iter().map(|e| e.bbox.max[d]).fold(f64::NEG_INFINITY, f64::max);
        let extent = (overall_max - overall_min).max(1e-9);
        let separation = (entries[hi_low_idx].bbox.min[d] - entries[lo_high_idx].bbox.max[d]) / extent;
        if separation > best.3 {
            best = (d, hi_low_idx, lo_high_idx, separation);
        }
    }
    (best.0, best.1, best.2)
}

fn linear_split(entries: Vec<Entry>, min_entries: usize, dims: usize) -> (Vec<Entry>, Vec<Entry>) {
    let (_, seed_a, seed_b) = greatest_separation(&entries, dims);
    let (seed_a, seed_b) = if seed_a != seed_b { (seed_a, seed_b) } else { (0, entries.len() - 1) };
    let n = entries.len();
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];
    let mut bbox_a = entries[seed_a].bbox.clone();
    let mut bbox_b = entries[seed_b].bbox.clone();
    for i in 0..n {
        if i == seed_a || i == seed_b {
            continue;
        }
        let enl_a = BBox::required_expansion_area(&entries[i].bbox, &bbox_a);
        let enl_b = BBox::required_expansion_area(&entries[i].bbox, &bbox_b);
        if enl_a < enl_b {
            bbox_a.increment_union(&entries[i].bbox);
            group_a.push(i);
        } else {
            bbox_b.increment_union(&entries[i].bbox);
            group_b.push(i);
        }
    }
    enforce_min(&mut group_a, &mut group_b, min_entries);
    let a_set: std::collections::HashSet<usize> = group_a.into_iter().collect();
    partition_by_index(entries, &a_set)
}

/// Hard under-flow rule shared by Linear/Greene: if one side dipped below
/// `min_entries`, move entries back from the other side until it doesn't.
fn enforce_min(group_a: &mut Vec<usize>, group_b: &mut Vec<usize>, min_entries: usize) {
    while group_a.len() < min_entries && group_b.len() > min_entries {
        group_a.push(group_b.pop().unwrap());
    }
    while group_b.len() < min_entries && group_a.len() > min_entries {
        group_b.push(group_a.pop().unwrap());
    }
}

fn greene_split(entries: Vec<Entry>, min_entries: usize, dims: usize) -> (Vec<Entry>, Vec<Entry>) {
    let (axis, _, _) = greatest_separation(&entries, dims);
    let n = entries.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| entries[a].bbox.min[axis].partial_cmp(&entries[b].bbox.min[axis]).unwrap());
    let mid = n / 2;
    let mut group_a: Vec<usize> = order[..mid].to_vec();
    let mut group_b: Vec<usize> = order[mid..].to_vec();
    if n % 2 != 0 {
        // odd entry currently in group_b's front; decide by least enlargement
        let odd = group_b.remove(0);
        let bbox_a = bbox_of(group_a.iter().map(|&i| &entries[i]));
        let bbox_b = bbox_of(group_b.iter().map(|&i| &entries[i]));
        let enl_a = BBox::required_expansion_area(&entries[odd].bbox, &bbox_a);
        let enl_b = BBox::required_expansion_area(&entries[odd].bbox, &bbox_b);
        if enl_a <= enl_b {
            group_a.push(odd);
        } else {
            group_b.insert(0, odd);
        }
    }
    enforce_min(&mut group_a, &mut group_b, min_entries);
    let a_set: std::collections::HashSet<usize> = group_a.into_iter().collect();
    partition_by_index(entries, &a_set)
}

/// Classifies each entry by which side of the overall center it falls
/// closer to on each axis, then splits on whichever axis produces the more
/// balanced two-sided classification; ties broken by total overlap, then
/// total coverage area.
fn ang_tan_split(entries: Vec<Entry>, min_entries: usize, dims: usize) -> (Vec<Entry>, Vec<Entry>) {
    let whole = bbox_of(entries.iter());
    let center = whole.center();
    let mut best_axis = 0usize;
    let mut best_score = (usize::MAX, f64::INFINITY, f64::INFINITY);
    for d in 0..dims {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (i, e) in entries.iter().enumerate() {
            if e.bbox.center()[d] <= center[d] {
                left.push(i);
            } else {
                right.push(i);
            }
        }
        let max_side = left.len().max(right.len());
        if left.is_empty() || right.is_empty() {
            continue;
        }
        let bbox_l = bbox_of(left.iter().map(|&i| &entries[i]));
        let bbox_r = bbox_of(right.iter().map(|&i| &entries[i]));
        let overlap = bbox_l.overlap_area(&bbox_r);
        let coverage = bbox_l.area() + bbox_r.area();
        let score = (max_side, overlap, coverage);
        if score < best_score {
            best_score = score;
            best_axis = d;
        }
    }
    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    for (i, e) in entries.iter().enumerate() {
        if e.bbox.center()[best_axis] <= center[best_axis] {
            group_a.push(i);
        } else {
            group_b.push(i);
        }
    }
    if group_a.is_empty() || group_b.is_empty() {
        // degenerate classification (all entries on one side): fall back to Greene.
        return greene_split(entries, min_entries, dims);
    }
    enforce_min(&mut group_a, &mut group_b, min_entries);
    let a_set: std::collections::HashSet<usize> = group_a.into_iter().collect();
    partition_by_index(entries, &a_set)
}

/// R*-tree's ChooseSplitAxis + ChooseSplitIndex: for each axis, sort by
/// lower and by upper bound, sum the margins of the `M-2m+2` valid
/// distributions; the axis with minimum summed margin wins, then on that
/// axis the distribution with minimum overlap (tie: minimum area) is used.
fn rstar_split(entries: Vec<Entry>, min_entries: usize, dims: usize) -> (Vec<Entry>, Vec<Entry>) {
    let n = entries.len();
    let mut best_axis = 0usize;
    let mut best_margin_sum = f64::INFINITY;
    let mut orders: Vec<Vec<usize>> = Vec::new();

    for d in 0..dims {
        for key in 0..2 {
            let mut order: Vec<usize> = (0..n).collect();
            if key == 0 {
                order.sort_by(|&a, &b| entries[a].bbox.min[d].partial_cmp(&entries[b].bbox.min[d]).unwrap());
            } else {
                order.sort_by(|&a, &b| entries[a].bbox.max[d].partial_cmp(&entries[b].bbox.max[d]).unwrap());
            }
            let mut margin_sum = 0.0;
            for k in min_entries..=(n - min_entries) {
                let bbox_a = bbox_of(order[..k].iter().map(|&i| &entries[i]));
                let bbox_b = bbox_of(order[k..].iter().map(|&i| &entries[i]));
                margin_sum += bbox_a.margin() + bbox_b.margin();
            }
            if margin_sum < best_margin_sum {
                best_margin_sum = margin_sum;
                best_axis = d;
            }
            orders.push(order);
        }
    }

    let mut best_overlap = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    let mut best_k = min_entries;
    let mut best_order = &orders[best_axis * 2];
    for key in 0..2 {
        let order = &orders[best_axis * 2 + key];
        for k in min_entries..=(n - min_entries) {
            let bbox_a = bbox_of(order[..k].iter().map(|&i| &entries[i]));
            let bbox_b = bbox_of(order[k..].iter().map(|&i| &entries[i]));
            let overlap = bbox_a.overlap_area(&bbox_b);
            let area = bbox_a.area() + bbox_b.area();
            if overlap < best_overlap || (overlap == best_overlap && area < best_area) {
                best_overlap = overlap;
                best_area = area;
                best_k = k;
                best_order = order;
            }
        }
    }
    let a_set: std::collections::HashSet<usize> = best_order[..best_k].iter().copied().collect();
    partition_by_index(entries, &a_set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: i32, min: [f64; 2], max: [f64; 2]) -> Entry {
        Entry::new(id, BBox::new(min.to_vec(), max.to_vec()))
    }

    fn sample() -> Vec<Entry> {
        vec![
            e(1, [0.0, 0.0], [1.0, 1.0]),
            e(2, [2.0, 2.0], [3.0, 3.0]),
            e(3, [4.0, 4.0], [5.0, 5.0]),
            e(4, [6.0, 6.0], [7.0, 7.0]),
            e(5, [8.0, 8.0], [9.0, 9.0]),
        ]
    }

    #[test]
    fn quadratic_split_respects_minimum_group_size() {
        let (a, b) = split_entries(sample(), SplitStrategy::Quadratic, 2, 2);
        assert!(a.len() >= 2 && b.len() >= 2);
        assert_eq!(a.len() + b.len(), 5);
    }

    #[test]
    fn rstar_split_respects_minimum_group_size() {
        let (a, b) = split_entries(sample(), SplitStrategy::RStar, 2, 2);
        assert!(a.len() >= 2 && b.len() >= 2);
        assert_eq!(a.len() + b.len(), 5);
    }

    #[test]
    fn exponential_split_minimizes_total_area() {
        let (a, b) = split_entries(sample(), SplitStrategy::Exponential, 2, 2);
        assert_eq!(a.len() + b.len(), 5);
        assert!(a.len() >= 2 && b.len() >= 2);
    }

    #[test]
    fn greene_split_balances_group_sizes() {
        let (a, b) = split_entries(sample(), SplitStrategy::Greene, 2, 2);
        assert!((a.len() as i64 - b.len() as i64).abs() <= 1);
    }
}
