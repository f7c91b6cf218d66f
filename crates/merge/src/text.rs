//! Line-based three-way text merge
//!
//! The engine diffs each side against the base with a patience-style line
//! diff (unique common lines anchor the match, regions without anchors fall
//! back to whole-block hunks), then walks the base coalescing overlapping
//! hunks from the two sides. Non-overlapping changes merge cleanly;
//! overlapping ones become diff3-style conflict blocks.

/// Result of a textual merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedText {
    /// Merged content, always ending in a newline
    pub content: Vec<u8>,
    /// Whether any conflict markers were emitted
    pub conflicted: bool,
}

/// Binary detection: any NUL byte marks content as binary.
pub fn is_binary(data: &[u8]) -> bool {
    data.contains(&0)
}

/// Three-way merge of `a` and `b` against `base`.
///
/// Conflict blocks are labeled with `label_a` and `label_b` and include the
/// base lines between `|||||||` and `=======`.
pub fn merge_text(
    a: &[u8],
    base: &[u8],
    b: &[u8],
    label_a: &str,
    label_b: &str,
) -> MergedText {
    let a_lines = split_lines(a);
    let base_lines = split_lines(base);
    let b_lines = split_lines(b);
    let hunks_a = diff(&base_lines, &a_lines);
    let hunks_b = diff(&base_lines, &b_lines);

    let mut out: Vec<u8> = Vec::new();
    let mut conflicted = false;
    let mut ia = 0;
    let mut ib = 0;
    // Line-count offset of each side relative to the base, valid between
    // hunks.
    let mut off_a = 0isize;
    let mut off_b = 0isize;
    let mut pos = 0usize;

    loop {
        let next = match (hunks_a.get(ia), hunks_b.get(ib)) {
            (None, None) => {
                push_lines(&mut out, &base_lines[pos..]);
                break;
            }
            (Some(ha), None) => ha.base_lo,
            (None, Some(hb)) => hb.base_lo,
            (Some(ha), Some(hb)) => ha.base_lo.min(hb.base_lo),
        };
        push_lines(&mut out, &base_lines[pos..next]);
        pos = next;

        // Coalesce every hunk from either side that overlaps (or abuts)
        // the growing base region.
        let lo = pos;
        let mut hi = pos;
        let off_a_before = off_a;
        let off_b_before = off_b;
        let mut a_changed = false;
        let mut b_changed = false;
        loop {
            let mut extended = false;
            while let Some(h) = hunks_a.get(ia) {
                if h.base_lo <= hi {
                    hi = hi.max(h.base_hi);
                    off_a += h.side_len() as isize - h.base_len() as isize;
                    a_changed = true;
                    ia += 1;
                    extended = true;
                } else {
                    break;
                }
            }
            while let Some(h) = hunks_b.get(ib) {
                if h.base_lo <= hi {
                    hi = hi.max(h.base_hi);
                    off_b += h.side_len() as isize - h.base_len() as isize;
                    b_changed = true;
                    ib += 1;
                    extended = true;
                } else {
                    break;
                }
            }
            if !extended {
                break;
            }
        }

        let a_lo = (lo as isize + off_a_before) as usize;
        let a_hi = (hi as isize + off_a) as usize;
        let b_lo = (lo as isize + off_b_before) as usize;
        let b_hi = (hi as isize + off_b) as usize;
        let a_slice = &a_lines[a_lo..a_hi];
        let b_slice = &b_lines[b_lo..b_hi];

        match (a_changed, b_changed) {
            (true, false) => push_lines(&mut out, a_slice),
            (false, true) => push_lines(&mut out, b_slice),
            (true, true) if a_slice == b_slice => push_lines(&mut out, a_slice),
            (true, true) => {
                conflicted = true;
                push_line(&mut out, format!("<<<<<<< {}", label_a).as_bytes());
                push_lines(&mut out, a_slice);
                push_line(&mut out, b"|||||||");
                push_lines(&mut out, &base_lines[lo..hi]);
                push_line(&mut out, b"=======");
                push_lines(&mut out, b_slice);
                push_line(&mut out, format!(">>>>>>> {}", label_b).as_bytes());
            }
            (false, false) => unreachable!("region always consumes a hunk"),
        }
        pos = hi;
    }

    if out.is_empty() {
        out.push(b'\n');
    }
    MergedText { content: out, conflicted }
}

fn push_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    out.push(b'\n');
}

fn push_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        push_line(out, line);
    }
}

/// Split into lines without their newline terminators. A trailing newline
/// does not produce an empty final line.
fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
    if let Some(last) = lines.last() {
        if last.is_empty() {
            lines.pop();
        }
    }
    lines
}

/// One changed region: base lines `[base_lo, base_hi)` were replaced by
/// side lines `[side_lo, side_hi)`. Either range may be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hunk {
    base_lo: usize,
    base_hi: usize,
    side_lo: usize,
    side_hi: usize,
}

impl Hunk {
    fn base_len(&self) -> usize {
        self.base_hi - self.base_lo
    }

    fn side_len(&self) -> usize {
        self.side_hi - self.side_lo
    }
}

/// Diff `old` against `new`, returning changed regions in ascending order.
fn diff(old: &[&[u8]], new: &[&[u8]]) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    diff_range(old, new, 0, old.len(), 0, new.len(), &mut hunks);
    hunks
}

fn diff_range(
    old: &[&[u8]],
    new: &[&[u8]],
    mut old_lo: usize,
    mut old_hi: usize,
    mut new_lo: usize,
    mut new_hi: usize,
    out: &mut Vec<Hunk>,
) {
    while old_lo < old_hi && new_lo < new_hi && old[old_lo] == new[new_lo] {
        old_lo += 1;
        new_lo += 1;
    }
    while old_hi > old_lo && new_hi > new_lo && old[old_hi - 1] == new[new_hi - 1] {
        old_hi -= 1;
        new_hi -= 1;
    }
    if old_lo == old_hi && new_lo == new_hi {
        return;
    }
    if old_lo == old_hi || new_lo == new_hi {
        out.push(Hunk { base_lo: old_lo, base_hi: old_hi, side_lo: new_lo, side_hi: new_hi });
        return;
    }

    let anchors = unique_anchors(old, new, old_lo, old_hi, new_lo, new_hi);
    if anchors.is_empty() {
        out.push(Hunk { base_lo: old_lo, base_hi: old_hi, side_lo: new_lo, side_hi: new_hi });
        return;
    }

    let mut prev_old = old_lo;
    let mut prev_new = new_lo;
    for (i, j) in anchors {
        diff_range(old, new, prev_old, i, prev_new, j, out);
        prev_old = i + 1;
        prev_new = j + 1;
    }
    diff_range(old, new, prev_old, old_hi, prev_new, new_hi, out);
}

/// Lines unique within both ranges, paired up and reduced to the longest
/// chain increasing on both sides.
fn unique_anchors(
    old: &[&[u8]],
    new: &[&[u8]],
    old_lo: usize,
    old_hi: usize,
    new_lo: usize,
    new_hi: usize,
) -> Vec<(usize, usize)> {
    use std::collections::HashMap;

    let mut old_seen: HashMap<&[u8], (usize, usize)> = HashMap::new();
    for (i, line) in old[old_lo..old_hi].iter().enumerate() {
        let entry = old_seen.entry(line).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = old_lo + i;
    }
    let mut new_seen: HashMap<&[u8], (usize, usize)> = HashMap::new();
    for (j, line) in new[new_lo..new_hi].iter().enumerate() {
        let entry = new_seen.entry(line).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = new_lo + j;
    }

    let mut pairs: Vec<(usize, usize)> = old_seen
        .iter()
        .filter(|(_, (count, _))| *count == 1)
        .filter_map(|(line, (_, i))| match new_seen.get(line) {
            Some((1, j)) => Some((*i, *j)),
            _ => None,
        })
        .collect();
    pairs.sort_unstable();
    longest_increasing_chain(&pairs)
}

/// Longest subsequence of `pairs` (sorted by first element) whose second
/// elements strictly increase.
fn longest_increasing_chain(pairs: &[(usize, usize)]) -> Vec<(usize, usize)> {
    if pairs.is_empty() {
        return Vec::new();
    }
    // tails[k] = index into pairs of the smallest tail of a chain of
    // length k+1; prev links reconstruct the chain.
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; pairs.len()];
    for (idx, &(_, j)) in pairs.iter().enumerate() {
        let insert_at = tails.partition_point(|&t| pairs[t].1 < j);
        if insert_at > 0 {
            prev[idx] = Some(tails[insert_at - 1]);
        }
        if insert_at == tails.len() {
            tails.push(idx);
        } else {
            tails[insert_at] = idx;
        }
    }
    let mut chain = Vec::new();
    let mut cursor = tails.last().copied();
    while let Some(idx) = cursor {
        chain.push(pairs[idx]);
        cursor = prev[idx];
    }
    chain.reverse();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(lines: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn test_identity_merge() {
        let base = text(&["a", "b", "c"]);
        let merged = merge_text(&base, &base, &base, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, base);
    }

    #[test]
    fn test_disjoint_edits_merge_cleanly() {
        // Base is 1-4,6-9; side A appends 10; side B inserts 5.
        let base = text(&[
            "line 1", "line 2", "line 3", "line 4", "line 6", "line 7", "line 8", "line 9",
        ]);
        let a = text(&[
            "line 1", "line 2", "line 3", "line 4", "line 6", "line 7", "line 8", "line 9",
            "line 10",
        ]);
        let b = text(&[
            "line 1", "line 2", "line 3", "line 4", "line 5", "line 6", "line 7", "line 8",
            "line 9",
        ]);
        let merged = merge_text(&a, &base, &b, "A", "B");
        assert!(!merged.conflicted);
        let expected = text(&[
            "line 1", "line 2", "line 3", "line 4", "line 5", "line 6", "line 7", "line 8",
            "line 9", "line 10",
        ]);
        assert_eq!(merged.content, expected);
    }

    #[test]
    fn test_overlapping_edits_conflict() {
        let base = text(&["line 1", "line 2", "line 3"]);
        let a = text(&["line 1", "line 5", "line 6"]);
        let b = text(&["line 1", "line 8", "line 9"]);
        let merged = merge_text(&a, &base, &b, "side A", "side B");
        assert!(merged.conflicted);
        let expected = text(&[
            "line 1",
            "<<<<<<< side A",
            "line 5",
            "line 6",
            "|||||||",
            "line 2",
            "line 3",
            "=======",
            "line 8",
            "line 9",
            ">>>>>>> side B",
        ]);
        assert_eq!(merged.content, expected);
    }

    #[test]
    fn test_same_change_no_conflict() {
        let base = text(&["a", "b", "c"]);
        let both = text(&["a", "X", "c"]);
        let merged = merge_text(&both, &base, &both, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, both);
    }

    #[test]
    fn test_one_side_only_change() {
        let base = text(&["a", "b", "c"]);
        let a = text(&["a", "B!", "c"]);
        let merged = merge_text(&a, &base, &base, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, a);
    }

    #[test]
    fn test_deletion_merges() {
        let base = text(&["a", "b", "c"]);
        let a = text(&["a", "c"]);
        let b = text(&["a", "b", "c", "d"]);
        let merged = merge_text(&a, &base, &b, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, text(&["a", "c", "d"]));
    }

    #[test]
    fn test_both_insert_identically_at_same_spot() {
        let base = text(&["a", "z"]);
        let side = text(&["a", "mid", "z"]);
        let merged = merge_text(&side, &base, &side, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, side);
    }

    #[test]
    fn test_both_insert_differently_at_same_spot_conflicts() {
        let base = text(&["a", "z"]);
        let a = text(&["a", "from a", "z"]);
        let b = text(&["a", "from b", "z"]);
        let merged = merge_text(&a, &base, &b, "A", "B");
        assert!(merged.conflicted);
        let content = String::from_utf8(merged.content).unwrap();
        assert!(content.contains("<<<<<<< A"));
        assert!(content.contains("from a"));
        assert!(content.contains("from b"));
        assert!(content.contains(">>>>>>> B"));
    }

    #[test]
    fn test_missing_trailing_newline_gets_one() {
        let base = b"a\nb".to_vec();
        let a = b"a\nb".to_vec();
        let b = b"a\nb\nc".to_vec();
        let merged = merge_text(&a, &base, &b, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, b"a\nb\nc\n");
    }

    #[test]
    fn test_empty_result_is_single_newline() {
        let base = text(&["only"]);
        let gone = Vec::new();
        let merged = merge_text(&gone, &base, &gone, "A", "B");
        assert!(!merged.conflicted);
        assert_eq!(merged.content, b"\n");
    }

    #[test]
    fn test_is_binary() {
        assert!(is_binary(b"ab\0cd"));
        assert!(!is_binary(b"plain text\n"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn test_diff_simple_replacement() {
        let old_data = text(&["a", "b", "c"]);
        let new_data = text(&["a", "x", "c"]);
        let old = split_lines(&old_data);
        let new = split_lines(&new_data);
        let hunks = diff(&old, &new);
        assert_eq!(
            hunks,
            vec![Hunk { base_lo: 1, base_hi: 2, side_lo: 1, side_hi: 2 }]
        );
    }

    #[test]
    fn test_diff_with_repeated_lines_falls_back() {
        // No unique common lines between the changed regions; the diff must
        // still cover the change as one hunk.
        let old_data = text(&["x", "x", "x"]);
        let new_data = text(&["x", "y", "x", "x"]);
        let old = split_lines(&old_data);
        let new = split_lines(&new_data);
        let hunks = diff(&old, &new);
        assert_eq!(hunks.len(), 1);
        let h = hunks[0];
        assert_eq!(h.base_len() + 1, h.side_len());
    }

    #[test]
    fn test_longest_increasing_chain() {
        let pairs = vec![(0, 5), (1, 1), (2, 2), (3, 0), (4, 4)];
        let chain = longest_increasing_chain(&pairs);
        assert_eq!(chain, vec![(1, 1), (2, 2), (4, 4)]);
    }

    #[test]
    fn test_split_lines_variants() {
        assert_eq!(split_lines(b"a\nb\n").len(), 2);
        assert_eq!(split_lines(b"a\nb").len(), 2);
        assert_eq!(split_lines(b"").len(), 0);
        assert_eq!(split_lines(b"\n").len(), 1);
        assert_eq!(split_lines(b"\n")[0], b"");
    }
}
