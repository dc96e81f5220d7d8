//! Match search over the reversed ("bottom-up") buffer

/// Longest run that is still emitted as literals
pub const THRESHOLD: usize = 2;
/// Shortest encodable match
pub const MIN_MATCH: usize = THRESHOLD + 1;
/// Longest encodable match, `(1 << 4) + THRESHOLD`
pub const MAX_MATCH: usize = 0x12;
/// Smallest encodable distance
pub const MIN_DIST: usize = 3;
/// Largest encodable distance, `(1 << 12) + 2`
pub const MAX_DIST: usize = 0x1002;

/// A back-reference: copy `len` bytes starting `dist` bytes behind the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub len: usize,
    pub dist: usize,
}

/// One encoding decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Match(Match),
}

/// Find the longest match for `buf[cursor..]`
///
/// Distances are tried in ascending order from [MIN_DIST] up to
/// `min(cursor, window)`, and only a strictly longer match replaces the
/// current one, so among equally long matches the closest one wins. A match
/// never overlaps the cursor (`len <= dist`). The search stops early once
/// `max_len` is reached.
///
/// Returns `None` if nothing longer than [THRESHOLD] was found.
pub fn find_match(buf: &[u8], cursor: usize, window: usize, max_len: usize) -> Option<Match> {
    let max_dist = usize::min(cursor, window);
    let tail = buf.get(cursor..)?;
    let max_len = usize::min(max_len, tail.len());

    let mut best = Match {
        len: THRESHOLD,
        dist: 0,
    };
    for dist in MIN_DIST..=max_dist {
        let limit = usize::min(max_len, dist);
        let len = tail[..limit]
            .iter()
            .zip(buf[cursor - dist..].iter())
            .take_while(|(a, b)| a == b)
            .count();

        if len > best.len {
            best = Match { len, dist };
            if len == max_len {
                break;
            }
        }
    }

    if best.len > THRESHOLD {
        Some(best)
    } else {
        None
    }
}

/// Search with the format's window and length limits
pub fn find_best_match(buf: &[u8], cursor: usize) -> Option<Match> {
    find_match(buf, cursor, MAX_DIST, MAX_MATCH)
}

/// Two-step lookahead used by "best" mode
///
/// Returns true if taking `found` at `cursor` should be abandoned in favour
/// of a literal, because a match starting one byte later covers at least
/// as much as `found` plus whatever follows it.
pub fn lookahead_rejects(buf: &[u8], cursor: usize, found: Match) -> bool {
    if cursor + found.len >= buf.len() {
        return false;
    }

    let len_next = find_best_match(buf, cursor + found.len).map_or(1, |m| m.len);
    let len_post = find_best_match(buf, cursor + 1).map_or(1, |m| m.len);

    found.len + len_next <= 1 + len_post
}
