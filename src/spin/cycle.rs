//! Spin-cycle identification within one worker's event history.
//!
//! Given the sequence of event identities a worker produced since it last
//! received the baton, find the shortest explanation of the form "after
//! `prefix` lead-in events, a block of `period` events repeats": the chosen
//! `(prefix, period)` minimizes `prefix + period`, the repetition must cover
//! the entire tail exactly, and at least two full periods must be present.

/// Bounds of an identified cycle, in indices of the analyzed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBounds {
    /// Number of lead-in events before the first cycle iteration.
    pub prefix: usize,
    /// Length of one cycle iteration, in events.
    pub period: usize,
}

/// Finds the cycle minimizing `prefix + period`, if any.
#[must_use]
pub fn find_cycle(history: &[i32]) -> Option<CycleBounds> {
    let n = history.len();
    // Smallest prefix+period wins; among equal sums, the shortest period.
    for sum in 1..n {
        for period in 1..=sum {
            let prefix = sum - period;
            if n < prefix + 2 * period {
                continue;
            }
            if is_repetition(history, prefix, period) {
                return Some(CycleBounds { prefix, period });
            }
        }
    }
    None
}

/// True when every event from `prefix + period` on equals the event one
/// period earlier (exact repetition up to and including a partial final
/// iteration).
fn is_repetition(history: &[i32], prefix: usize, period: usize) -> bool {
    (prefix + period..history.len()).all(|i| history[i] == history[i - period])
}

/// Maps a cycle found in a filtered view of the history back to bounds in
/// the unfiltered history.
///
/// `keep` selects the events that were retained by the filter. The returned
/// bounds span the unfiltered events between the `prefix`-th and the
/// `prefix + period`-th retained event.
#[must_use]
pub fn map_to_unfiltered(
    history: &[i32],
    keep: impl Fn(i32) -> bool,
    bounds: CycleBounds,
) -> Option<CycleBounds> {
    let mut kept_seen = 0usize;
    let mut start = None;
    let mut end = None;
    for (i, &event) in history.iter().enumerate() {
        if !keep(event) {
            continue;
        }
        if kept_seen == bounds.prefix {
            start = Some(i);
        }
        if kept_seen == bounds.prefix + bounds.period {
            end = Some(i);
            break;
        }
        kept_seen += 1;
    }
    let start = start?;
    let end = end?;
    Some(CycleBounds {
        prefix: start,
        period: end - start,
    })
}
