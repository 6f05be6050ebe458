//! Context extraction around a mined subtitle

use super::model::Subtitle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Subtitles around `subtitles[index]`, used as card context
///
/// Walks outward from `index` in both directions and stops once at least
/// `count_radius` neighbours were taken on that side and the next neighbour
/// starts `time_radius` ms or more away from the mined subtitle.
pub fn surrounding_subtitles(
    subtitles: &[Subtitle],
    index: usize,
    count_radius: usize,
    time_radius: i64,
) -> Vec<Subtitle> {
    if index >= subtitles.len() {
        return Vec::new();
    }

    let mut start = index;
    for i in (0..=index).rev() {
        start = i;
        if at_boundary(subtitles, i, index, count_radius, time_radius, Direction::Backward) {
            break;
        }
    }

    let mut end = index;
    for i in index..subtitles.len() {
        end = i;
        if at_boundary(subtitles, i, index, count_radius, time_radius, Direction::Forward) {
            break;
        }
    }

    subtitles[start..=end].to_vec()
}

fn at_boundary(
    subtitles: &[Subtitle],
    i: usize,
    initial: usize,
    count_radius: usize,
    time_radius: i64,
    direction: Direction,
) -> bool {
    let next = match direction {
        Direction::Forward => subtitles.get(i + 1),
        Direction::Backward => i.checked_sub(1).and_then(|prev| subtitles.get(prev)),
    };

    i.abs_diff(initial) >= count_radius
        && next.is_none_or(|n| (n.start - subtitles[initial].start).abs() >= time_radius)
}

/// Context for a card mined with no subtitle loaded
///
/// Pads `middle` with empty intervals of up to `time_radius` ms on each side,
/// staying within `[0, max_timestamp]`.
pub fn mock_surrounding_subtitles(middle: &Subtitle, max_timestamp: i64, time_radius: i64) -> Vec<Subtitle> {
    let offset = middle.offset();
    let filler = |start: i64, end: i64| Subtitle {
        text: String::new(),
        start,
        end,
        original_start: start - offset,
        original_end: end - offset,
        track: middle.track,
        index: middle.index,
    };

    let mut subtitles = Vec::with_capacity(3);
    if middle.start > 0 {
        subtitles.push(filler((middle.start - time_radius).max(0), middle.start));
    }

    subtitles.push(middle.clone());

    if middle.end < max_timestamp {
        subtitles.push(filler(middle.end, max_timestamp.min(middle.end + time_radius)));
    }

    subtitles
}

/// Playable length in ms: the longer of the media and the latest subtitle end
///
/// `use_offset` selects the offset-adjusted end over the parse-time end.
/// Tracks may interleave, so every entry is considered, not only the last.
pub fn track_length(duration_ms: f64, subtitles: &[Subtitle], use_offset: bool) -> f64 {
    let subtitles_length = subtitles
        .iter()
        .map(|s| if use_offset { s.end } else { s.original_end })
        .max()
        .unwrap_or(0);

    duration_ms.max(subtitles_length as f64)
}
