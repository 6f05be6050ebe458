//! Time-indexed subtitle queries
//!
//! The collection is immutable: offset or track changes build a new one.
//! Subtitles are kept sorted by start time together with a running maximum
//! of end times, so a query costs a binary search plus a short backward scan
//! bounded by the longest subtitle.

use once_cell::sync::Lazy;
use std::sync::Arc;

use super::model::Subtitle;

static EMPTY: Lazy<Arc<SubtitleCollection>> =
    Lazy::new(|| Arc::new(SubtitleCollection::new(Vec::new(), SubtitleCollectionOptions::default())));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtitleCollectionOptions {
    /// Report the most recently ended subtitles while nothing is showing
    pub return_last_shown: bool,
    /// Report the nearest upcoming subtitles while nothing is showing
    pub return_next_to_show: bool,
    /// Enables `started_showing`/`will_stop_showing` detection
    pub showing_check_radius_ms: Option<i64>,
}

/// Result of querying the collection at one timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleSlice {
    /// Subtitles on screen, ordered by track then start
    pub showing: Vec<Subtitle>,
    pub last_shown: Option<Vec<Subtitle>>,
    pub next_to_show: Option<Vec<Subtitle>>,
    /// A showing subtitle that began less than the check radius ago
    pub started_showing: Option<Subtitle>,
    /// A showing subtitle that ends within the check radius
    pub will_stop_showing: Option<Subtitle>,
}

impl SubtitleSlice {
    /// First upcoming subtitle, if any
    pub fn next(&self) -> Option<&Subtitle> {
        self.next_to_show.as_ref().and_then(|next| next.first())
    }
}

#[derive(Debug)]
pub struct SubtitleCollection {
    /// Sorted by start; sentinel and zero-length entries removed
    subtitles: Vec<Subtitle>,
    /// `max_end[i]` is the largest end among `subtitles[..=i]`
    max_end: Vec<i64>,
    /// Longest subtitle duration, bounds the backward scan
    max_length: i64,
    options: SubtitleCollectionOptions,
}

impl SubtitleCollection {
    /// Build a collection from intervals of one or more tracks
    ///
    /// Intervals within one track are expected not to overlap; this is not
    /// re-validated.
    pub fn new(subtitles: Vec<Subtitle>, options: SubtitleCollectionOptions) -> Self {
        let mut subtitles: Vec<Subtitle> = subtitles
            .into_iter()
            .filter(|s| !s.is_sentinel() && s.start < s.end)
            .collect();
        subtitles.sort_by_key(|s| (s.start, s.track));

        let mut running = i64::MIN;
        let max_end = subtitles
            .iter()
            .map(|s| {
                running = running.max(s.end);
                running
            })
            .collect();
        let max_length = subtitles.iter().map(|s| s.end - s.start).max().unwrap_or(0);

        Self {
            subtitles,
            max_end,
            max_length,
            options,
        }
    }

    /// Shared collection with no subtitles; every query returns an empty slice
    pub fn empty() -> Arc<SubtitleCollection> {
        Arc::clone(&EMPTY)
    }

    pub fn subtitles(&self) -> &[Subtitle] {
        &self.subtitles
    }

    pub fn len(&self) -> usize {
        self.subtitles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtitles.is_empty()
    }

    pub fn options(&self) -> SubtitleCollectionOptions {
        self.options
    }

    pub fn subtitles_at(&self, timestamp: i64) -> SubtitleSlice {
        let mut slice = SubtitleSlice::default();

        // Every subtitle that could be showing or has ended lies before `upper`
        let upper = self.subtitles.partition_point(|s| s.start <= timestamp);
        slice.showing = self.scan_back(upper, timestamp, |s| s.contains(timestamp));
        slice.showing.sort_by_key(|s| (s.track, s.start));

        if slice.showing.is_empty() {
            // Nothing has started yet in the leading gap, so there is no last shown entry
            if self.options.return_last_shown && upper > 0 {
                let last_end = self.max_end[upper - 1];
                let last = self.scan_back(upper, last_end, |s| s.end == last_end);
                if !last.is_empty() {
                    slice.last_shown = Some(last);
                }
            }

            if self.options.return_next_to_show && upper < self.subtitles.len() {
                let next_start = self.subtitles[upper].start;
                let next: Vec<Subtitle> = self.subtitles[upper..]
                    .iter()
                    .take_while(|s| s.start == next_start)
                    .cloned()
                    .collect();
                slice.next_to_show = Some(next);
            }
        } else if let Some(radius) = self.options.showing_check_radius_ms {
            for s in &slice.showing {
                if slice.will_stop_showing.is_none() && s.end <= timestamp + radius {
                    slice.will_stop_showing = Some(s.clone());
                }

                if slice.started_showing.is_none() && timestamp - radius < s.start {
                    slice.started_showing = Some(s.clone());
                }

                if slice.started_showing.is_some() && slice.will_stop_showing.is_some() {
                    break;
                }
            }
        }

        slice
    }

    /// Collect matches among `subtitles[..upper]` that may still reach `reach`
    fn scan_back<F>(&self, upper: usize, reach: i64, matches: F) -> Vec<Subtitle>
    where
        F: Fn(&Subtitle) -> bool,
    {
        let mut found = Vec::new();

        for s in self.subtitles[..upper].iter().rev() {
            if s.start + self.max_length < reach {
                break;
            }

            if matches(s) {
                found.push(s.clone());
            }
        }

        found.reverse();
        found
    }
}
