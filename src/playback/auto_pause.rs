use crate::subtitles::model::Subtitle;

/// Remembers which boundaries were already acted on
///
/// Consecutive polls near one boundary report the same subtitle several
/// times; only the first report per subtitle counts. Cleared on every seek so
/// that revisiting a line fires again.
#[derive(Debug, Default)]
pub struct AutoPauseContext {
    last_started: Option<usize>,
    last_will_stop: Option<usize>,
}

impl AutoPauseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time `subtitle` is reported as starting
    pub fn started_showing(&mut self, subtitle: &Subtitle) -> bool {
        if self.last_started == Some(subtitle.index) {
            return false;
        }
        self.last_started = Some(subtitle.index);
        true
    }

    /// `true` the first time `subtitle` is reported as about to end
    pub fn will_stop_showing(&mut self, subtitle: &Subtitle) -> bool {
        if self.last_will_stop == Some(subtitle.index) {
            return false;
        }
        self.last_will_stop = Some(subtitle.index);
        true
    }

    pub fn clear(&mut self) {
        self.last_started = None;
        self.last_will_stop = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::collection::{SubtitleCollection, SubtitleCollectionOptions};

    #[test]
    fn test_one_event_per_boundary() {
        let collection = SubtitleCollection::new(
            vec![Subtitle::new("a", 1000, 2000, 0)],
            SubtitleCollectionOptions {
                showing_check_radius_ms: Some(100),
                ..Default::default()
            },
        );
        let mut context = AutoPauseContext::new();

        let mut started = 0;
        for t in (950..=1050).step_by(10) {
            if let Some(s) = collection.subtitles_at(t).started_showing {
                started += context.started_showing(&s) as usize;
            }
        }

        let mut stopping = 0;
        for t in (1900..=2050).step_by(10) {
            if let Some(s) = collection.subtitles_at(t).will_stop_showing {
                stopping += context.will_stop_showing(&s) as usize;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(stopping, 1);
    }

    #[test]
    fn test_clear_rearms() {
        let mut context = AutoPauseContext::new();
        let subtitle = Subtitle::new("a", 0, 10, 0);

        assert!(context.will_stop_showing(&subtitle));
        assert!(!context.will_stop_showing(&subtitle));
        context.clear();
        assert!(context.will_stop_showing(&subtitle));
    }
}
