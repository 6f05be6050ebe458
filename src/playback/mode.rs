//! Play-mode switching

use log::info;

use crate::subtitles::model::PlayMode;

/// Result of a mode change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: PlayMode,
    pub to: PlayMode,
}

impl ModeTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Leaving fast-forward must put the playback rate back to 1
    pub fn resets_playback_rate(&self) -> bool {
        self.from == PlayMode::FastForward && self.to != PlayMode::FastForward
    }
}

/// Keeps exactly one play mode active
#[derive(Debug, Default)]
pub struct PlayModeManager {
    mode: PlayMode,
}

impl PlayModeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Force `mode`, as when the peer reports its mode
    pub fn set(&mut self, mode: PlayMode) -> ModeTransition {
        let transition = ModeTransition {
            from: self.mode,
            to: mode,
        };
        self.mode = mode;
        if transition.changed() {
            info!("PlayMode: {} -> {}", transition.from, transition.to);
        }
        transition
    }

    /// Key-binding semantics: toggling the active mode goes back to normal,
    /// toggling another one replaces it
    pub fn toggle(&mut self, mode: PlayMode) -> ModeTransition {
        let target = if mode == self.mode { PlayMode::Normal } else { mode };
        self.set(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_same_mode_returns_to_normal() {
        let mut modes = PlayModeManager::new();
        assert_eq!(modes.toggle(PlayMode::Condensed).to, PlayMode::Condensed);
        assert_eq!(modes.toggle(PlayMode::Condensed).to, PlayMode::Normal);
        assert_eq!(modes.mode(), PlayMode::Normal);
    }

    #[test]
    fn test_modes_are_exclusive() {
        let mut modes = PlayModeManager::new();
        modes.toggle(PlayMode::AutoPause);
        let transition = modes.toggle(PlayMode::Repeat);

        assert_eq!(transition.from, PlayMode::AutoPause);
        assert_eq!(modes.mode(), PlayMode::Repeat);
    }

    #[test]
    fn test_leaving_fast_forward_resets_rate() {
        let mut modes = PlayModeManager::new();
        assert!(!modes.toggle(PlayMode::FastForward).resets_playback_rate());
        assert!(modes.toggle(PlayMode::Condensed).resets_playback_rate());
        assert!(!modes.set(PlayMode::Condensed).changed());
    }
}
