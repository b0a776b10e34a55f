//! User prompts the library needs answered: confirmations, notices, choices.
//!
//! The filter module must ask before discarding an active filter, and the
//! replicate action must ask which overwrite mode to use. Those questions go
//! through [`Interaction`] so the library stays free of any terminal or GUI
//! code. The CLI answers on stdin; tests answer from a script.

/// How a replicate action treats images that already carry markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicateMode {
    /// Copy only onto images without markers.
    OnlyEmpty,
    /// Overwrite the markers of every other image.
    OverwriteAll,
}

impl ReplicateMode {
    pub fn only_empty(self) -> bool {
        matches!(self, ReplicateMode::OnlyEmpty)
    }
}

/// Answers questions on behalf of the user.
pub trait Interaction {
    /// Ask a yes/no question. `false` aborts the requested action.
    fn confirm(&mut self, message: &str) -> bool;

    /// Show a notice that needs no answer.
    fn notify(&mut self, message: &str) {
        let _ = message;
    }

    /// Pick a replicate mode. `None` cancels the replication.
    fn choose_replicate_mode(&mut self) -> Option<ReplicateMode> {
        if self.confirm("Replicate only onto images without lines? (no = overwrite all)") {
            Some(ReplicateMode::OnlyEmpty)
        } else {
            Some(ReplicateMode::OverwriteAll)
        }
    }
}

/// Answers every confirmation with a fixed value and picks a fixed mode.
///
/// Useful for non-interactive runs (`--yes`) and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoAnswer {
    pub confirm: bool,
    pub mode: ReplicateMode,
}

impl AutoAnswer {
    pub fn yes() -> Self {
        Self {
            confirm: true,
            mode: ReplicateMode::OnlyEmpty,
        }
    }

    pub fn no() -> Self {
        Self {
            confirm: false,
            mode: ReplicateMode::OnlyEmpty,
        }
    }
}

impl Interaction for AutoAnswer {
    fn confirm(&mut self, _message: &str) -> bool {
        self.confirm
    }

    fn choose_replicate_mode(&mut self) -> Option<ReplicateMode> {
        Some(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(bool);

    impl Interaction for Always {
        fn confirm(&mut self, _message: &str) -> bool {
            self.0
        }
    }

    #[test]
    fn default_choice_maps_confirmation_to_mode() {
        assert_eq!(Always(true).choose_replicate_mode(), Some(ReplicateMode::OnlyEmpty));
        assert_eq!(Always(false).choose_replicate_mode(), Some(ReplicateMode::OverwriteAll));
    }

    #[test]
    fn auto_answer_uses_configured_mode() {
        let mut a = AutoAnswer {
            confirm: false,
            mode: ReplicateMode::OverwriteAll,
        };
        assert!(!a.confirm("?"));
        assert_eq!(a.choose_replicate_mode(), Some(ReplicateMode::OverwriteAll));
        assert!(!ReplicateMode::OverwriteAll.only_empty());
    }
}
