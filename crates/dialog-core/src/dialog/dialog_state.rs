use std::fmt;

/// Dialog lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DialogState {
    /// Allocated, nothing learned yet
    #[default]
    Empty,
    /// Established by a provisional response carrying a To tag
    Early,
    /// Established by a 2xx (or a dialog-creating request)
    Confirmed,
    /// A BYE is in progress
    Closing,
    Terminated,
}

impl DialogState {
    pub fn is_established(&self) -> bool {
        matches!(self, DialogState::Early | DialogState::Confirmed)
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
