use std::fmt;

/// Dialog handle inside its owning call or subscription
///
/// Freshly initialized dialogs carry [`DialogId::TENTATIVE`]; the engine
/// assigns a positive id when the dialog is attached to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogId(pub i32);

impl DialogId {
    pub const TENTATIVE: DialogId = DialogId(-1);

    pub fn is_tentative(&self) -> bool {
        self.0 <= 0
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dlg{}", self.0)
    }
}
