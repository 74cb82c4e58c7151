pub mod ledger;
pub mod store;

pub use ledger::{CooldownDecision, CooldownLedger, CooldownPeriods};
pub use store::{
    JsonUserStore, MemoryUserStore, RequestAttempt, UserCooldownRecord, UserStore,
};

/// A command-issuing user, as seen at the public boundary.
///
/// Viewers arrive as display names; the ledger keys records by a normalized
/// form (trimmed, ASCII-lowercased) so casing and stray whitespace cannot
/// mint duplicate records. The backing store assigns a durable numeric id on
/// first contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    key: String,
    display_name: String,
}

impl Identity {
    /// Parse a raw display name; returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let display_name = raw.trim();
        if display_name.is_empty() {
            return None;
        }
        Some(Self {
            key: display_name.to_ascii_lowercase(),
            display_name: display_name.to_string(),
        })
    }

    /// Stable ledger key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name as the user typed it
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}
