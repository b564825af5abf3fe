//! Record keys and their canonical string form

use std::fmt::Debug;
use uuid::Uuid;

/// A record key that can be embedded in a global ID
///
/// The canonical form is what goes on the wire and what the batching cache
/// keys its entries by, so two keys are the same record exactly when their
/// canonical forms are equal.
pub trait NodeKey: Debug + Clone + Send + Sync + 'static {
    /// Render the key in its canonical, fixed string form
    fn to_canonical(&self) -> String;

    /// Parse a canonical string back into a key
    ///
    /// Returns `None` for anything that is not a valid key of this type.
    fn from_canonical(s: &str) -> Option<Self>;
}

/// UUIDs use the 32-character lowercase hex ("simple") form.
impl NodeKey for Uuid {
    fn to_canonical(&self) -> String {
        self.simple().to_string()
    }

    fn from_canonical(s: &str) -> Option<Self> {
        Uuid::try_parse(s).ok()
    }
}

impl NodeKey for String {
    fn to_canonical(&self) -> String {
        self.clone()
    }

    fn from_canonical(s: &str) -> Option<Self> {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    }
}

impl NodeKey for i64 {
    fn to_canonical(&self) -> String {
        self.to_string()
    }

    fn from_canonical(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl NodeKey for u64 {
    fn to_canonical(&self) -> String {
        self.to_string()
    }

    fn from_canonical(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}
