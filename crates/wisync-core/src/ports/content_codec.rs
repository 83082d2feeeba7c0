//! Content codec port
//!
//! The engine does not know the note format. It needs to render a note from
//! remote fields, compare two notes while ignoring volatile markers, and pull
//! structured field updates back out of an edited note.

use crate::domain::FieldUpdates;
use crate::ports::work_item_client::RemoteItem;

/// Port trait for note (de)serialization
///
/// Implementations are pure and synchronous.
pub trait IContentCodec: Send + Sync {
    /// Renders the note text for a freshly fetched remote item
    fn render(&self, item: &RemoteItem) -> String;

    /// Normalizes a note for drift comparison
    ///
    /// Must strip volatile fields such as sync timestamps so that two notes
    /// differing only in those fields compare equal.
    fn normalize(&self, text: &str) -> String;

    /// Extracts the field updates a note body asks for
    fn extract_field_updates(&self, text: &str) -> anyhow::Result<FieldUpdates>;

    /// Returns true if the two notes have the same normalized content
    fn same_content(&self, a: &str, b: &str) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}
