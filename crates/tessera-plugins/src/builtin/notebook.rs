//! Markdown notebook.

use serde_json::{Value, json};

use tessera_core::CardRecord;

use super::SurfaceKind;

/// Template for new notes in a fresh notebook.
pub const DEFAULT_NOTE_STRUCTURE: &str = "# Title

**Date:** YYYY-MM-DD

## Summary
A brief overview of the note.

## Details
Expand on the topic with relevant information.

## To-Do / Action Items
- [ ] Task 1
- [ ] Task 2

## References / Links
- [Example Link](https://example.com)
";

const DEFAULT_FONT_SIZE: u64 = 17;

pub(super) struct Notebook;

impl SurfaceKind for Notebook {
    const LABEL: &'static str = "notebook";

    fn initial(&self, card: &CardRecord) -> Value {
        json!({
            "id": card.id,
            "name": card.name,
            "notes": [],
            "last": null,
            "fontSize": DEFAULT_FONT_SIZE,
            "structure": DEFAULT_NOTE_STRUCTURE,
        })
    }
}
