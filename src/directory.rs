use std::collections::HashMap;

use crate::{account::CardNumber, registry::HolderId};

/// Maps card numbers to the holder whose registry issued them.
///
/// The ledger only needs this capability; a real deployment would back it
/// with the card issuing system.
pub trait CardDirectory {
    /// Returns the holder previously linked to the card, if any.
    fn link(&mut self, card_number: CardNumber, holder_id: HolderId) -> Option<HolderId>;

    fn unlink(&mut self, card_number: &str) -> Option<HolderId>;

    fn holder_of(&self, card_number: &str) -> Option<HolderId>;
}

#[derive(Debug, Default)]
pub struct InMemoryCardDirectory {
    cards: HashMap<CardNumber, HolderId>,
}

impl CardDirectory for InMemoryCardDirectory {
    fn link(&mut self, card_number: CardNumber, holder_id: HolderId) -> Option<HolderId> {
        self.cards.insert(card_number, holder_id)
    }

    fn unlink(&mut self, card_number: &str) -> Option<HolderId> {
        self.cards.remove(card_number)
    }

    fn holder_of(&self, card_number: &str) -> Option<HolderId> {
        self.cards.get(card_number).cloned()
    }
}
