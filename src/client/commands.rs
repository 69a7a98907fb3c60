//! Optimistic cart mutations as command objects.
//!
//! A command changes the local [`CartState`] immediately and hands back an
//! [`Undo`] that restores exactly what it touched. Nothing here talks to a
//! backend.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{CartLine, CartLineView, LineKey, LineProduct, combined_quantity},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalLine {
    #[serde(flatten)]
    pub view: CartLineView,
    /// A remote call touching this line is outstanding.
    pub pending: bool,
}

impl LocalLine {
    pub fn key(&self) -> LineKey {
        self.view.key()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartState {
    pub cart_id: Option<Uuid>,
    pub lines: Vec<LocalLine>,
    /// Bumped whenever the owner changes so late confirmations are ignored.
    pub generation: u64,
}

impl CartState {
    fn position(&self, key: LineKey) -> Option<usize> {
        self.lines.iter().position(|l| l.key() == key)
    }

    pub fn line(&self, key: LineKey) -> Option<&LocalLine> {
        self.lines.iter().find(|l| l.key() == key)
    }

    pub fn line_by_id(&self, line_id: Uuid) -> Option<&LocalLine> {
        self.lines.iter().find(|l| l.view.id == line_id)
    }

    pub fn views(&self) -> Vec<CartLineView> {
        self.lines.iter().map(|l| l.view.clone()).collect()
    }

    pub fn replace_lines(&mut self, lines: Vec<CartLineView>) {
        self.lines = lines
            .into_iter()
            .map(|view| LocalLine {
                view,
                pending: false,
            })
            .collect();
    }

    /// Adopts the server's id and quantity for a line after a successful call.
    pub fn confirm(&mut self, line: &CartLine) {
        if let Some(local) = self.lines.iter_mut().find(|l| l.key() == line.key()) {
            local.view.id = line.id;
            local.view.quantity = line.quantity;
            local.pending = false;
        }
    }

    pub fn confirm_removed(&mut self, key: LineKey) {
        self.lines.retain(|l| l.key() != key);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartCommand {
    AddLine {
        key: LineKey,
        quantity: i32,
        product: LineProduct,
    },
    SetQuantity {
        key: LineKey,
        quantity: i32,
    },
    RemoveLine {
        key: LineKey,
    },
    Clear,
}

#[derive(Debug)]
enum UndoKind {
    /// The line did not exist before the command.
    Inserted(LineKey),
    /// The line existed at this position with this content.
    Restore(usize, LocalLine),
    Lines(Vec<LocalLine>),
    Nothing,
}

#[must_use = "an unused Undo cannot roll the command back"]
#[derive(Debug)]
pub struct Undo(UndoKind);

impl CartCommand {
    pub fn validate(&self) -> AppResult<()> {
        match self {
            CartCommand::AddLine { quantity, .. } if *quantity <= 0 => Err(AppError::validation(
                "quantity must be greater than 0",
            )),
            _ => Ok(()),
        }
    }

    pub fn key(&self) -> Option<LineKey> {
        match self {
            CartCommand::AddLine { key, .. }
            | CartCommand::SetQuantity { key, .. }
            | CartCommand::RemoveLine { key } => Some(*key),
            CartCommand::Clear => None,
        }
    }

    /// Fails only when an add would push a line past the quantity range; the
    /// state is untouched in that case.
    pub fn apply(&self, state: &mut CartState) -> AppResult<Undo> {
        let undo = match self {
            CartCommand::AddLine {
                key,
                quantity,
                product,
            } => match state.position(*key) {
                Some(idx) => {
                    let before = state.lines[idx].clone();
                    let line = &mut state.lines[idx];
                    line.view.quantity = combined_quantity(line.view.quantity, *quantity)?;
                    line.pending = true;
                    Undo(UndoKind::Restore(idx, before))
                }
                None => {
                    state.lines.push(LocalLine {
                        view: CartLineView {
                            // Placeholder until the server assigns the real id.
                            id: Uuid::new_v4(),
                            product_id: key.product_id,
                            variant_id: key.variant_id,
                            quantity: *quantity,
                            product: product.clone(),
                        },
                        pending: true,
                    });
                    Undo(UndoKind::Inserted(*key))
                }
            },
            CartCommand::SetQuantity { key, quantity } if *quantity <= 0 => {
                return CartCommand::RemoveLine { key: *key }.apply(state);
            }
            CartCommand::SetQuantity { key, quantity } => match state.position(*key) {
                Some(idx) => {
                    let before = state.lines[idx].clone();
                    let line = &mut state.lines[idx];
                    line.view.quantity = *quantity;
                    line.pending = true;
                    Undo(UndoKind::Restore(idx, before))
                }
                None => Undo(UndoKind::Nothing),
            },
            CartCommand::RemoveLine { key } => match state.position(*key) {
                Some(idx) => {
                    let before = state.lines.remove(idx);
                    Undo(UndoKind::Restore(idx, before))
                }
                None => Undo(UndoKind::Nothing),
            },
            CartCommand::Clear => Undo(UndoKind::Lines(std::mem::take(&mut state.lines))),
        };
        Ok(undo)
    }
}

impl Undo {
    pub fn rollback(self, state: &mut CartState) {
        match self.0 {
            UndoKind::Inserted(key) => state.lines.retain(|l| l.key() != key),
            UndoKind::Restore(idx, before) => match state.position(before.key()) {
                Some(current) => state.lines[current] = before,
                None => {
                    let idx = idx.min(state.lines.len());
                    state.lines.insert(idx, before);
                }
            },
            UndoKind::Lines(before) => {
                // Lines added after the clear stay; cleared ones come back in
                // their original order.
                let added = std::mem::take(&mut state.lines);
                state.lines = before;
                for line in added {
                    if state.position(line.key()).is_none() {
                        state.lines.push(line);
                    }
                }
            }
            UndoKind::Nothing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LineKey {
        LineKey::new(Uuid::new_v4(), None)
    }

    fn state_with(key: LineKey, quantity: i32) -> CartState {
        let mut state = CartState::default();
        state.replace_lines(vec![CartLineView {
            id: Uuid::new_v4(),
            product_id: key.product_id,
            variant_id: key.variant_id,
            quantity,
            product: LineProduct {
                name: "Ferris Mug".into(),
                unit_price: 120_000,
                image_url: None,
            },
        }]);
        state
    }

    #[test]
    fn add_increments_existing_line_and_rolls_back() {
        let k = key();
        let mut state = state_with(k, 2);
        let original = state.clone();

        let undo = CartCommand::AddLine {
            key: k,
            quantity: 3,
            product: LineProduct::default(),
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.lines.len(), 1);
        assert_eq!(state.lines[0].view.quantity, 5);
        assert!(state.lines[0].pending);

        undo.rollback(&mut state);
        assert_eq!(state, original);
    }

    #[test]
    fn add_of_new_key_inserts_placeholder() {
        let mut state = CartState::default();
        let k = key();
        let undo = CartCommand::AddLine {
            key: k,
            quantity: 1,
            product: LineProduct::default(),
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.line(k).map(|l| l.view.quantity), Some(1));

        undo.rollback(&mut state);
        assert!(state.lines.is_empty());
    }

    #[test]
    fn zero_quantity_add_is_invalid() {
        let cmd = CartCommand::AddLine {
            key: key(),
            quantity: 0,
            product: LineProduct::default(),
        };
        assert!(matches!(cmd.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn add_past_quantity_range_leaves_state_untouched() {
        let k = key();
        let mut state = state_with(k, i32::MAX);
        let original = state.clone();

        let result = CartCommand::AddLine {
            key: k,
            quantity: 1,
            product: LineProduct::default(),
        }
        .apply(&mut state);
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(state, original);
    }

    #[test]
    fn set_to_zero_behaves_like_remove() {
        let k = key();
        let mut a = state_with(k, 4);
        let mut b = a.clone();

        let undo_a = CartCommand::SetQuantity { key: k, quantity: 0 }
            .apply(&mut a)
            .unwrap();
        let _undo_b = CartCommand::RemoveLine { key: k }.apply(&mut b).unwrap();
        assert_eq!(a, b);
        assert!(a.line(k).is_none());

        undo_a.rollback(&mut a);
        assert_eq!(a.line(k).map(|l| l.view.quantity), Some(4));
    }

    #[test]
    fn remove_rollback_restores_position() {
        let first = key();
        let mut state = state_with(first, 1);
        let second = key();
        let _ = CartCommand::AddLine {
            key: second,
            quantity: 1,
            product: LineProduct::default(),
        }
        .apply(&mut state)
        .unwrap();

        let undo = CartCommand::RemoveLine { key: first }
            .apply(&mut state)
            .unwrap();
        assert_eq!(state.lines.len(), 1);
        undo.rollback(&mut state);
        assert_eq!(state.lines[0].key(), first);
        assert_eq!(state.lines[1].key(), second);
    }

    #[test]
    fn clear_rollback_keeps_lines_added_meanwhile() {
        let old = key();
        let mut state = state_with(old, 2);
        let undo = CartCommand::Clear.apply(&mut state).unwrap();
        assert!(state.lines.is_empty());

        let new = key();
        let _ = CartCommand::AddLine {
            key: new,
            quantity: 1,
            product: LineProduct::default(),
        }
        .apply(&mut state)
        .unwrap();

        undo.rollback(&mut state);
        let keys: Vec<_> = state.lines.iter().map(LocalLine::key).collect();
        assert_eq!(keys, vec![old, new]);
    }

    #[test]
    fn confirm_adopts_server_identity() {
        let k = key();
        let mut state = CartState::default();
        let _ = CartCommand::AddLine {
            key: k,
            quantity: 2,
            product: LineProduct::default(),
        }
        .apply(&mut state)
        .unwrap();

        let server = CartLine {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: k.product_id,
            variant_id: None,
            quantity: 7,
            created_at: chrono::Utc::now(),
        };
        state.confirm(&server);
        let line = state.line(k).unwrap();
        assert_eq!(line.view.id, server.id);
        assert_eq!(line.view.quantity, 7);
        assert!(!line.pending);
    }
}
