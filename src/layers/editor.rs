//! In-place edits of a built layer stack
//!
//! Recolor only re-renders one raster. Reorder and merge change which
//! layers sit in front of which, so they rebuild every stacked mask from
//! the original masks. Rejected edits leave the stack untouched.

use super::history::{History, Snapshot};
use super::merge_flow::{MergeSession, MergeState, Selection};
use super::stack::{Layer, LayerStack};
use crate::error::EditError;

impl LayerStack {
    fn check_index(&self, index: usize) -> Result<(), EditError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(EditError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    /// `order` must name every current layer exactly once
    fn check_order(&self, order: &[usize]) -> Result<(), EditError> {
        let len = self.len();
        let mut seen = vec![false; len];
        let valid = order.len() == len
            && order
                .iter()
                .all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
        if valid {
            Ok(())
        } else {
            Err(EditError::InvalidOrder {
                order: order.to_vec(),
                len,
            })
        }
    }

    fn check_merge(&self, first: usize, second: usize) -> Result<(), EditError> {
        if first == second {
            return Err(EditError::SameLayer(first));
        }
        self.check_index(first)?;
        self.check_index(second)
    }

    /// Change the display color of layer `index` and re-render only it
    pub fn recolor(&mut self, index: usize, color: impl Into<String>) -> Result<(), EditError> {
        self.check_index(index)?;
        let layer = &mut self.layers_mut()[index];
        layer.set_color(color.into());
        layer.render();
        tracing::debug!(layer = index, color = %layer.color(), "Layer recolored");
        Ok(())
    }

    /// Rearrange layers so that new position `i` holds old layer `order[i]`
    pub fn reorder(&mut self, order: &[usize]) -> Result<(), EditError> {
        self.check_order(order)?;

        let mut slots: Vec<Option<Layer>> =
            std::mem::take(self.layers_mut()).into_iter().map(Some).collect();
        *self.layers_mut() = order.iter().filter_map(|&i| slots[i].take()).collect();
        self.recompute();

        tracing::debug!(order = ?order, "Layers reordered");
        Ok(())
    }

    /// Merge layers `first` and `second` into one at the lower of the two
    /// positions, keeping the color of `first`. Returns the merged position.
    pub fn merge(&mut self, first: usize, second: usize) -> Result<usize, EditError> {
        self.check_merge(first, second)?;

        let at = first.min(second);
        let mut kept = Vec::with_capacity(self.len() - 1);
        let mut survivor = None;
        let mut absorbed = None;

        for (i, layer) in std::mem::take(self.layers_mut()).into_iter().enumerate() {
            if i == first {
                survivor = Some(layer.into_parts());
            } else if i == second {
                absorbed = Some(layer.into_parts().1);
            } else {
                kept.push(layer);
            }
        }

        if let (Some((color, mask)), Some(other)) = (survivor, absorbed) {
            kept.insert(at, Layer::new(color, mask.union(&other)));
        }
        *self.layers_mut() = kept;
        self.recompute();

        tracing::debug!(first, second, at, layers = self.len(), "Layers merged");
        Ok(at)
    }
}

/// A layer stack under interactive editing, with undo/redo and a guided
/// merge session
#[derive(Debug)]
pub struct LayerStackEditor {
    stack: LayerStack,
    history: History,
    merge: MergeSession,
}

impl LayerStackEditor {
    pub fn new(stack: LayerStack) -> Self {
        Self {
            stack,
            history: History::new(),
            merge: MergeSession::new(),
        }
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Snapshot the stack once `check` accepts the edit, then apply it
    fn apply<T>(
        &mut self,
        check: impl FnOnce(&LayerStack) -> Result<(), EditError>,
        edit: impl FnOnce(&mut LayerStack) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        if let Err(e) = check(&self.stack) {
            tracing::debug!(error = %e, "Layer edit rejected");
            return Err(e);
        }
        self.history.record(Snapshot::of(&self.stack));
        edit(&mut self.stack)
    }

    pub fn recolor(&mut self, index: usize, color: impl Into<String>) -> Result<(), EditError> {
        let color = color.into();
        self.apply(
            |stack| stack.check_index(index),
            |stack| stack.recolor(index, color),
        )
    }

    pub fn reorder(&mut self, order: &[usize]) -> Result<(), EditError> {
        self.apply(
            |stack| stack.check_order(order),
            |stack| stack.reorder(order),
        )
    }

    pub fn merge(&mut self, first: usize, second: usize) -> Result<usize, EditError> {
        self.apply(
            |stack| stack.check_merge(first, second),
            |stack| stack.merge(first, second),
        )
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(&self.stack) {
            Some(previous) => {
                self.stack = previous;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(&self.stack) {
            Some(next) => {
                self.stack = next;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn merge_state(&self) -> MergeState {
        self.merge.state()
    }

    /// Begin a guided merge
    pub fn start_merge(&mut self) {
        self.merge.start();
    }

    /// Leave the guided merge without changing the stack
    pub fn cancel_merge(&mut self) {
        self.merge.cancel();
    }

    /// Select a layer for the guided merge; the second distinct selection
    /// performs the merge with the first selection's color
    pub fn select_layer(&mut self, index: usize) -> Result<Selection, EditError> {
        let selection = self.merge.select_layer(index, self.stack.len());
        if let Selection::Complete { first, second } = selection {
            self.merge(first, second)?;
        }
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::PixelMask;

    fn sample_stack() -> LayerStack {
        // 4x1 canvas, one pixel per layer plus an empty base
        LayerStack::from_layers(
            4,
            1,
            vec![
                Layer::new("#FF0000", PixelMask::from_pixels(4, 1, [0])),
                Layer::new("#00FF00", PixelMask::from_pixels(4, 1, [1])),
                Layer::new("#0000FF", PixelMask::from_pixels(4, 1, [2])),
                Layer::new("#FFFFFF", PixelMask::from_pixels(4, 1, [3])),
            ],
        )
    }

    #[test]
    fn test_recolor_touches_one_raster() {
        let mut stack = sample_stack();
        let before = stack.clone();
        stack.recolor(1, "#123456").unwrap();

        assert_eq!(stack.get(1).unwrap().color(), "#123456");
        assert_ne!(
            stack.get(1).unwrap().raster().as_raw(),
            before.get(1).unwrap().raster().as_raw()
        );
        for i in [0, 2, 3] {
            assert_eq!(
                stack.get(i).unwrap().raster().as_raw(),
                before.get(i).unwrap().raster().as_raw()
            );
        }
        for (a, b) in stack.iter().zip(before.iter()) {
            assert_eq!(a.stacked_mask(), b.stacked_mask());
            assert_eq!(a.coverage(), b.coverage());
        }
    }

    #[test]
    fn test_recolor_out_of_range() {
        let mut stack = sample_stack();
        assert_eq!(
            stack.recolor(9, "#000000"),
            Err(EditError::IndexOutOfRange { index: 9, len: 4 })
        );
    }

    #[test]
    fn test_reorder_rejects_bad_permutations() {
        let mut stack = sample_stack();
        assert!(stack.reorder(&[0, 1, 2]).is_err());
        assert!(stack.reorder(&[0, 0, 1, 2]).is_err());
        assert!(stack.reorder(&[0, 1, 2, 4]).is_err());
        assert_eq!(stack.get(0).unwrap().color(), "#FF0000");
    }

    #[test]
    fn test_reorder_recomputes_coverage() {
        let mut stack = sample_stack();
        stack.reorder(&[3, 2, 1, 0]).unwrap();
        let colors: Vec<&str> = stack.iter().map(Layer::color).collect();
        assert_eq!(colors, vec!["#FFFFFF", "#0000FF", "#00FF00", "#FF0000"]);
        let coverage: Vec<f64> = stack.iter().map(Layer::coverage).collect();
        assert_eq!(coverage, vec![25.0, 50.0, 75.0, 100.0]);
        assert!(stack.is_well_stacked());
    }

    #[test]
    fn test_merge_keeps_first_selected_color() {
        let mut stack = sample_stack();
        let at = stack.merge(2, 0).unwrap();
        assert_eq!(at, 0);
        assert_eq!(stack.len(), 3);

        let merged = stack.get(0).unwrap();
        assert_eq!(merged.color(), "#0000FF");
        assert_eq!(merged.original_mask().iter_ones().collect::<Vec<_>>(), vec![0, 2]);
        assert!(stack.is_well_stacked());
    }

    #[test]
    fn test_merge_rejections_are_no_ops() {
        let mut stack = sample_stack();
        assert_eq!(stack.merge(1, 1), Err(EditError::SameLayer(1)));
        assert!(matches!(
            stack.merge(0, 8),
            Err(EditError::IndexOutOfRange { index: 8, .. })
        ));
        assert_eq!(stack.len(), 4);
    }

    #[test]
    fn test_editor_undo_redo() {
        let mut editor = LayerStackEditor::new(sample_stack());
        editor.merge(0, 1).unwrap();
        assert_eq!(editor.stack().len(), 3);

        assert!(editor.undo());
        assert_eq!(editor.stack().len(), 4);
        assert!(editor.redo());
        assert_eq!(editor.stack().len(), 3);
    }

    #[test]
    fn test_rejected_edit_leaves_history_alone() {
        let mut editor = LayerStackEditor::new(sample_stack());
        assert!(editor.merge(0, 0).is_err());
        assert!(editor.recolor(4, "#000000").is_err());
        assert!(editor.reorder(&[0, 1]).is_err());
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_undo_rebuilds_rendered_stack() {
        let mut editor = LayerStackEditor::new(sample_stack());
        for i in 0..3 {
            editor.recolor(i, "#101010").unwrap();
        }
        assert_eq!(editor.history().undo_count(), 3);

        assert!(editor.undo());
        let restored = editor.stack().get(2).unwrap();
        assert_eq!(restored.color(), "#0000FF");
        assert_eq!(restored.raster().dimensions(), (4, 1));
        assert!(editor.stack().is_well_stacked());
    }

    #[test]
    fn test_guided_merge() {
        let mut editor = LayerStackEditor::new(sample_stack());
        editor.start_merge();
        assert_eq!(editor.select_layer(3).unwrap(), Selection::First(3));
        assert_eq!(editor.select_layer(3).unwrap(), Selection::SameLayer(3));
        assert_eq!(
            editor.select_layer(1).unwrap(),
            Selection::Complete {
                first: 3,
                second: 1
            }
        );
        assert_eq!(editor.merge_state(), MergeState::Idle);
        assert_eq!(editor.stack().len(), 3);
        assert_eq!(editor.stack().get(1).unwrap().color(), "#FFFFFF");
    }

    #[test]
    fn test_cancelled_merge_changes_nothing() {
        let mut editor = LayerStackEditor::new(sample_stack());
        editor.start_merge();
        editor.select_layer(0).unwrap();
        editor.cancel_merge();
        assert_eq!(editor.select_layer(1).unwrap(), Selection::Ignored);
        assert_eq!(editor.stack().len(), 4);
        assert!(!editor.can_undo());
    }
}
