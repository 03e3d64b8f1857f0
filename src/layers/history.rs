use super::mask::PixelMask;
use super::stack::{Layer, LayerStack};

const MAX_HISTORY_SIZE: usize = 32;

/// Layer identities in stack order; rasters and stacked masks are rebuilt
/// on restore
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    width: u32,
    height: u32,
    layers: Vec<(String, PixelMask)>,
}

impl Snapshot {
    pub fn of(stack: &LayerStack) -> Self {
        Self {
            width: stack.width(),
            height: stack.height(),
            layers: stack
                .iter()
                .map(|l| (l.color().to_string(), l.original_mask().clone()))
                .collect(),
        }
    }

    pub fn layers(&self) -> &[(String, PixelMask)] {
        &self.layers
    }

    /// Restack and render the saved layers
    pub fn restore(self) -> LayerStack {
        let layers = self
            .layers
            .into_iter()
            .map(|(color, mask)| Layer::new(color, mask))
            .collect();
        LayerStack::from_layers(self.width, self.height, layers)
    }
}

#[derive(Debug, Default)]
pub struct History {
    /// Past stacks (for undo)
    undo_stack: Vec<Snapshot>,
    /// Future stacks (for redo)
    redo_stack: Vec<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the stack as it was before an edit
    pub fn record(&mut self, snapshot: Snapshot) {
        self.undo_stack.push(snapshot);

        // A new edit invalidates the redo branch
        self.redo_stack.clear();

        if self.undo_stack.len() > MAX_HISTORY_SIZE {
            self.undo_stack.remove(0);
        }
    }

    /// Undo: hand back the previous stack, remembering `current` for redo
    pub fn undo(&mut self, current: &LayerStack) -> Option<LayerStack> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(Snapshot::of(current));
        Some(previous.restore())
    }

    /// Redo: hand back the next stack, remembering `current` for undo
    pub fn redo(&mut self, current: &LayerStack) -> Option<LayerStack> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(Snapshot::of(current));
        Some(next.restore())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
