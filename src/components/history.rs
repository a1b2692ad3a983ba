use image::GrayImage;
use std::collections::VecDeque;

/// Number of mask snapshots kept for undo.
pub const DEFAULT_HISTORY_LIMIT: usize = 30;

// ============================================================================
// MASK SNAPSHOT
// ============================================================================

/// Immutable copy of the committed mask, taken before a gesture mutates it.
#[derive(Clone)]
pub struct MaskSnapshot {
    description: String,
    mask: GrayImage,
}

impl MaskSnapshot {
    pub fn capture(description: impl Into<String>, mask: &GrayImage) -> Self {
        Self {
            description: description.into(),
            mask: mask.clone(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn memory_size(&self) -> usize {
        self.mask.as_raw().len()
    }
}

// ============================================================================
// HISTORY MANAGER - bounded undo stack with redo
// ============================================================================

/// Undo/redo history of mask snapshots.
///
/// Snapshots are pushed *before* a gesture mutates the mask.  Undo swaps the
/// newest snapshot with the live mask, parking the live mask on the redo
/// stack.  A fresh push clears redo, so the pair behaves like one linear
/// history with a movable cursor.
///
/// A push stays provisional until [`HistoryManager::settle`]: the redo stack
/// it cleared and any snapshot it evicted are held aside, and
/// [`HistoryManager::discard_last`] puts them back.  An aborted gesture thus
/// leaves the history exactly as it found it.
pub struct HistoryManager {
    undo_stack: VecDeque<MaskSnapshot>,
    redo_stack: VecDeque<MaskSnapshot>,
    /// What the newest, unsettled push displaced.
    provisional: Option<Displaced>,
    max_history_size: usize,
    /// Running memory total across both stacks.
    total_memory: usize,
}

struct Displaced {
    redo: VecDeque<MaskSnapshot>,
    /// Oldest first, in the order `prune` removed them.
    evicted: Vec<MaskSnapshot>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            provisional: None,
            max_history_size: max_history_size.max(1),
            total_memory: 0,
        }
    }

    /// Record the committed mask as it is right now.  The push is
    /// provisional until `settle` or `discard_last`.
    pub fn push(&mut self, description: impl Into<String>, mask: &GrayImage) {
        self.settle();
        let redo = std::mem::take(&mut self.redo_stack);
        self.total_memory = self.total_memory.saturating_sub(stack_memory(&redo));
        let snap = MaskSnapshot::capture(description, mask);
        self.total_memory += snap.memory_size();
        self.undo_stack.push_back(snap);
        let evicted = self.prune();
        self.provisional = Some(Displaced { redo, evicted });
    }

    /// Make the newest push permanent: the redo stack it cleared and the
    /// snapshots it evicted are gone for good.
    pub fn settle(&mut self) {
        let Some(displaced) = self.provisional.take() else {
            return;
        };
        for removed in &displaced.evicted {
            crate::log_info!("history: evicted oldest snapshot '{}'", removed.description);
        }
    }

    /// Drop the newest snapshot without touching the mask.  Used when a
    /// gesture is aborted or turned out to draw nothing.  If that push was
    /// not settled yet, the redo stack and evicted snapshots come back.
    pub fn discard_last(&mut self) -> bool {
        let Some(snap) = self.undo_stack.pop_back() else {
            return false;
        };
        self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        if let Some(displaced) = self.provisional.take() {
            for old in displaced.evicted.into_iter().rev() {
                self.total_memory += old.memory_size();
                self.undo_stack.push_front(old);
            }
            self.total_memory += stack_memory(&displaced.redo);
            self.redo_stack = displaced.redo;
        }
        true
    }

    /// Restore the newest snapshot into `mask`.  Returns its description.
    pub fn undo(&mut self, mask: &mut GrayImage) -> Option<String> {
        self.settle();
        let snap = self.undo_stack.pop_back()?;
        let description = snap.description.clone();
        let current = MaskSnapshot {
            description: snap.description.clone(),
            mask: std::mem::replace(mask, snap.mask),
        };
        self.redo_stack.push_back(current);
        Some(description)
    }

    /// Re-apply the most recently undone gesture.
    pub fn redo(&mut self, mask: &mut GrayImage) -> Option<String> {
        self.settle();
        let snap = self.redo_stack.pop_back()?;
        let description = snap.description.clone();
        let current = MaskSnapshot {
            description: snap.description.clone(),
            mask: std::mem::replace(mask, snap.mask),
        };
        self.undo_stack.push_back(current);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|s| s.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|s| s.description())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.provisional = None;
        self.total_memory = 0;
    }

    /// Evict the oldest snapshots beyond the size limit.
    fn prune(&mut self) -> Vec<MaskSnapshot> {
        let mut evicted = Vec::new();
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                evicted.push(removed);
            }
        }
        evicted
    }
}

fn stack_memory(stack: &VecDeque<MaskSnapshot>) -> usize {
    stack.iter().map(MaskSnapshot::memory_size).sum()
}
