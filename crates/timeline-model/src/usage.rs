//! Back-references from derived artifacts to timeline items.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timeline::TrimWindow;

/// Position and identity of one timeline item.
///
/// Both the position and the id must match for a lookup to hit, so two
/// items sharing an id (or a display name) on different slots never get
/// each other's results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub track_index: usize,
    pub item_index: usize,
    pub item_id: String,
}

impl ItemRef {
    pub fn new(track_index: usize, item_index: usize, item_id: impl Into<String>) -> Self {
        Self {
            track_index,
            item_index,
            item_id: item_id.into(),
        }
    }

    /// Ordering key for usages of one source.
    pub fn position(&self) -> (usize, usize) {
        (self.track_index, self.item_index)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}",
            self.item_id, self.track_index, self.item_index
        )
    }
}

/// One item's use of a source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub item: ItemRef,
    pub window: TrimWindow,
}

impl Usage {
    pub fn new(item: ItemRef, window: TrimWindow) -> Self {
        Self { item, window }
    }

    pub fn duration(&self) -> f64 {
        self.window.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ref_orders_by_position_first() {
        let mut refs = vec![
            ItemRef::new(1, 0, "a"),
            ItemRef::new(0, 2, "z"),
            ItemRef::new(0, 1, "b"),
        ];
        refs.sort();
        let positions: Vec<_> = refs.iter().map(ItemRef::position).collect();
        assert_eq!(positions, vec![(0, 1), (0, 2), (1, 0)]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemRef::new(0, 2, "clip-7").to_string(), "clip-7@0:2");
    }
}
