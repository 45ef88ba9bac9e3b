//! Fixed-size inventory slots with a protected melee slot

use super::host::ItemId;

/// Slot reserved for the starting melee tool
pub const MELEE_SLOT: usize = 0;
/// Slot conventionally holding the starting ranged weapon
pub const STARTING_WEAPON_SLOT: usize = 1;

/// Where an incoming item should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub slot: usize,
    /// Item currently in that slot, which the caller must drop
    pub displaced: Option<ItemId>,
}

/// Active slot change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotChange {
    pub previous: Option<ItemId>,
    pub current: Option<ItemId>,
}

#[derive(Debug, Clone)]
pub struct Inventory {
    slots: Vec<Option<ItemId>>,
    active: usize,
}

impl Inventory {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count.max(2)],
            active: MELEE_SLOT,
        }
    }

    pub fn slots(&self) -> &[Option<ItemId>] {
        &self.slots
    }

    pub fn active_slot(&self) -> usize {
        self.active
    }

    pub fn active_item(&self) -> Option<ItemId> {
        self.slots[self.active]
    }

    pub fn get(&self, slot: usize) -> Option<ItemId> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn slot_of(&self, item: ItemId) -> Option<usize> {
        self.slots.iter().position(|s| *s == Some(item))
    }

    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Switch the active slot. Returns `None` for an out-of-range index or when
    /// the slot is already active.
    pub fn select(&mut self, slot: usize) -> Option<SlotChange> {
        if slot >= self.slots.len() || slot == self.active {
            return None;
        }
        let previous = self.active_item();
        self.active = slot;
        Some(SlotChange {
            previous,
            current: self.active_item(),
        })
    }

    /// Choose a slot for a picked-up item: the active slot if empty, else the
    /// first empty slot, else the active slot is replaced. The melee slot is
    /// never chosen; while it is active the starting weapon slot stands in.
    /// `replaceable` decides whether an occupied slot may be displaced.
    pub fn find_slot(&self, replaceable: impl Fn(ItemId) -> bool) -> Option<Placement> {
        if self.active != MELEE_SLOT && self.slots[self.active].is_none() {
            return Some(Placement {
                slot: self.active,
                displaced: None,
            });
        }

        if let Some(slot) = (1..self.slots.len()).find(|&i| self.slots[i].is_none()) {
            return Some(Placement {
                slot,
                displaced: None,
            });
        }

        let target = if self.active == MELEE_SLOT {
            STARTING_WEAPON_SLOT
        } else {
            self.active
        };
        let current = self.slots[target]?;
        if !replaceable(current) {
            return None;
        }
        Some(Placement {
            slot: target,
            displaced: Some(current),
        })
    }

    /// Put an item into a slot, returning whatever was there
    pub fn put(&mut self, slot: usize, item: ItemId) -> Option<ItemId> {
        self.slots.get_mut(slot).and_then(|s| s.replace(item))
    }

    pub fn remove(&mut self, item: ItemId) -> Option<usize> {
        let slot = self.slot_of(item)?;
        self.slots[slot] = None;
        Some(slot)
    }
}
