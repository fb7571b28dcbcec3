//! Object storage with deferred insertion and removal
//!
//! New objects land in a pending list and marked objects stay in place until
//! the simulation reaches a safe point between steps. Objects are taken out
//! of their slot while they update so they can borrow the simulation; the
//! slot keeps the id and deletion mark meanwhile.

use crate::object::{Object, ObjectData, ObjectId};

struct Slot {
    id: ObjectId,
    deleted: bool,
    object: Option<Box<dyn Object>>,
}

/// Position of a slot, valid until the next safe point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotRef {
    Live(usize),
    Pending(usize),
}

#[derive(Default)]
pub struct ObjectContainer {
    live: Vec<Slot>,
    pending: Vec<Slot>,
    next_id: u64,
}

impl ObjectContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object, it becomes visible at the next safe point
    pub fn add(&mut self, mut object: Box<dyn Object>) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        object.data_mut().id = id;

        self.pending.push(Slot {
            id,
            deleted: false,
            object: Some(object),
        });
        id
    }

    /// Mark an object for removal at the next safe point
    pub fn mark_deleted(&mut self, id: ObjectId) -> bool {
        match self.live.iter_mut().chain(self.pending.iter_mut()).find(|s| s.id == id) {
            Some(slot) => {
                slot.deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn is_deleted(&self, id: ObjectId) -> bool {
        self.live
            .iter()
            .chain(self.pending.iter())
            .any(|s| s.id == id && s.deleted)
    }

    /// Visible objects, including ones marked for removal
    pub fn iter(&self) -> impl Iterator<Item = &dyn Object> {
        self.live.iter().filter_map(|s| s.object.as_deref())
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn Object> {
        self.live
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.object.as_deref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn Object + 'static)> {
        self.live
            .iter_mut()
            .find(|s| s.id == id)
            .and_then(|s| s.object.as_deref_mut())
    }

    /// Visible object count
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Objects waiting for the next safe point
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Data of every visible object that is not marked for removal
    pub(crate) fn active_data_mut(&mut self) -> impl Iterator<Item = &mut ObjectData> {
        self.live
            .iter_mut()
            .filter(|s| !s.deleted)
            .filter_map(|s| s.object.as_deref_mut())
            .map(|o| o.data_mut())
    }

    /// Iterate visible slots with their deletion mark
    pub(crate) fn iter_marked(&self) -> impl Iterator<Item = (&dyn Object, bool)> {
        self.live
            .iter()
            .filter_map(|s| s.object.as_deref().map(|o| (o, s.deleted)))
    }

    pub(crate) fn take(&mut self, slot: SlotRef) -> Option<Box<dyn Object>> {
        let slot = match slot {
            SlotRef::Live(i) => self.live.get_mut(i)?,
            SlotRef::Pending(i) => self.pending.get_mut(i)?,
        };
        if slot.deleted {
            return None;
        }
        slot.object.take()
    }

    pub(crate) fn restore(&mut self, slot: SlotRef, object: Box<dyn Object>) {
        let slots = match slot {
            SlotRef::Live(_) => &mut self.live,
            SlotRef::Pending(_) => &mut self.pending,
        };
        let index = match slot {
            SlotRef::Live(i) | SlotRef::Pending(i) => i,
        };
        if let Some(slot) = slots.get_mut(index) {
            slot.object = Some(object);
        }
    }

    /// Safe point: drop marked objects and make pending ones visible
    pub(crate) fn commit(&mut self) -> (usize, usize) {
        let before = self.live.len();
        self.live.retain(|s| !s.deleted);
        let removed = before - self.live.len();

        let mut added = 0;
        for slot in self.pending.drain(..) {
            if !slot.deleted {
                self.live.push(slot);
                added += 1;
            }
        }

        (removed, added)
    }

    /// Take every slot out, keeping deletion marks and the pending split
    pub(crate) fn drain(&mut self) -> Drained {
        Drained {
            live: std::mem::take(&mut self.live),
            pending: std::mem::take(&mut self.pending),
        }
    }

    /// Put drained slots back in front of anything added meanwhile
    pub(crate) fn restore_all(&mut self, drained: Drained) {
        let Drained { mut live, mut pending } = drained;
        live.append(&mut self.live);
        pending.append(&mut self.pending);
        self.live = live;
        self.pending = pending;
    }
}

/// Slots taken out by [`ObjectContainer::drain`]
pub(crate) struct Drained {
    live: Vec<Slot>,
    pending: Vec<Slot>,
}

impl Drained {
    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Object>> {
        self.live
            .iter_mut()
            .chain(self.pending.iter_mut())
            .filter_map(|s| s.object.as_mut())
    }
}
