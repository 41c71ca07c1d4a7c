//! Slot assignment.
//!
//! Maps the live publisher groups onto a fixed number of display slots
//! (slot 0 is the main view, the rest are thumbnails). Every change is a
//! full recompute from `(active speakers, pin, registered groups)`; the
//! resulting table is published over a `watch` channel and is the only
//! place slot bindings are ever written.

use crate::consumer::ConsumerRegistry;
use crate::media::MediaStream;
use common::types::ProducerId;
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::debug;

/// What one display slot shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBinding {
    pub index: usize,
    /// Group key bound to this slot, if any.
    pub audio_pid: Option<ProducerId>,
    /// Stream to play; `None` detaches the element.
    pub stream: Option<MediaStream>,
    pub display_name: Option<String>,
    /// Whether the slot is held by the pin rather than speaker ranking.
    pub pinned: bool,
}

impl SlotBinding {
    fn empty(index: usize) -> Self {
        Self {
            index,
            audio_pid: None,
            stream: None,
            display_name: None,
            pinned: false,
        }
    }
}

/// Slot index to stream binding table read by presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<SlotBinding>,
}

impl SlotTable {
    /// A table of `slot_count` empty slots.
    #[must_use]
    pub fn empty(slot_count: usize) -> Self {
        Self {
            slots: (0..slot_count).map(SlotBinding::empty).collect(),
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[SlotBinding] {
        &self.slots
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SlotBinding> {
        self.slots.get(index)
    }

    /// The main slot.
    #[must_use]
    pub fn main(&self) -> Option<&SlotBinding> {
        self.slots.first()
    }

    #[must_use]
    pub fn position_of(&self, audio_pid: &ProducerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.audio_pid.as_ref() == Some(audio_pid))
    }

    /// Slots currently playing a stream.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }
}

/// Assign group keys to `slot_count` slots.
///
/// 1. An existing pinned group takes slot 0.
/// 2. Speakers fill the remaining slots in ranking order, skipping the
///    local participant, the pinned group, unknown groups and repeats.
/// 3. Leftover slots stay empty.
pub fn assign_slots(
    slot_count: usize,
    speakers: &[ProducerId],
    pinned: Option<&ProducerId>,
    self_pid: Option<&ProducerId>,
    exists: impl Fn(&ProducerId) -> bool,
) -> Vec<Option<ProducerId>> {
    let mut assigned: Vec<Option<ProducerId>> = Vec::with_capacity(slot_count);
    let mut placed: HashSet<&ProducerId> = HashSet::new();

    if let Some(pid) = pinned {
        if slot_count > 0 && Some(pid) != self_pid && exists(pid) {
            assigned.push(Some(pid.clone()));
            placed.insert(pid);
        }
    }

    for pid in speakers {
        if assigned.len() >= slot_count {
            break;
        }
        if Some(pid) == self_pid || placed.contains(pid) || !exists(pid) {
            continue;
        }
        assigned.push(Some(pid.clone()));
        placed.insert(pid);
    }

    assigned.resize(slot_count, None);
    assigned
}

/// Owns the slot inputs and publishes the recomputed table.
pub struct SlotAssigner {
    slot_count: usize,
    speakers: Vec<ProducerId>,
    pinned: Option<ProducerId>,
    self_pid: Option<ProducerId>,
    table: watch::Sender<SlotTable>,
}

impl SlotAssigner {
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        let (table, _) = watch::channel(SlotTable::empty(slot_count));
        Self {
            slot_count,
            speakers: Vec::new(),
            pinned: None,
            self_pid: None,
            table,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SlotTable> {
        self.table.subscribe()
    }

    #[must_use]
    pub fn table(&self) -> SlotTable {
        self.table.borrow().clone()
    }

    #[must_use]
    pub fn pinned(&self) -> Option<&ProducerId> {
        self.pinned.as_ref()
    }

    pub fn set_speakers(&mut self, speakers: Vec<ProducerId>) {
        self.speakers = speakers;
    }

    /// Record the local participant's own audio producer id.
    pub fn set_self_pid(&mut self, pid: Option<ProducerId>) {
        self.self_pid = pid;
    }

    /// Toggle the pin on `pid` and return the resulting pin.
    ///
    /// Pinning the pinned group unpins it; pinning a group that does not
    /// exist changes nothing.
    pub fn toggle_pin(&mut self, pid: ProducerId, exists: bool) -> Option<ProducerId> {
        if self.pinned.as_ref() == Some(&pid) {
            self.pinned = None;
        } else if exists {
            self.pinned = Some(pid);
        }
        self.pinned.clone()
    }

    pub fn unpin(&mut self) {
        self.pinned = None;
    }

    /// Drop the pin if it points at `pid`. Returns whether it did.
    pub fn clear_pin_if(&mut self, pid: &ProducerId) -> bool {
        if self.pinned.as_ref() == Some(pid) {
            self.pinned = None;
            true
        } else {
            false
        }
    }

    /// Recompute every slot from scratch and publish the table.
    ///
    /// Returns whether the published table changed; rebinding an identical
    /// stream to the same slot is not a change.
    pub fn recompute(&self, groups: &ConsumerRegistry) -> bool {
        let pinned = self.pinned.as_ref().filter(|pid| groups.contains(pid));
        let assignment = assign_slots(
            self.slot_count,
            &self.speakers,
            pinned,
            self.self_pid.as_ref(),
            |pid| groups.contains(pid),
        );

        let slots = assignment
            .into_iter()
            .enumerate()
            .map(|(index, audio_pid)| {
                let Some(group) = audio_pid.as_ref().and_then(|pid| groups.get(pid)) else {
                    return SlotBinding::empty(index);
                };
                SlotBinding {
                    index,
                    pinned: pinned == audio_pid.as_ref(),
                    stream: Some(group.stream().clone()),
                    display_name: Some(group.participant().display_name.clone()),
                    audio_pid,
                }
            })
            .collect();
        let next = SlotTable { slots };

        let changed = self.table.send_if_modified(|table| {
            if *table == next {
                false
            } else {
                *table = next;
                true
            }
        });
        if changed {
            debug!(
                target: "ms.slots",
                pinned = ?self.pinned,
                bound = self.table.borrow().bound_count(),
                "Slot table updated"
            );
        }
        changed
    }

    /// Detach every slot and forget speakers and pin.
    pub fn clear(&mut self) {
        self.speakers.clear();
        self.pinned = None;
        self.self_pid = None;
        let empty = SlotTable::empty(self.slot_count);
        self.table.send_if_modified(|table| {
            if *table == empty {
                false
            } else {
                *table = empty;
                true
            }
        });
    }
}
