//! Pending-meta-data mailbox for cross-simulation renegotiation.
//!
//! When two clients claim the same simulation name, the later request is
//! merged into the earlier session's slot and the two sessions run a
//! four-state handshake over it. Slot state lives in an atomic so the
//! spin-waits in the session driver read it without taking the global lock;
//! slots are `Arc`-shared and updated in place, never replaced.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::meta::RequestMetaData;

/// Handshake progress of a pending-meta-data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MergeState {
    None = 0,
    WaitForOtherSimulation = 1,
    WaitForSendingData = 2,
    Done = 3,
}

impl MergeState {
    fn from_u8(raw: u8) -> MergeState {
        match raw {
            1 => MergeState::WaitForOtherSimulation,
            2 => MergeState::WaitForSendingData,
            3 => MergeState::Done,
            _ => MergeState::None,
        }
    }
}

/// One simulation name's slot: the merged request document plus the
/// handshake token.
#[derive(Debug, Default)]
pub struct PendingMetaData {
    doc: Mutex<RequestMetaData>,
    state: AtomicU8,
}

impl PendingMetaData {
    pub fn state(&self) -> MergeState {
        MergeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: MergeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn doc(&self) -> RequestMetaData {
        self.doc.lock().unwrap().clone()
    }

    pub fn set_doc(&self, doc: RequestMetaData) {
        *self.doc.lock().unwrap() = doc;
    }

    /// Unions a request into the slot document.
    pub fn merge_request(&self, request: &RequestMetaData) {
        self.doc.lock().unwrap().merge_from(request);
    }
}

/// Directory of pending-meta-data slots keyed by simulation name.
#[derive(Debug, Default)]
pub struct Mailbox {
    slots: Mutex<BTreeMap<String, Arc<PendingMetaData>>>,
}

impl Mailbox {
    pub fn new() -> Mailbox {
        Mailbox::default()
    }

    /// The slot for a simulation name, created empty on first reference.
    pub fn slot(&self, simulation: &str) -> Arc<PendingMetaData> {
        self.slots
            .lock()
            .unwrap()
            .entry(simulation.to_string())
            .or_default()
            .clone()
    }

    pub fn get(&self, simulation: &str) -> Option<Arc<PendingMetaData>> {
        self.slots.lock().unwrap().get(simulation).cloned()
    }

    pub fn contains(&self, simulation: &str) -> bool {
        self.slots.lock().unwrap().contains_key(simulation)
    }

    /// Stores a fresh document for a simulation and rearms its state.
    pub fn reset(&self, simulation: &str, doc: RequestMetaData) {
        let slot = self.slot(simulation);
        slot.set_doc(doc);
        slot.set_state(MergeState::None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_created_on_first_reference() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.contains("sim"));
        let slot = mailbox.slot("sim");
        assert!(mailbox.contains("sim"));
        assert_eq!(slot.state(), MergeState::None);
    }

    #[test]
    fn test_slots_are_shared_not_replaced() {
        let mailbox = Mailbox::new();
        let held = mailbox.slot("sim");
        held.set_state(MergeState::WaitForOtherSimulation);

        let mut doc = RequestMetaData::default();
        doc.name = Some("sim".into());
        mailbox.reset("sim", doc.clone());

        // The waiter's Arc observes the reset.
        assert_eq!(held.state(), MergeState::None);
        assert_eq!(held.doc(), doc);
        assert!(Arc::ptr_eq(&held, &mailbox.slot("sim")));
    }

    #[test]
    fn test_state_round_trip() {
        let slot = PendingMetaData::default();
        for state in [
            MergeState::WaitForOtherSimulation,
            MergeState::WaitForSendingData,
            MergeState::Done,
            MergeState::None,
        ] {
            slot.set_state(state);
            assert_eq!(slot.state(), state);
        }
    }

    #[test]
    fn test_merge_request_unions_into_doc() {
        let mailbox = Mailbox::new();
        let mut base = RequestMetaData::default();
        base.send.insert("box".into(), vec!["position".into()]);
        mailbox.reset("sim", base);

        let mut incoming = RequestMetaData::default();
        incoming.send.insert("box".into(), vec!["position".into(), "quaternion".into()]);
        mailbox.slot("sim").merge_request(&incoming);

        let merged = mailbox.slot("sim").doc();
        assert_eq!(merged.send["box"], vec!["position", "quaternion"]);
    }
}
