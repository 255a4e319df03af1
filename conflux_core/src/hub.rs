//! Shared hub state handed to every session.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::mailbox::Mailbox;
use crate::registry::Registry;
use crate::shutdown::ShutdownToken;

/// Everything the sessions coordinate through: the world registry behind
/// the global mutex, the renegotiation mailbox, the per-session cleanup
/// table drained at shutdown, and the shutdown token.
#[derive(Debug, Default)]
pub struct Hub {
    pub registry: Mutex<Registry>,
    pub mailbox: Mailbox,
    pub shutdown: ShutdownToken,
    cleanup: Mutex<BTreeMap<String, bool>>,
}

impl Hub {
    pub fn new(shutdown: ShutdownToken) -> Arc<Hub> {
        Arc::new(Hub { shutdown, ..Hub::default() })
    }

    /// Marks whether a session still owes its client a reply and must be
    /// drained before the transport goes away.
    pub fn set_needs_cleanup(&self, socket: &str, needs: bool) {
        self.cleanup.lock().unwrap().insert(socket.to_string(), needs);
    }

    pub fn needs_cleanup(&self, socket: &str) -> bool {
        self.cleanup.lock().unwrap().get(socket).copied().unwrap_or(false)
    }

    /// True while any session still owes a reply.
    pub fn any_needs_cleanup(&self) -> bool {
        self.cleanup.lock().unwrap().values().any(|needs| *needs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_table() {
        let hub = Hub::new(ShutdownToken::new());
        assert!(!hub.any_needs_cleanup());
        assert!(!hub.needs_cleanup("tcp://*:7001"));

        hub.set_needs_cleanup("tcp://*:7001", true);
        assert!(hub.needs_cleanup("tcp://*:7001"));
        assert!(hub.any_needs_cleanup());

        hub.set_needs_cleanup("tcp://*:7001", false);
        assert!(!hub.any_needs_cleanup());
    }
}
