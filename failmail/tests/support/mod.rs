//! Shared helpers for the integration tests.
#![allow(dead_code)] // not every helper is used by every test binary

pub mod mock_server;

use std::{fmt::Write, net::SocketAddr, sync::Mutex};

use failmail::{DeliveryEvent, DeliveryObserver};

/// Keeps every event it observes.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl DeliveryObserver for RecordingObserver {
    fn observe(&self, event: &DeliveryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A chain of identities, top-level first, each sending to `destinations`.
///
/// `settings` lands at the top of the document; `trailer` (for a `[timeouts]`
/// table) at the end.
pub fn chain_config(
    identities: &[(SocketAddr, &str)],
    destinations: &[&str],
    settings: &str,
    trailer: &str,
) -> String {
    let mut document = format!("{settings}\n");
    let mut prefix = String::new();

    for (index, (addr, username)) in identities.iter().enumerate() {
        if index > 0 {
            prefix.push_str(if index == 1 { "backup" } else { ".backup" });
            let _ = writeln!(document, "\n[{prefix}]");
        }
        let _ = writeln!(document, "addr = \"{addr}\"\nusername = \"{username}\"");

        for email in destinations {
            if prefix.is_empty() {
                let _ = writeln!(document, "[[destinations]]");
            } else {
                let _ = writeln!(document, "[[{prefix}.destinations]]");
            }
            let _ = writeln!(document, "email = \"{email}\"");
        }
    }

    document.push_str(trailer);
    document
}

/// One identity with extra keys (`password`, `tls`, ...) in its table.
pub fn identity_config(addr: SocketAddr, extra: &str, trailer: &str) -> String {
    format!(
        "addr = \"{addr}\"\nusername = \"a@x.com\"\n{extra}\n\
         [[destinations]]\nname = \"Ann\"\nemail = \"ann@x.com\"\n\
         [[destinations]]\nemail = \"bob@x.com\"\n\
         [[destinations]]\nemail = \"cat@x.com\"\n{trailer}"
    )
}
