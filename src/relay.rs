//! Relay core: the broadcast fan-out shared by both transports.
//!
//! A [`Relay`] pairs a [`ConnectionRegistry`] with a [`RelayPolicy`] and
//! delivers each inbound message to every registered connection. Delivery is
//! best-effort and independent per target: a dead target is unregistered and
//! skipped, and nothing is ever reported back to the sender.

use std::sync::Arc;

use crate::registry::{ConnectionId, ConnectionRegistry};

/// Labeling and exclusion policy for one transport's broadcasts.
///
/// Both observed transports echo the sender its own message back
/// (`exclude_source: false`); the switch exists so that skipping the sender
/// is a one-line policy change rather than a rewrite of the fan-out loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Fixed label prefixed to every relayed payload, identifying which
    /// transport produced it.
    pub label: &'static str,
    /// Whether the sending connection is skipped during fan-out.
    pub exclude_source: bool,
}

impl RelayPolicy {
    /// Policy of the raw WebSocket transport.
    pub const NATIVE: Self = Self {
        label: "[Native]",
        exclude_source: false,
    };

    /// Policy of the Socket.IO transport.
    pub const SOCKET_IO: Self = Self {
        label: "[Socket.IO]",
        exclude_source: false,
    };

    /// Prefixes the payload with this policy's label.
    ///
    /// Applies to the empty string as well; empty messages are relayed like
    /// any other text.
    #[must_use]
    pub fn tag(&self, text: &str) -> String {
        format!("{} {}", self.label, text)
    }
}

/// Broadcast engine for one transport.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    policy: RelayPolicy,
}

impl Relay {
    /// Creates a relay over the given registry with the given policy.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, policy: RelayPolicy) -> Self {
        Self { registry, policy }
    }

    /// The policy this relay broadcasts under.
    #[must_use]
    pub const fn policy(&self) -> RelayPolicy {
        self.policy
    }

    /// Fans the tagged payload out to every registered connection.
    ///
    /// `source` is the sender's connection id, used only when the policy
    /// excludes the sender; `None` means the sender is untracked and nothing
    /// is excluded. Targets whose channel has closed are unregistered and do
    /// not abort delivery to the rest.
    pub async fn broadcast(&self, source: Option<&str>, text: &str) {
        let tagged = self.policy.tag(text);
        let snapshot = self.registry.snapshot().await;

        let mut stale: Vec<ConnectionId> = Vec::new();
        for (id, sender) in snapshot {
            if self.policy.exclude_source && Some(id.as_str()) == source {
                continue;
            }
            if sender.send(tagged.clone()).is_err() {
                stale.push(id);
            }
        }

        for id in stale {
            tracing::warn!(connection_id = %id, "send failed, unregistering stale connection");
            self.registry.unregister(&id).await;
        }
    }
}
