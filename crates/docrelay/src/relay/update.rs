use std::sync::Arc;
use tracing::{debug, warn};

use super::{fan_out, Relay, RelayInner};
use crate::protocol::{ServerMessage, UpdateKind};

impl Relay {
    /// Cache an update for the sender's room and forward it to every other member.
    ///
    /// The payload is stored and forwarded byte for byte; empty or malformed
    /// payloads are treated like any other. Updates from connections that are not
    /// registered are dropped. Returns the number of members the update was
    /// queued for.
    pub async fn relay_update(
        &self,
        connection_id: &str,
        kind: UpdateKind,
        payload: Vec<u8>,
    ) -> Option<usize> {
        let payload = Arc::new(payload);

        let mut inner = self.inner.lock().await;
        let RelayInner { connections, rooms } = &mut *inner;

        let Some(sender) = connections.get(connection_id) else {
            debug!(
                "Dropping {} from unknown connection {}",
                kind, connection_id
            );
            return None;
        };
        let Some(room) = rooms.get_mut(&sender.room) else {
            warn!(
                "Connection {} references missing room '{}'",
                connection_id, sender.room
            );
            return None;
        };

        room.store(kind, payload.clone());
        let size = payload.len();
        let delivered = fan_out(
            connections,
            room,
            connection_id,
            &ServerMessage::update(kind, payload),
        );

        debug!(
            "Relayed {} ({} bytes) from {} to {} members of room '{}'",
            kind, size, connection_id, delivered, sender.room
        );
        Some(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_update_reaches_every_other_member_once() {
        let relay = Relay::new();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c", "d"] {
            let (tx, rx) = client();
            relay.connect(id.to_string(), Some("room=shared"), tx).await;
            receivers.push((id, rx));
        }
        for (_, rx) in receivers.iter_mut() {
            drain(rx);
        }

        let delivered = relay
            .relay_update("b", UpdateKind::Document, vec![5, 6])
            .await;
        assert_eq!(delivered, Some(3));

        for (id, rx) in receivers.iter_mut() {
            let messages = drain(rx);
            if *id == "b" {
                assert!(messages.is_empty(), "sender received its own update");
            } else {
                assert_eq!(
                    messages,
                    vec![ServerMessage::DocumentUpdate(Arc::new(vec![5, 6]))]
                );
            }
        }
    }

    #[tokio::test]
    async fn test_updates_stay_inside_their_room() {
        let relay = Relay::new();
        let (a_tx, _a_rx) = client();
        let (b_tx, mut b_rx) = client();
        relay.connect("a".to_string(), Some("room=one"), a_tx).await;
        relay.connect("b".to_string(), Some("room=two"), b_tx).await;
        drain(&mut b_rx);

        relay.relay_update("a", UpdateKind::Awareness, vec![1]).await;

        assert!(drain(&mut b_rx).is_empty());
        assert!(relay.snapshot("two", UpdateKind::Awareness).await.is_none());
        assert_eq!(
            relay.snapshot("one", UpdateKind::Awareness).await.unwrap().as_slice(),
            &[1]
        );
    }

    #[tokio::test]
    async fn test_unknown_connection_is_dropped() {
        let relay = Relay::new();
        let (a_tx, mut a_rx) = client();
        relay.connect("a".to_string(), Some("room=r"), a_tx).await;
        drain(&mut a_rx);

        assert_eq!(
            relay.relay_update("ghost", UpdateKind::Document, vec![1]).await,
            None
        );
        assert!(drain(&mut a_rx).is_empty());
        assert!(relay.snapshot("r", UpdateKind::Document).await.is_none());

        relay.disconnect("a").await;
        assert_eq!(
            relay.relay_update("a", UpdateKind::Document, vec![1]).await,
            None
        );
    }

    #[tokio::test]
    async fn test_payloads_are_not_interpreted() {
        let relay = Relay::new();
        let (a_tx, _a_rx) = client();
        let (b_tx, mut b_rx) = client();
        relay.connect("a".to_string(), Some("room=r"), a_tx).await;
        relay.connect("b".to_string(), Some("room=r"), b_tx).await;
        drain(&mut b_rx);

        let garbage = vec![0xff, 0x00, 0xfe, 0x80];
        relay.relay_update("a", UpdateKind::Document, Vec::new()).await;
        relay.relay_update("a", UpdateKind::Document, garbage.clone()).await;

        assert_eq!(
            drain(&mut b_rx),
            vec![
                ServerMessage::DocumentUpdate(Arc::new(Vec::new())),
                ServerMessage::DocumentUpdate(Arc::new(garbage.clone())),
            ]
        );
        // Last write wins, no merging
        assert_eq!(
            relay.snapshot("r", UpdateKind::Document).await.unwrap().as_slice(),
            garbage.as_slice()
        );
    }
}
