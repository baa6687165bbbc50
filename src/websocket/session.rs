//! One live client connection bridged to the hub.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::hub::{Hub, HubError, SessionHandle, SessionKey};
use super::transport::{TransportReader, TransportWriter};
use crate::models::{OrgId, UserId};

/// Default outbound queue depth per session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Register a new session for an accepted transport and start its pumps.
///
/// The caller is trusted to have authenticated `organization_id` and `user_id`.
pub async fn start_session<R, W>(
    hub: &Hub,
    organization_id: OrgId,
    user_id: UserId,
    reader: R,
    writer: W,
    queue_capacity: usize,
) -> Result<SessionKey, HubError>
where
    R: TransportReader,
    W: TransportWriter,
{
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let key = SessionKey::new(organization_id);
    hub.register(SessionHandle::new(key, user_id, tx)).await?;

    tokio::spawn(write_pump(hub.clone(), key, rx, writer));
    tokio::spawn(read_pump(hub.clone(), key, reader));
    Ok(key)
}

/// Drains the transport until it errors or closes, then unregisters.
///
/// Inbound payloads are not interpreted.
async fn read_pump<R: TransportReader>(hub: Hub, key: SessionKey, mut reader: R) {
    loop {
        match reader.read_message().await {
            Ok(Some(_)) => continue,
            Ok(None) => {
                debug!(session_id = %key.id, "client closed connection");
                break;
            }
            Err(e) => {
                debug!(session_id = %key.id, error = %e, "read failed");
                break;
            }
        }
    }

    // Unregistering closes the queue, which makes the write pump close the transport.
    if let Err(e) = hub.unregister(key).await {
        debug!(session_id = %key.id, error = %e, "unregister after read failure");
    }
}

/// Forwards queued payloads in order until the queue closes.
async fn write_pump<W: TransportWriter>(
    hub: Hub,
    key: SessionKey,
    mut rx: mpsc::Receiver<Arc<str>>,
    mut writer: W,
) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = writer.write_message(payload).await {
            warn!(
                org_id = key.organization_id,
                session_id = %key.id,
                error = %e,
                "write failed, dropping session"
            );
            if let Err(e) = hub.unregister(key).await {
                debug!(session_id = %key.id, error = %e, "unregister after write failure");
            }
            break;
        }
    }

    if let Err(e) = writer.close().await {
        debug!(session_id = %key.id, error = %e, "close failed");
    }
    debug!(org_id = key.organization_id, session_id = %key.id, "session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEvent;
    use crate::websocket::transport::testing::{channel_transport, Written};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn event(id: i64) -> BroadcastEvent {
        BroadcastEvent::MaintenanceDue {
            maintenance_id: id,
            asset_id: 1,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        }
    }

    async fn wait_for_count(hub: &Hub, org: OrgId, expected: usize) {
        for _ in 0..100 {
            if hub.organization_connection_count(org).await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("organization {} never reached {} sessions", org, expected);
    }

    #[tokio::test]
    async fn test_session_delivers_in_order() {
        let (hub, _task) = Hub::spawn(64);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 1, 10, reader, writer, 16).await.unwrap();

        for i in 0..5 {
            hub.broadcast_to_organization(1, &event(i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(peer.next_json().await.unwrap()["maintenance_id"], i);
        }
    }

    #[tokio::test]
    async fn test_client_close_unregisters_and_closes_transport() {
        let (hub, _task) = Hub::spawn(16);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 3, 10, reader, writer, 16).await.unwrap();
        assert_eq!(hub.organization_connection_count(3).await.unwrap(), 1);

        // Inbound chatter is ignored.
        peer.inbound.send(Ok(b"ping".to_vec())).unwrap();
        drop(peer.inbound);

        assert_eq!(peer.outbound.recv().await, Some(Written::Closed));
        wait_for_count(&hub, 3, 0).await;
    }

    #[tokio::test]
    async fn test_read_error_tears_session_down() {
        let (hub, _task) = Hub::spawn(16);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 3, 10, reader, writer, 16).await.unwrap();

        peer.inbound.send(Err("connection reset".to_string())).unwrap();

        assert_eq!(peer.outbound.recv().await, Some(Written::Closed));
        wait_for_count(&hub, 3, 0).await;
    }

    #[tokio::test]
    async fn test_write_failure_unregisters_session() {
        let (hub, _task) = Hub::spawn(16);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 4, 10, reader, writer.failing(), 16)
            .await
            .unwrap();

        hub.broadcast_to_organization(4, &event(1)).unwrap();

        assert_eq!(peer.outbound.recv().await, Some(Written::Closed));
        wait_for_count(&hub, 4, 0).await;
    }

    #[tokio::test]
    async fn test_hub_shutdown_closes_session_transport() {
        let (hub, task) = Hub::spawn(16);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 5, 10, reader, writer, 16).await.unwrap();

        hub.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(peer.outbound.recv().await, Some(Written::Closed));
    }

    #[tokio::test]
    async fn test_start_session_fails_without_hub() {
        let (hub, task) = Hub::spawn(16);
        hub.shutdown().await.unwrap();
        task.await.unwrap();

        let (reader, writer, _peer) = channel_transport();
        let result = start_session(&hub, 1, 1, reader, writer, 16).await;
        assert!(matches!(result, Err(HubError::Closed)));
    }

    #[tokio::test]
    async fn test_write_failure_after_hub_shutdown_still_closes_transport() {
        let (hub, task) = Hub::spawn(16);
        let (reader, writer, mut peer) = channel_transport();
        start_session(&hub, 6, 10, reader, writer.failing(), 16)
            .await
            .unwrap();

        // The queued message is still drained after the hub is gone; the
        // failed write then tries to unregister against a closed hub.
        hub.broadcast_to_organization(6, &event(1)).unwrap();
        hub.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(peer.outbound.recv().await, Some(Written::Closed));
        assert!(matches!(hub.unregister(SessionKey::new(6)).await, Err(HubError::Closed)));
    }
}
