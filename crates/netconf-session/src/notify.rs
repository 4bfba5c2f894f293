//! Queue of received event notifications.

use std::time::Duration;

use netconf_protocol::{Element, Notification, is_notification};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::{NetconfError, NetconfResult};
use crate::listener::SessionListener;

/// Creates a connected listener/queue pair.
pub fn notification_channel() -> (NotificationListener, NotificationQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        NotificationListener { sender },
        NotificationQueue {
            receiver: Mutex::new(receiver),
        },
    )
}

/// Listener that queues every `<notification>` document.
#[derive(Debug)]
pub struct NotificationListener {
    sender: mpsc::UnboundedSender<Notification>,
}

impl SessionListener for NotificationListener {
    fn callback(&self, root: &Element, raw: &str) -> NetconfResult<()> {
        if !is_notification(root) {
            return Ok(());
        }
        let notification = Notification::parse(root, raw)?;
        debug!(
            name = notification.name().unwrap_or("unknown"),
            event_time = notification.event_time().unwrap_or(""),
            "notification received"
        );
        if self.sender.send(notification).is_err() {
            debug!("notification queue gone, dropping notification");
        }
        Ok(())
    }

    fn errback(&self, _error: &NetconfError) {}
}

/// Consumer side of the notification queue.
#[derive(Debug)]
pub struct NotificationQueue {
    receiver: Mutex<mpsc::UnboundedReceiver<Notification>>,
}

impl NotificationQueue {
    /// Takes the oldest queued notification.
    ///
    /// Without `block` this returns immediately. With `block`, it waits up
    /// to `timeout`, or indefinitely when `timeout` is `None`.
    pub async fn take(&self, block: bool, timeout: Option<Duration>) -> Option<Notification> {
        let mut receiver = self.receiver.lock().await;
        if !block {
            return receiver.try_recv().ok();
        }
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, receiver.recv())
                .await
                .ok()
                .flatten(),
            None => receiver.recv().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netconf_protocol::parse_document;

    const EVENT: &str = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2024-05-01T12:00:00Z</eventTime><link-down xmlns="urn:example"/></notification>"#;

    #[tokio::test]
    async fn queues_notifications_only() {
        let (listener, queue) = notification_channel();

        let reply = r#"<rpc-reply message-id="1"><ok/></rpc-reply>"#;
        listener
            .callback(&parse_document(reply).unwrap(), reply)
            .unwrap();
        assert!(queue.take(false, None).await.is_none());

        listener
            .callback(&parse_document(EVENT).unwrap(), EVENT)
            .unwrap();
        let notification = queue.take(false, None).await.unwrap();
        assert_eq!(notification.name(), Some("link-down"));
        assert_eq!(notification.event_time(), Some("2024-05-01T12:00:00Z"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_take_times_out() {
        let (_listener, queue) = notification_channel();
        let started = tokio::time::Instant::now();
        assert!(
            queue
                .take(true, Some(Duration::from_secs(3)))
                .await
                .is_none()
        );
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_take_wakes_on_arrival() {
        let (listener, queue) = notification_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            listener
                .callback(&parse_document(EVENT).unwrap(), EVENT)
                .unwrap();
        });
        let notification = queue.take(true, Some(Duration::from_secs(10))).await;
        assert!(notification.is_some());
    }
}
