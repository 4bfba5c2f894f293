//! Matches `<rpc-reply>` documents to outstanding requests.
//!
//! Requests are keyed by message-id. The I/O loop resolves a request by
//! completing its oneshot; the caller awaits the receiving end with a
//! deadline and an [`AbortHandle`]. A caller that gives up only drops its
//! receiver, so a late reply finds a closed channel and is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use netconf_protocol::{Element, RpcReply, message_id_of};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{NetconfError, NetconfResult};
use crate::listener::SessionListener;

type ReplySender = oneshot::Sender<NetconfResult<RpcReply>>;

/// One outstanding request.
#[derive(Debug)]
pub struct PendingRpc {
    message_id: String,
    created: Instant,
    receiver: oneshot::Receiver<NetconfResult<RpcReply>>,
}

impl PendingRpc {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// When the request was registered.
    pub fn created(&self) -> Instant {
        self.created
    }
}

/// External cancellation for reply waits.
///
/// Each [`abort`](Self::abort) bumps a generation counter. A wait cancels
/// when the counter moves past the value it saw on entry, so waits never
/// clear each other's cancellation.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    generation: Arc<watch::Sender<u64>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            generation: Arc::new(generation),
        }
    }

    /// Unblocks every wait currently using this handle with
    /// [`NetconfError::Canceled`]. Later waits are unaffected.
    pub fn abort(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    /// How many times [`abort`](Self::abort) was called.
    pub fn aborts(&self) -> u64 {
        *self.generation.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

/// Allocates message-ids and routes replies to their requests.
#[derive(Debug, Default)]
pub struct RpcCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, ReplySender>>,
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh message-id, strictly increasing per correlator.
    pub fn next_message_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Registers a new outstanding request.
    pub fn register(&self) -> PendingRpc {
        let message_id = self.next_message_id();
        let (sender, receiver) = oneshot::channel();

        let mut pending = self.lock();
        pending.retain(|_, sender| !sender.is_closed());
        pending.insert(message_id.clone(), sender);

        PendingRpc {
            message_id,
            created: Instant::now(),
            receiver,
        }
    }

    /// Drops a request that was never sent.
    pub fn forget(&self, message_id: &str) {
        self.lock().remove(message_id);
    }

    /// Number of requests still awaiting a reply, abandoned ones included.
    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ReplySender>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, message_id: &str, result: NetconfResult<RpcReply>) {
        let Some(sender) = self.lock().remove(message_id) else {
            debug!(message_id, "dropping reply with no matching request");
            return;
        };
        if sender.send(result).is_err() {
            debug!(message_id, "dropping late reply for abandoned request");
        }
    }
}

impl SessionListener for RpcCorrelator {
    fn callback(&self, root: &Element, raw: &str) -> NetconfResult<()> {
        let Some(message_id) = message_id_of(root) else {
            return Ok(());
        };

        let reply = if root.local_name() == "rpc-reply" {
            RpcReply::parse(root, raw)
        } else {
            match root.children().iter().find(|c| c.local_name() == "rpc-reply") {
                Some(child) => {
                    let outer = child.outer_xml(raw);
                    RpcReply::from_xml(outer)
                }
                None => return Ok(()),
            }
        };

        self.resolve(message_id, reply.map_err(NetconfError::from));
        Ok(())
    }

    fn errback(&self, error: &NetconfError) {
        let pending: Vec<_> = self.lock().drain().collect();
        if !pending.is_empty() {
            warn!(count = pending.len(), error = %error, "failing outstanding requests");
        }
        for (_, sender) in pending {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

/// Waits for the reply to `pending`.
///
/// Returns [`NetconfError::Canceled`] when `abort` is raised after the wait
/// started and [`NetconfError::Timeout`] when `timeout` elapses first. A
/// reply carrying `<rpc-error>` is still returned as `Ok`; see
/// [`RpcReply::into_result`].
pub async fn wait_reply(
    pending: PendingRpc,
    timeout: Duration,
    abort: &AbortHandle,
) -> NetconfResult<RpcReply> {
    let mut aborted = abort.subscribe();
    let PendingRpc {
        message_id,
        receiver,
        ..
    } = pending;

    tokio::select! {
        biased;
        Ok(()) = aborted.changed() => {
            debug!(%message_id, "wait canceled");
            Err(NetconfError::Canceled)
        }
        result = tokio::time::timeout(timeout, receiver) => match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(NetconfError::session("session closed before the reply arrived")),
            Err(_) => Err(NetconfError::Timeout { message_id, timeout }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netconf_protocol::parse_document;

    fn deliver(correlator: &RpcCorrelator, raw: &str) {
        let root = parse_document(raw).unwrap();
        correlator.callback(&root, raw).unwrap();
    }

    fn ok_reply(message_id: &str) -> String {
        format!(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{message_id}"><ok/></rpc-reply>"#
        )
    }

    #[test]
    fn message_ids_strictly_increase() {
        let correlator = RpcCorrelator::new();
        let ids: Vec<u64> = (0..100)
            .map(|_| correlator.next_message_id().parse().unwrap())
            .collect();
        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn reply_resolves_only_its_request() {
        let correlator = RpcCorrelator::new();
        let first = correlator.register();
        let second = correlator.register();
        let abort = AbortHandle::new();

        deliver(&correlator, &ok_reply(second.message_id()));

        let reply = wait_reply(second, Duration::from_secs(1), &abort)
            .await
            .unwrap();
        assert_eq!(reply.message_id.as_deref(), Some("2"));
        assert_eq!(correlator.outstanding(), 1);

        deliver(&correlator, &ok_reply(first.message_id()));
        assert!(wait_reply(first, Duration::from_secs(1), &abort).await.is_ok());
    }

    #[tokio::test]
    async fn mismatched_reply_is_ignored() {
        let correlator = RpcCorrelator::new();
        let pending = correlator.register();

        deliver(&correlator, &ok_reply("999"));
        assert_eq!(correlator.outstanding(), 1);

        deliver(
            &correlator,
            r#"<rpc-reply message-id="1"><data><x/></data></rpc-reply>"#,
        );
        let reply = wait_reply(pending, Duration::from_secs(1), &AbortHandle::new())
            .await
            .unwrap();
        assert_eq!(reply.data.as_deref(), Some("<x/>"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_late_reply_is_dropped() {
        let correlator = RpcCorrelator::new();
        let pending = correlator.register();

        let err = wait_reply(pending, Duration::from_secs(5), &AbortHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::Timeout { ref message_id, .. } if message_id == "1"));

        deliver(&correlator, &ok_reply("1"));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_wait() {
        let correlator = RpcCorrelator::new();
        let pending = correlator.register();
        let abort = AbortHandle::new();

        let waiter = {
            let abort = abort.clone();
            tokio::spawn(async move { wait_reply(pending, Duration::from_secs(60), &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, NetconfError::Canceled));
        assert_eq!(abort.aborts(), 1);

        deliver(&correlator, &ok_reply("1"));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_reaches_waits_started_before_it_is_seen() {
        let correlator = RpcCorrelator::new();
        let first = correlator.register();
        let second = correlator.register();
        let abort = AbortHandle::new();

        let waiter = {
            let abort = abort.clone();
            tokio::spawn(async move { wait_reply(first, Duration::from_secs(60), &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort();

        let late = tokio::time::timeout(
            Duration::ZERO,
            wait_reply(second, Duration::from_secs(60), &abort),
        )
        .await;
        assert!(late.is_err(), "a wait started after the abort keeps waiting");

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, NetconfError::Canceled));
    }

    #[tokio::test]
    async fn errback_fails_all_outstanding() {
        let correlator = RpcCorrelator::new();
        let a = correlator.register();
        let b = correlator.register();

        correlator.errback(&NetconfError::SessionClosed {
            buffered: String::new(),
        });

        let abort = AbortHandle::new();
        for pending in [a, b] {
            let err = wait_reply(pending, Duration::from_secs(1), &abort)
                .await
                .unwrap_err();
            assert!(matches!(err, NetconfError::SessionClosed { .. }));
        }
    }

    #[tokio::test]
    async fn error_reply_is_returned_as_data() {
        let correlator = RpcCorrelator::new();
        let pending = correlator.register();
        deliver(
            &correlator,
            r#"<rpc-reply message-id="1"><rpc-error><error-tag>in-use</error-tag></rpc-error></rpc-reply>"#,
        );
        let reply = wait_reply(pending, Duration::from_secs(1), &AbortHandle::new())
            .await
            .unwrap();
        assert_eq!(reply.error().and_then(|e| e.tag.as_deref()), Some("in-use"));
    }
}
