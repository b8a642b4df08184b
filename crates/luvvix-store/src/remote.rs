//! Async handle over the shared store.
//!
//! [`RemoteStore`] serialises access to one [`Database`] behind a mutex, runs
//! every call on tokio's blocking pool under a deadline, and fans out each
//! committed message insert to live subscribers.
//!
//! A write reported as [`StoreError::Timeout`] never commits: gated writes
//! check a [`CommitGate`] before committing, and the caller only reports a
//! timeout after it has closed that gate.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use luvvix_shared::KeyWrap;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

const PENDING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides, exactly once, whether a gated write commits or its caller gives
/// up on it.
#[derive(Debug, Default)]
pub struct CommitGate(AtomicU8);

impl CommitGate {
    /// Claim the right to commit. `false` once the caller has given up.
    pub fn enter(&self) -> bool {
        self.0
            .compare_exchange(PENDING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give up on the write. `false` if it is already committing.
    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Clone)]
pub struct RemoteStore {
    db: Arc<Mutex<Database>>,
    inserts: broadcast::Sender<Message>,
    timeout: Duration,
}

impl RemoteStore {
    pub fn new(db: Database, timeout: Duration, feed_capacity: usize) -> Self {
        let (inserts, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            db: Arc::new(Mutex::new(db)),
            inserts,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` against the database. Exceeding the deadline yields
    /// [`StoreError::Timeout`]; the operation itself may still complete.
    /// Writes that must not outlive a timeout go through [`Self::run_gated`].
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_gated(move |db, _| op(db)).await
    }

    /// Like [`Self::run`], but `op` must call [`CommitGate::enter`] before
    /// committing and roll back when it returns `false`. A write that got
    /// past the gate is awaited to completion, so its real outcome is
    /// returned instead of a timeout.
    pub async fn run_gated<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Database, &CommitGate) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let gate = Arc::new(CommitGate::default());
        let task_gate = Arc::clone(&gate);
        let mut task = tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
            op(&*guard, &task_gate)
        });

        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) if gate.abandon() => return Err(StoreError::Timeout(self.timeout)),
            Err(_) => task.await,
        };
        joined.unwrap_or_else(|e| Err(StoreError::Unavailable(format!("store task failed: {e}"))))
    }

    /// Insert a message (see [`Database::insert_message`]) and publish it to
    /// the live feed once committed. A timed-out insert is rolled back and
    /// never published.
    pub async fn insert_message(
        &self,
        message: Message,
        wraps: Vec<KeyWrap>,
        touched_at: DateTime<Utc>,
    ) -> Result<Message> {
        let feed = self.inserts.clone();
        self.run_gated(move |db, gate| {
            let inserted =
                db.insert_message_gated(&message, &wraps, touched_at, || gate.enter())?;
            // Err only means nobody is listening right now.
            let _ = feed.send(inserted.clone());
            Ok(inserted)
        })
        .await
    }

    /// Live feed of every message committed through this handle.
    pub fn subscribe_inserts(&self) -> broadcast::Receiver<Message> {
        self.inserts.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;
    use luvvix_shared::{ConversationId, MessageId, UserId};

    use super::*;
    use crate::models::{Conversation, ConversationKind, MessageKind, MessageState};

    fn store(timeout: Duration) -> RemoteStore {
        RemoteStore::new(Database::open_in_memory().unwrap(), timeout, 16)
    }

    async fn conversation(store: &RemoteStore, user: UserId, now: DateTime<Utc>) -> ConversationId {
        let conv = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Private,
            encrypted_name: None,
            created_by: user,
            created_at: now,
            updated_at: now,
        };
        let conv_id = conv.id;
        store
            .run(move |db| db.create_conversation(&conv, &[], &[]))
            .await
            .unwrap();
        conv_id
    }

    fn text(conv: ConversationId, sender: UserId, body: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::new(),
            seq: 0,
            conversation_id: conv,
            sender_id: sender,
            kind: MessageKind::Text,
            state: MessageState::Active {
                content: body.into(),
            },
            sent_at: at,
            edited_at: None,
        }
    }

    #[tokio::test]
    async fn slow_operation_times_out_as_transient() {
        let store = store(Duration::from_millis(20));
        let err = store
            .run(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn committed_insert_reaches_subscribers() {
        let store = store(Duration::from_secs(5));
        let mut feed = store.subscribe_inserts();
        let user = UserId::new();
        let now = Utc::now().trunc_subsecs(6);
        let conv_id = conversation(&store, user, now).await;

        let inserted = store
            .insert_message(text(conv_id, user, "live", now), Vec::new(), now)
            .await
            .unwrap();

        let received = feed.recv().await.unwrap();
        assert_eq!(received, inserted);
        assert!(received.seq > 0);
    }

    #[test]
    fn gate_is_decided_once() {
        let gate = CommitGate::default();
        assert!(gate.abandon());
        assert!(!gate.enter());

        let gate = CommitGate::default();
        assert!(gate.enter());
        assert!(!gate.abandon());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_insert_is_never_committed_or_published() {
        let store = store(Duration::from_millis(100));
        let user = UserId::new();
        let now = Utc::now().trunc_subsecs(6);
        let conv_id = conversation(&store, user, now).await;
        let mut feed = store.subscribe_inserts();

        // Hold the database past the insert's deadline.
        let holder = store.clone();
        let busy = tokio::spawn(async move {
            holder
                .run(|_| {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = store
            .insert_message(text(conv_id, user, "late", now), Vec::new(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        let _ = busy.await;

        // Give the queued insert time to reach the database.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let latest = store.run(move |db| db.latest_seq(conv_id)).await.unwrap();
        assert_eq!(latest, 0);
        assert!(matches!(
            feed.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
