//! In-process message-passing world.
//!
//! Every rank shares one [`Hub`] holding a mailbox per global rank. A message
//! is queued under `(communicator context, global source, tag)` in the
//! destination's mailbox, so sends never block and same-key messages are
//! received in send order. Receivers park on the mailbox's [`Notify`].
//!
//! Ranks are driven as ordinary futures, e.g. with
//! `futures::future::join_all` on one task, or spawned onto a runtime.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{NetError, Result};
use crate::{Communicator, Tag, GATHER_TAG};

/// Context id of the world communicator.
const WORLD_CONTEXT: u64 = 0;

/// `(context, global source rank, tag)`
type MessageKey = (u64, usize, Tag);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Hub ───────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<MessageKey, VecDeque<Vec<u8>>>>,
    arrived: Notify,
}

/// `(parent context, global members, creation sequence)`
type ContextKey = (u64, Vec<usize>, u64);

struct Hub {
    mailboxes: Vec<Mailbox>,
    /// Contexts some members have not joined yet, with the count still
    /// expected. The last member to join removes the entry.
    contexts: Mutex<HashMap<ContextKey, (u64, usize)>>,
    next_context: AtomicU64,
    abort_reason: Mutex<Option<String>>,
}

impl Hub {
    fn new(size: usize) -> Self {
        Self {
            mailboxes: (0..size).map(|_| Mailbox::default()).collect(),
            contexts: Mutex::new(HashMap::new()),
            next_context: AtomicU64::new(WORLD_CONTEXT + 1),
            abort_reason: Mutex::new(None),
        }
    }

    fn check_abort(&self) -> Result<()> {
        match lock(&self.abort_reason).as_ref() {
            Some(reason) => Err(NetError::Aborted(reason.clone())),
            None => Ok(()),
        }
    }

    fn deliver(&self, dest: usize, key: MessageKey, data: Vec<u8>) {
        let mailbox = &self.mailboxes[dest];
        lock(&mailbox.queues).entry(key).or_default().push_back(data);
        mailbox.arrived.notify_waiters();
    }

    fn take(&self, dest: usize, key: &MessageKey) -> Option<Vec<u8>> {
        let mut queues = lock(&self.mailboxes[dest].queues);
        let queue = queues.get_mut(key)?;
        let data = queue.pop_front();
        if queue.is_empty() {
            queues.remove(key);
        }
        data
    }

    /// Members calling with the same key get the same context.
    fn context_for(&self, parent: u64, members: &[usize], seq: u64) -> u64 {
        let key = (parent, members.to_vec(), seq);
        let mut contexts = lock(&self.contexts);
        let (context, pending) = {
            let entry = contexts.entry(key.clone()).or_insert_with(|| {
                (self.next_context.fetch_add(1, Ordering::Relaxed), members.len())
            });
            entry.1 -= 1;
            *entry
        };
        if pending == 0 {
            contexts.remove(&key);
        }
        context
    }

    fn abort(&self, reason: &str) {
        {
            let mut slot = lock(&self.abort_reason);
            if slot.is_some() {
                return;
            }
            *slot = Some(reason.to_string());
        }
        for mailbox in &self.mailboxes {
            mailbox.arrived.notify_waiters();
        }
    }
}

// ── LocalWorld ────────────────────────────────────────────────────────────────

/// A job of `size` processes living in the current process.
pub struct LocalWorld {
    hub: Arc<Hub>,
}

impl LocalWorld {
    pub fn new(size: usize) -> Self {
        Self {
            hub: Arc::new(Hub::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.hub.mailboxes.len()
    }

    /// The world communicator of every rank, indexed by rank.
    pub fn communicators(&self) -> Vec<LocalComm> {
        let members: Arc<[usize]> = (0..self.size()).collect();
        (0..self.size())
            .map(|rank| LocalComm {
                hub: Arc::clone(&self.hub),
                context: WORLD_CONTEXT,
                rank,
                members: Arc::clone(&members),
                created: Mutex::new(HashMap::new()),
            })
            .collect()
    }

    /// Reason passed to the first [`Communicator::abort`], if any.
    pub fn abort_reason(&self) -> Option<String> {
        lock(&self.hub.abort_reason).clone()
    }
}

// ── LocalComm ─────────────────────────────────────────────────────────────────

/// One rank's handle on a communicator of a [`LocalWorld`].
pub struct LocalComm {
    hub: Arc<Hub>,
    context: u64,
    rank: usize,
    /// Global rank of each local rank.
    members: Arc<[usize]>,
    /// Per-ordering creation counter, so repeated constructions get fresh contexts.
    created: Mutex<HashMap<Vec<usize>, u64>>,
}

impl LocalComm {
    /// Rank of this process in the world.
    pub fn global_rank(&self) -> usize {
        self.members[self.rank]
    }

    fn global(&self, rank: usize) -> Result<usize> {
        self.members
            .get(rank)
            .copied()
            .ok_or(NetError::InvalidRank {
                rank,
                size: self.members.len(),
            })
    }
}

#[async_trait]
impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    async fn send(&self, dest: usize, tag: Tag, data: Vec<u8>) -> Result<()> {
        self.hub.check_abort()?;
        let dest = self.global(dest)?;
        self.hub
            .deliver(dest, (self.context, self.global_rank(), tag), data);
        Ok(())
    }

    async fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        let key = (self.context, self.global(source)?, tag);
        let me = self.global_rank();
        let mailbox = &self.hub.mailboxes[me];
        loop {
            let arrived = mailbox.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if let Some(data) = self.hub.take(me, &key) {
                return Ok(data);
            }
            self.hub.check_abort()?;
            arrived.await;
        }
    }

    async fn create_ordered(&self, ordering: &[usize]) -> Result<Self> {
        self.hub.check_abort()?;
        if ordering.is_empty() {
            return Err(NetError::InvalidOrdering("empty ordering".into()));
        }
        let mut seen = vec![false; self.size()];
        for &r in ordering {
            if r >= self.size() {
                return Err(NetError::InvalidRank {
                    rank: r,
                    size: self.size(),
                });
            }
            if std::mem::replace(&mut seen[r], true) {
                return Err(NetError::InvalidOrdering(format!("rank {r} listed twice")));
            }
        }
        let rank = ordering
            .iter()
            .position(|&r| r == self.rank)
            .ok_or_else(|| {
                NetError::InvalidOrdering(format!("calling rank {} is not a member", self.rank))
            })?;

        let members: Vec<usize> = ordering.iter().map(|&r| self.members[r]).collect();
        let seq = {
            let mut created = lock(&self.created);
            let count = created.entry(members.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let context = self.hub.context_for(self.context, &members, seq);
        debug!(
            parent = self.context,
            context,
            rank,
            size = members.len(),
            "created ordered communicator"
        );

        Ok(LocalComm {
            hub: Arc::clone(&self.hub),
            context,
            rank,
            members: members.into(),
            created: Mutex::new(HashMap::new()),
        })
    }

    async fn gather(&self, root: usize, data: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.global(root)?;
        if self.rank != root {
            self.send(root, GATHER_TAG, data).await?;
            return Ok(None);
        }

        let expected = data.len();
        let mut out = Vec::with_capacity(expected * self.size());
        for r in 0..self.size() {
            if r == root {
                out.extend_from_slice(&data);
                continue;
            }
            let part = self.recv(r, GATHER_TAG).await?;
            if part.len() != expected {
                return Err(NetError::GatherSizeMismatch {
                    rank: r,
                    expected,
                    actual: part.len(),
                });
            }
            out.extend_from_slice(&part);
        }
        Ok(Some(out))
    }

    fn abort(&self, reason: &str) {
        warn!(rank = self.global_rank(), %reason, "aborting local world");
        self.hub.abort(reason);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
