use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, trace};

use crate::message::{Message, MessageRef};

/// Default cap for a video stream queue.
pub const DEFAULT_MAX_DATA_SIZE: usize = 5 * 256 * 1024;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full")]
    Full,
    #[error("message of {size} bytes can never fit in a {max} byte queue")]
    Oversized { size: usize, max: usize },
    #[error("timed out waiting for a message")]
    Timeout,
    #[error("queue aborted")]
    Aborted,
    #[error("queue not initialized")]
    Closed,
}

struct Inner {
    messages: VecDeque<MessageRef>,
    data_size: usize,
    max_data_size: usize,
    initialized: bool,
}

/// Bounded FIFO between one producer side and one decode thread.
///
/// The bound is the cumulative payload size of queued messages, not their
/// count. Once [`MessageQueue::abort`] is called every pending and future
/// `get` returns [`QueueError::Aborted`] until [`MessageQueue::init`].
pub struct MessageQueue {
    inner: Mutex<Inner>,
    aborted: AtomicBool,
    available: Condvar,
    space: Condvar,
}

impl MessageQueue {
    pub fn new(max_data_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { messages: VecDeque::new(), data_size: 0, max_data_size, initialized: true }),
            aborted: AtomicBool::new(false),
            available: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Re-open after [`MessageQueue::end`] and clear any abort request.
    pub fn init(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            inner.data_size = 0;
            inner.initialized = true;
            self.aborted.store(false, Ordering::Release);
            std::mem::take(&mut inner.messages)
        };
        drop(drained);
    }

    /// Release everything queued and refuse further traffic.
    pub fn end(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            inner.initialized = false;
            inner.data_size = 0;
            std::mem::take(&mut inner.messages)
        };
        self.available.notify_all();
        self.space.notify_all();
        debug!(released = drained.len(), "message queue ended");
    }

    pub fn set_max_data_size(&self, max: usize) { self.inner.lock().max_data_size = max; }

    pub fn max_data_size(&self) -> usize { self.inner.lock().max_data_size }

    pub fn put(&self, msg: MessageRef) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        self.try_push(&mut inner, msg)
    }

    pub fn put_message(&self, msg: Message) -> Result<(), QueueError> { self.put(msg.into_ref()) }

    /// Like [`MessageQueue::put`], but waits up to `timeout` for space.
    pub fn put_timeout(&self, msg: MessageRef, timeout: Duration) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            match self.try_push(&mut inner, msg.clone()) {
                Err(QueueError::Full) => {}
                other => return other,
            }
            if self.space.wait_until(&mut inner, deadline).timed_out() {
                return self.try_push(&mut inner, msg);
            }
        }
    }

    fn try_push(&self, inner: &mut Inner, msg: MessageRef) -> Result<(), QueueError> {
        if self.aborted.load(Ordering::Acquire) { return Err(QueueError::Aborted); }
        if !inner.initialized { return Err(QueueError::Closed); }
        let size = msg.data_size();
        if size > inner.max_data_size {
            return Err(QueueError::Oversized { size, max: inner.max_data_size });
        }
        if inner.data_size + size > inner.max_data_size { return Err(QueueError::Full); }
        inner.data_size += size;
        inner.messages.push_back(msg);
        self.available.notify_one();
        Ok(())
    }

    /// Block up to `timeout` for the next message.
    pub fn get(&self, timeout: Duration) -> Result<MessageRef, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if self.aborted.load(Ordering::Acquire) { return Err(QueueError::Aborted); }
            if !inner.initialized { return Err(QueueError::Closed); }
            if let Some(msg) = inner.messages.pop_front() {
                inner.data_size -= msg.data_size();
                self.space.notify_all();
                trace!(kind = ?msg.kind(), left = inner.messages.len(), "dequeued");
                return Ok(msg);
            }
            if Instant::now() >= deadline { return Err(QueueError::Timeout); }
            self.available.wait_until(&mut inner, deadline);
        }
    }

    /// Wake every blocked caller; idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        // Taking the lock orders the flag with waiters that just checked it.
        let _inner = self.inner.lock();
        self.available.notify_all();
        self.space.notify_all();
    }

    pub fn received_abort_request(&self) -> bool { self.aborted.load(Ordering::Acquire) }

    /// Drop all queued messages, leaving the abort state as is.
    pub fn flush(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            inner.data_size = 0;
            std::mem::take(&mut inner.messages)
        };
        self.space.notify_all();
        debug!(released = drained.len(), "message queue flushed");
    }

    pub fn len(&self) -> usize { self.inner.lock().messages.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn data_size(&self) -> usize { self.inner.lock().data_size }

    /// Fill level in percent of the byte cap.
    pub fn level(&self) -> u32 {
        let inner = self.inner.lock();
        if inner.max_data_size == 0 { return 0; }
        (inner.data_size * 100 / inner.max_data_size) as u32
    }
}

impl Default for MessageQueue {
    fn default() -> Self { Self::new(DEFAULT_MAX_DATA_SIZE) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DemuxPacket;
    use std::sync::Arc;
    use std::thread;

    fn packet(size: usize) -> MessageRef {
        Message::DemuxerPacket(DemuxPacket::new(vec![0u8; size], None, None)).into_ref()
    }

    #[test]
    fn test_put_get_fifo_and_accounting() {
        let q = MessageQueue::new(1000);
        q.put(packet(100)).unwrap();
        q.put_message(Message::VideoNoSkip).unwrap();
        q.put(packet(300)).unwrap();
        assert_eq!(q.data_size(), 400);
        assert_eq!(q.len(), 3);
        assert_eq!(q.level(), 40);

        assert_eq!(q.get(Duration::ZERO).unwrap().data_size(), 100);
        assert_eq!(q.get(Duration::ZERO).unwrap().kind(), crate::MessageKind::VideoNoSkip);
        assert_eq!(q.data_size(), 300);
        assert_eq!(q.get(Duration::ZERO).unwrap().data_size(), 300);
        assert_eq!(q.data_size(), 0);
        assert_eq!(q.get(Duration::from_millis(5)).unwrap_err(), QueueError::Timeout);
    }

    #[test]
    fn test_byte_cap_rejects_without_corrupting_state() {
        let q = MessageQueue::new(1000);
        q.put(packet(600)).unwrap();
        assert_eq!(q.put(packet(500)).unwrap_err(), QueueError::Full);
        assert_eq!(q.data_size(), 600);
        assert_eq!(q.len(), 1);
        // Exactly at the cap is fine
        q.put(packet(400)).unwrap();
        assert_eq!(q.data_size(), 1000);
        // Control messages are free
        q.put_message(Message::GeneralFlush).unwrap();
        assert_eq!(q.put(packet(1)).unwrap_err(), QueueError::Full);
        assert_eq!(q.put(packet(2000)).unwrap_err(), QueueError::Oversized { size: 2000, max: 1000 });
        assert_eq!(q.data_size(), 1000);
    }

    #[test]
    fn test_put_after_abort_rejected() {
        let q = MessageQueue::new(1000);
        q.abort();
        q.abort();
        assert_eq!(q.put(packet(1)).unwrap_err(), QueueError::Aborted);
        assert!(q.is_empty());
    }

    #[test]
    fn test_get_after_abort_returns_without_blocking() {
        let q = MessageQueue::new(1000);
        q.abort();
        let start = Instant::now();
        assert_eq!(q.get(Duration::from_secs(5)).unwrap_err(), QueueError::Aborted);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_abort_wakes_blocked_get() {
        let q = Arc::new(MessageQueue::new(1000));
        let q2 = q.clone();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let res = q2.get(Duration::from_millis(5000));
            (res.map(|_| ()), start.elapsed())
        });
        thread::sleep(Duration::from_millis(50));
        let aborted_at = Instant::now();
        q.abort();
        let (res, _) = waiter.join().unwrap();
        assert_eq!(res.unwrap_err(), QueueError::Aborted);
        assert!(aborted_at.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_init_clears_abort() {
        let q = MessageQueue::new(1000);
        q.put(packet(10)).unwrap();
        q.abort();
        q.init();
        assert!(!q.received_abort_request());
        assert!(q.is_empty());
        q.put(packet(10)).unwrap();
        assert_eq!(q.data_size(), 10);
    }

    #[test]
    fn test_flush_releases_messages_and_keeps_abort_state() {
        let q = MessageQueue::new(1000);
        let msg = packet(100);
        q.put(msg.clone()).unwrap();
        assert_eq!(Arc::strong_count(&msg), 2);
        q.flush();
        assert_eq!(Arc::strong_count(&msg), 1);
        assert_eq!(q.data_size(), 0);
        assert!(!q.received_abort_request());

        q.abort();
        q.flush();
        assert!(q.received_abort_request());
    }

    #[test]
    fn test_end_closes_queue() {
        let q = MessageQueue::new(1000);
        q.put(packet(10)).unwrap();
        q.end();
        assert_eq!(q.get(Duration::ZERO).unwrap_err(), QueueError::Closed);
        assert_eq!(q.put(packet(10)).unwrap_err(), QueueError::Closed);
        q.init();
        q.put(packet(10)).unwrap();
    }

    #[test]
    fn test_put_timeout_waits_for_space() {
        let q = Arc::new(MessageQueue::new(100));
        q.put(packet(80)).unwrap();
        let q2 = q.clone();
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            q2.get(Duration::from_millis(100)).map(|m| m.data_size())
        });
        q.put_timeout(packet(50), Duration::from_secs(2)).unwrap();
        assert_eq!(consumer.join().unwrap().unwrap(), 80);
        assert_eq!(q.data_size(), 50);
        assert_eq!(q.put_timeout(packet(60), Duration::from_millis(10)).unwrap_err(), QueueError::Full);
    }
}
