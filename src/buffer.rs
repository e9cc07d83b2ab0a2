//! # Message Buffer
//!
//! A fixed-capacity FIFO of variable-length messages, shared by exactly one
//! producer task and one consumer task.
//!
//! Capacity is counted in bytes, not in messages. Every stored message costs
//! its payload plus a [`HEADER_LEN`]-byte length prefix, and is written and
//! read as a unit: a send either stores the whole message or nothing, a
//! receive either returns the whole message or nothing.
//!
//! ```text
//!  Producer ──try_send──▶ [len|bytes][len|bytes]...  ──receive──▶ Consumer
//! ```
//!
//! The buffer is split once into a [`Producer`] and a [`Consumer`]. Splitting
//! takes `&mut self`, and neither handle is `Clone`, so a second writer or
//! reader cannot be created while the first pair is alive.
//!
//! # Example
//!
//! ```ignore
//! static UPLINK: StaticCell<MessageBuffer<CriticalSectionRawMutex, 1024>> = StaticCell::new();
//! let (producer, consumer) = UPLINK.init(MessageBuffer::new(32)).split();
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, with_deadline};
use heapless::Deque;

use crate::fmt::warn;

/// Bytes of bookkeeping stored in front of every message.
pub const HEADER_LEN: usize = 2;

/// Buffer type used by the bridge tasks.
pub type BridgeBuffer<const CAPACITY: usize> = MessageBuffer<CriticalSectionRawMutex, CAPACITY>;

struct Ring<const CAPACITY: usize> {
    bytes: Deque<u8, CAPACITY>,
    messages: usize,
}

enum Pop {
    Empty,
    Message(usize),
    /// The next message is longer than the caller's buffer; it stays queued.
    TooLarge(usize),
}

impl<const CAPACITY: usize> Ring<CAPACITY> {
    const fn new() -> Self {
        Self {
            bytes: Deque::new(),
            messages: 0,
        }
    }

    fn free(&self) -> usize {
        CAPACITY - self.bytes.len()
    }

    fn push(&mut self, msg: &[u8]) -> bool {
        if msg.len() + HEADER_LEN > self.free() {
            return false;
        }
        let header = (msg.len() as u16).to_le_bytes();
        // Space was checked above, none of these pushes can fail.
        for &b in header.iter().chain(msg) {
            let _ = self.bytes.push_back(b);
        }
        self.messages += 1;
        true
    }

    fn head_len(&self) -> Option<usize> {
        let mut header = [0u8; HEADER_LEN];
        let mut iter = self.bytes.iter();
        for slot in header.iter_mut() {
            *slot = *iter.next()?;
        }
        Some(u16::from_le_bytes(header) as usize)
    }

    fn pop(&mut self, out: &mut [u8]) -> Pop {
        let Some(len) = self.head_len() else {
            return Pop::Empty;
        };
        if len > out.len() {
            return Pop::TooLarge(len);
        }
        for _ in 0..HEADER_LEN {
            self.bytes.pop_front();
        }
        for slot in out[..len].iter_mut() {
            *slot = self.bytes.pop_front().unwrap_or_default();
        }
        self.messages -= 1;
        Pop::Message(len)
    }

    /// Removes the message at the head without copying it.
    fn discard(&mut self) -> Option<usize> {
        let len = self.head_len()?;
        for _ in 0..HEADER_LEN + len {
            self.bytes.pop_front();
        }
        self.messages -= 1;
        Some(len)
    }
}

/// A bounded, message-preserving byte FIFO.
///
/// `CAPACITY` is the total number of bytes the buffer holds, headers
/// included. `item_size` bounds a single message.
pub struct MessageBuffer<M: RawMutex, const CAPACITY: usize> {
    ring: Mutex<M, RefCell<Ring<CAPACITY>>>,
    item_size: usize,
    readable: Signal<M, ()>,
    writable: Signal<M, ()>,
}

impl<M: RawMutex, const CAPACITY: usize> MessageBuffer<M, CAPACITY> {
    /// Creates an empty buffer.
    ///
    /// # Panics
    ///
    /// If `item_size` is zero, does not fit the length prefix, or a single
    /// item plus its header does not fit into `CAPACITY`.
    pub const fn new(item_size: usize) -> Self {
        assert!(item_size > 0 && item_size <= u16::MAX as usize);
        assert!(item_size + HEADER_LEN <= CAPACITY);
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
            item_size,
            readable: Signal::new(),
            writable: Signal::new(),
        }
    }

    /// Hands out the single producer and the single consumer.
    pub fn split(&mut self) -> (Producer<'_, M, CAPACITY>, Consumer<'_, M, CAPACITY>) {
        let buffer: &Self = self;
        (Producer { buffer }, Consumer { buffer })
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Largest payload the next send could store right now.
    ///
    /// Advisory only: the consumer may free space (or the producer fill it)
    /// before the value is acted upon. Always check the send result.
    pub fn available_space(&self) -> usize {
        self.ring
            .lock(|ring| ring.borrow().free().saturating_sub(HEADER_LEN))
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().messages)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_push(&self, msg: &[u8]) -> bool {
        let pushed = self.ring.lock(|ring| ring.borrow_mut().push(msg));
        if pushed {
            self.readable.signal(());
        }
        pushed
    }

    fn try_pop(&self, out: &mut [u8]) -> Pop {
        let popped = self.ring.lock(|ring| ring.borrow_mut().pop(out));
        if let Pop::Message(_) = popped {
            self.writable.signal(());
        }
        popped
    }

    fn discard_head(&self) {
        let discarded = self.ring.lock(|ring| ring.borrow_mut().discard());
        if discarded.is_some() {
            self.writable.signal(());
        }
    }

    async fn send_until(&self, msg: &[u8], deadline: Instant) -> usize {
        if msg.len() > self.item_size {
            warn!(
                "message of {} bytes exceeds item size {}",
                msg.len(),
                self.item_size
            );
            return 0;
        }
        loop {
            if self.try_push(msg) {
                return msg.len();
            }
            // A pop between the failed push and this wait leaves the signal
            // set, so the wake-up cannot be lost.
            if with_deadline(deadline, self.writable.wait()).await.is_err() {
                return 0;
            }
        }
    }

    async fn receive_until(&self, out: &mut [u8], deadline: Option<Instant>) -> usize {
        loop {
            match self.try_pop(out) {
                Pop::Message(len) => return len,
                Pop::TooLarge(len) if deadline.is_none() => {
                    // Nobody can ever take it, so it would block the queue.
                    warn!(
                        "discarding {} byte message, reader buffer is {} bytes",
                        len,
                        out.len()
                    );
                    self.discard_head();
                    continue;
                }
                Pop::TooLarge(len) => {
                    warn!(
                        "next message of {} bytes does not fit a {} byte buffer",
                        len,
                        out.len()
                    );
                    return 0;
                }
                Pop::Empty => {}
            }
            match deadline {
                Some(deadline) => {
                    if with_deadline(deadline, self.readable.wait()).await.is_err() {
                        return 0;
                    }
                }
                None => self.readable.wait().await,
            }
        }
    }
}

/// The writing end of a [`MessageBuffer`].
pub struct Producer<'a, M: RawMutex, const CAPACITY: usize> {
    buffer: &'a MessageBuffer<M, CAPACITY>,
}

impl<M: RawMutex, const CAPACITY: usize> Producer<'_, M, CAPACITY> {
    /// Queues `msg` as one message, waiting up to `timeout` for room.
    ///
    /// Returns `msg.len()` when the message was stored and `0` when it was
    /// not. Anything short of `msg.len()` means nothing was delivered.
    pub async fn try_send(&self, msg: &[u8], timeout: Duration) -> usize {
        self.buffer
            .send_until(msg, Instant::now() + timeout)
            .await
    }

    /// See [`MessageBuffer::available_space`].
    pub fn available_space(&self) -> usize {
        self.buffer.available_space()
    }

    pub fn item_size(&self) -> usize {
        self.buffer.item_size
    }
}

/// The reading end of a [`MessageBuffer`].
pub struct Consumer<'a, M: RawMutex, const CAPACITY: usize> {
    buffer: &'a MessageBuffer<M, CAPACITY>,
}

impl<M: RawMutex, const CAPACITY: usize> Consumer<'_, M, CAPACITY> {
    /// Waits for the next message and copies it into `out`.
    ///
    /// A message longer than `out` is discarded with a warning and the wait
    /// goes on, so the returned length is never `0`.
    pub async fn receive(&self, out: &mut [u8]) -> usize {
        self.buffer.receive_until(out, None).await
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout` and
    /// returns `0`.
    ///
    /// A message longer than `out` is left queued and `0` is returned, so the
    /// caller can retry with a larger buffer.
    pub async fn receive_timeout(&self, out: &mut [u8], timeout: Duration) -> usize {
        self.buffer
            .receive_until(out, Some(Instant::now() + timeout))
            .await
    }

    /// See [`MessageBuffer::available_space`].
    pub fn available_space(&self) -> usize {
        self.buffer.available_space()
    }

    pub fn item_size(&self) -> usize {
        self.buffer.item_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;

    type TestBuffer<const N: usize> = MessageBuffer<CriticalSectionRawMutex, N>;

    const NO_WAIT: Duration = Duration::from_ticks(0);

    #[test]
    fn messages_arrive_in_order_and_intact() {
        let mut buffer = TestBuffer::<1024>::new(32);
        let (tx, rx) = buffer.split();
        let messages: [&[u8]; 4] = [b"first", &[0u8; 32], b"x", b"hello radio"];

        block_on(async {
            for msg in messages {
                assert_eq!(tx.try_send(msg, NO_WAIT).await, msg.len());
            }
            let mut out = [0u8; 32];
            for msg in messages {
                let n = rx.receive(&mut out).await;
                assert_eq!(&out[..n], msg);
            }
        });
    }

    #[test]
    fn full_buffer_rejects_whole_message() {
        // Room for exactly two 8-byte messages.
        let mut buffer = TestBuffer::<20>::new(16);
        let (tx, rx) = buffer.split();

        block_on(async {
            assert_eq!(tx.try_send(b"aaaaaaaa", NO_WAIT).await, 8);
            assert_eq!(tx.try_send(b"bbbbbbbb", NO_WAIT).await, 8);
            assert_eq!(tx.available_space(), 0);

            let sent = tx.try_send(b"cccc", Duration::from_millis(5)).await;
            assert!(sent < 4);

            let mut out = [0u8; 16];
            let n = rx.receive_timeout(&mut out, NO_WAIT).await;
            assert_eq!(&out[..n], b"aaaaaaaa");
            let n = rx.receive_timeout(&mut out, NO_WAIT).await;
            assert_eq!(&out[..n], b"bbbbbbbb");
            assert_eq!(rx.receive_timeout(&mut out, NO_WAIT).await, 0);
        });
    }

    #[test]
    fn message_larger_than_space_leaves_contents_unchanged() {
        let mut buffer = TestBuffer::<16>::new(12);
        block_on(async {
            {
                let (tx, _rx) = buffer.split();
                assert_eq!(tx.try_send(b"12345", NO_WAIT).await, 5);
                assert_eq!(tx.available_space(), 7);
                assert_eq!(tx.try_send(b"too long!", NO_WAIT).await, 0);
            }
            assert_eq!(buffer.len(), 1);
            let (_tx, rx) = buffer.split();
            let mut out = [0u8; 12];
            let n = rx.receive_timeout(&mut out, NO_WAIT).await;
            assert_eq!(&out[..n], b"12345");
        });
    }

    #[test]
    fn oversized_item_is_refused() {
        let mut buffer = TestBuffer::<128>::new(8);
        let (tx, _rx) = buffer.split();
        block_on(async {
            assert_eq!(tx.try_send(&[1u8; 9], NO_WAIT).await, 0);
        });
        assert!(buffer.is_empty());
    }

    #[test]
    fn receive_times_out_with_zero() {
        let mut buffer = TestBuffer::<64>::new(8);
        let (_tx, rx) = buffer.split();
        let mut out = [0u8; 8];
        let n = block_on(rx.receive_timeout(&mut out, Duration::from_millis(5)));
        assert_eq!(n, 0);
    }

    #[test]
    fn short_output_buffer_keeps_message_queued() {
        let mut buffer = TestBuffer::<64>::new(16);
        let (tx, rx) = buffer.split();
        block_on(async {
            tx.try_send(b"0123456789", NO_WAIT).await;
            let mut small = [0u8; 4];
            assert_eq!(rx.receive_timeout(&mut small, NO_WAIT).await, 0);
            let mut out = [0u8; 16];
            assert_eq!(rx.receive_timeout(&mut out, NO_WAIT).await, 10);
        });
    }

    #[test]
    fn blocking_receive_skips_message_it_cannot_hold() {
        let mut buffer = TestBuffer::<128>::new(64);
        let (tx, rx) = buffer.split();
        block_on(async {
            assert_eq!(tx.try_send(&[9u8; 40], NO_WAIT).await, 40);
            assert_eq!(tx.try_send(b"hi", NO_WAIT).await, 2);
            let mut out = [0u8; 32];
            let n = rx.receive(&mut out).await;
            assert_eq!(&out[..n], b"hi");
        });
        assert!(buffer.is_empty());
        assert_eq!(buffer.available_space(), 128 - HEADER_LEN);
    }

    #[test]
    fn blocked_sender_resumes_when_consumer_drains() {
        let mut buffer = TestBuffer::<12>::new(10);
        let (tx, rx) = buffer.split();

        block_on(async {
            assert_eq!(tx.try_send(b"0123456789", NO_WAIT).await, 10);
            let (sent, received) = join(
                tx.try_send(b"abc", Duration::from_secs(5)),
                async {
                    let mut out = [0u8; 10];
                    let first = rx.receive(&mut out).await;
                    let second = rx.receive(&mut out).await;
                    (first, second, out)
                },
            )
            .await;
            assert_eq!(sent, 3);
            let (first, second, out) = received;
            assert_eq!(first, 10);
            assert_eq!(second, 3);
            assert_eq!(&out[..3], b"abc");
        });
    }
}
