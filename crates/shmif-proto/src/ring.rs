//! The single-producer/single-consumer event ring embedded twice in every
//! [`crate::layout::ControlPage`] (child→parent and parent→child).
//!
//! Alongside the non-blocking [`EventRing::try_enqueue`]/[`EventRing::poll`],
//! this module provides the blocking [`EventRing::enqueue`]/[`EventRing::wait`]
//! pairing, composed from the same ring plus the event semaphore and
//! dead-man's-switch pointer from the owning segment: the producer posts
//! the semaphore after every successful enqueue, and a blocked producer
//! (ring full) or consumer (ring empty) retries on every post, unblocking
//! early if the dead-man's-switch trips.

use std::sync::atomic::{AtomicU32, Ordering};

use shmif_ipc::NamedSemaphore;

use crate::error::{Error, Result};
use crate::event::RawEvent;

/// Capacity of each event ring, in slots. Must be a power of two.
pub const EVENT_RING_SIZE: usize = 32;

/// The portion of a ring that lives in shared memory: two monotonically
/// increasing indices and a fixed slot array. `front` is only ever
/// written by the consumer, `back` only by the producer.
#[repr(C)]
pub struct EventRingHeader {
    front: AtomicU32,
    back: AtomicU32,
    slots: [RawEvent; EVENT_RING_SIZE],
}

impl EventRingHeader {
    pub fn zeroed() -> Self {
        EventRingHeader {
            front: AtomicU32::new(0),
            back: AtomicU32::new(0),
            slots: [RawEvent::zeroed(); EVENT_RING_SIZE],
        }
    }
}

fn slot_index(counter: u32) -> usize {
    counter as usize & (EVENT_RING_SIZE - 1)
}

/// Borrowed handle over one direction of the ring. Produced by whichever
/// side owns the mapping; never constructed independently of a live
/// segment.
pub struct EventRing<'a> {
    header: &'a EventRingHeader,
}

impl<'a> EventRing<'a> {
    pub fn new(header: &'a EventRingHeader) -> Self {
        EventRing { header }
    }

    fn occupancy(&self) -> u32 {
        let back = self.header.back.load(Ordering::Acquire);
        let front = self.header.front.load(Ordering::Acquire);
        back.wrapping_sub(front)
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// True once the ring holds `EVENT_RING_SIZE - 1` records: one slot
    /// is always left empty so `front == back` is unambiguously "empty"
    /// rather than indistinguishable from "full".
    pub fn is_full(&self) -> bool {
        self.occupancy() as usize >= EVENT_RING_SIZE - 1
    }

    /// Appends an event. Fails with [`Error::RingFull`] rather than
    /// blocking or overwriting; callers that must not drop events wait on
    /// the paired semaphore and retry.
    pub fn try_enqueue(&self, event: RawEvent) -> Result<()> {
        if self.is_full() {
            return Err(Error::RingFull);
        }
        let back = self.header.back.load(Ordering::Relaxed);
        let idx = slot_index(back);

        // SAFETY: idx < EVENT_RING_SIZE and no other writer touches this
        // slot until `back` advances past it again (capacity has not been
        // exceeded, checked above).
        let slot_ptr = self.header.slots.as_ptr().wrapping_add(idx) as *mut RawEvent;
        unsafe { slot_ptr.write(event) };

        self.header.back.store(back.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Non-blocking dequeue of the oldest pending event.
    pub fn poll(&self) -> Result<RawEvent> {
        if self.is_empty() {
            return Err(Error::RingEmpty);
        }
        let front = self.header.front.load(Ordering::Relaxed);
        let idx = slot_index(front);
        let event = self.header.slots[idx];
        self.header.front.store(front.wrapping_add(1), Ordering::Release);
        Ok(event)
    }

    /// Blocking enqueue: retries `try_enqueue` until it succeeds, waiting
    /// on `sem` between attempts (posted by the consumer whenever it
    /// polls and frees a slot). Returns [`Error::PeerGone`] rather than
    /// blocking forever once `dms` reads zero.
    pub fn enqueue(&self, event: RawEvent, sem: &NamedSemaphore, dms: &AtomicU32) -> Result<()> {
        loop {
            match self.try_enqueue(event) {
                Ok(()) => return Ok(()),
                Err(Error::RingFull) => {
                    if dms.load(Ordering::Acquire) == 0 {
                        return Err(Error::PeerGone);
                    }
                    sem.wait()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocking dequeue: retries `poll` until it succeeds, waiting on
    /// `sem` between attempts (posted by the producer after every
    /// enqueue). Returns [`Error::PeerGone`] rather than blocking forever
    /// once `dms` reads zero.
    pub fn wait(&self, sem: &NamedSemaphore, dms: &AtomicU32) -> Result<RawEvent> {
        loop {
            match self.poll() {
                Ok(event) => return Ok(event),
                Err(Error::RingEmpty) => {
                    if dms.load(Ordering::Acquire) == 0 {
                        return Err(Error::PeerGone);
                    }
                    sem.wait()?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: u32) -> RawEvent {
        let mut ev = RawEvent::zeroed();
        ev.category = n;
        ev
    }

    #[test]
    fn fifo_ordering_is_preserved() {
        let header = EventRingHeader::zeroed();
        let ring = EventRing::new(&header);
        for i in 0..5 {
            ring.try_enqueue(filled(i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(ring.poll().unwrap().category, i);
        }
        assert!(matches!(ring.poll(), Err(Error::RingEmpty)));
    }

    #[test]
    fn fills_to_capacity_minus_one_without_error() {
        let header = EventRingHeader::zeroed();
        let ring = EventRing::new(&header);
        for i in 0..(EVENT_RING_SIZE as u32 - 2) {
            ring.try_enqueue(filled(i)).unwrap();
        }
        assert!(!ring.is_full());
        ring.try_enqueue(filled(999)).unwrap();
        assert!(ring.is_full());
    }

    #[test]
    fn thirty_second_enqueue_on_a_full_ring_is_rejected() {
        let header = EventRingHeader::zeroed();
        let ring = EventRing::new(&header);
        for i in 0..(EVENT_RING_SIZE as u32 - 1) {
            ring.try_enqueue(filled(i)).unwrap();
        }
        assert!(ring.is_full());
        assert!(matches!(ring.try_enqueue(filled(0)), Err(Error::RingFull)));
    }

    #[test]
    fn drain_then_refill_wraps_indices_correctly() {
        let header = EventRingHeader::zeroed();
        let ring = EventRing::new(&header);
        for round in 0..3 {
            for i in 0..(EVENT_RING_SIZE as u32 - 1) {
                ring.try_enqueue(filled(round * 100 + i)).unwrap();
            }
            for i in 0..(EVENT_RING_SIZE as u32 - 1) {
                assert_eq!(ring.poll().unwrap().category, round * 100 + i);
            }
        }
    }

    #[test]
    fn blocking_enqueue_completes_once_the_consumer_polls() {
        use std::sync::atomic::AtomicU32;
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let name = format!("/shmif-proto-test-ring-{}", std::process::id());
        let sem = Arc::new(NamedSemaphore::open(&name, 0).unwrap());
        let header = Arc::new(EventRingHeader::zeroed());
        let dms = Arc::new(AtomicU32::new(1));

        // Fill the ring to capacity so the next enqueue must block.
        {
            let ring = EventRing::new(&header);
            for i in 0..(EVENT_RING_SIZE as u32 - 1) {
                ring.try_enqueue(filled(i)).unwrap();
            }
            assert!(ring.is_full());
        }

        let blocked = {
            let header = header.clone();
            let sem = sem.clone();
            let dms = dms.clone();
            thread::spawn(move || {
                let ring = EventRing::new(&header);
                ring.enqueue(filled(999), &sem, &dms).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!blocked.is_finished(), "enqueue should still be blocked on a full ring");

        {
            let ring = EventRing::new(&header);
            ring.poll().unwrap();
        }
        sem.post().unwrap();

        blocked.join().unwrap();
        NamedSemaphore::unlink(&name).unwrap();
    }
}
