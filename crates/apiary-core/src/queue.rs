//! Bounded lookaside packet queue.
//!
//! Every frame the reader decodes lands here, in arrival order, for
//! synchronous consumers that poll by filter (`read_data`,
//! `read_explicit_data`, …). The queue is a few dozen entries deep; when
//! it overflows the oldest packet is dropped, on the theory that a
//! consumer slow enough to overflow it cares more about fresh traffic
//! than stale.
//!
//! Filtered gets skip non-matching packets without consuming them, so a
//! data packet sitting in front of an awaited relay packet is still there
//! for the next `read_data` call.

use std::{collections::VecDeque, net::Ipv4Addr, time::Duration};

use tokio::sync::{Mutex, Notify};

use apiary_proto::{Addr16, Addr64, Packet};

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Bounded FIFO of decoded packets with filtered blocking gets.
#[derive(Debug)]
pub struct PacketQueue {
    inner: Mutex<VecDeque<Packet>>,
    arrived: Notify,
    capacity: usize,
}

impl PacketQueue {
    /// Create a queue holding up to `capacity` packets.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            arrived: Notify::new(),
            capacity,
        }
    }

    /// Append a packet, dropping the oldest if the queue is full.
    pub async fn push(&self, packet: Packet) {
        let mut queue = self.inner.lock().await;
        if queue.len() == self.capacity {
            let dropped = queue.pop_front();
            tracing::warn!(
                frame_type = dropped.as_ref().map(Packet::frame_type_byte),
                "packet queue overflow, dropping oldest"
            );
        }
        queue.push_back(packet);
        drop(queue);
        self.arrived.notify_waiters();
    }

    /// Number of packets currently queued.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop all queued packets.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Remove and return the first packet matching `filter`, waiting up
    /// to `timeout` for one to arrive. Skipped packets stay queued.
    ///
    /// Returns `None` on timeout.
    pub async fn first_matching(
        &self,
        timeout: Duration,
        mut filter: impl FnMut(&Packet) -> bool,
    ) -> Option<Packet> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Arm the notification before scanning so a push between the
            // scan and the wait is not missed. `enable` registers the
            // waiter; without it `notify_waiters` would pass us by.
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            {
                let mut queue = self.inner.lock().await;
                if let Some(index) = queue.iter().position(&mut filter) {
                    return queue.remove(index);
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            // On expiry, loop once more: the final scan above decides.
            let _ = tokio::time::timeout(remaining, arrived).await;
        }
    }

    /// First packet of any kind.
    pub async fn first_packet(&self, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, |_| true).await
    }

    /// First data packet (receive indicator or legacy RX).
    pub async fn first_data_packet(&self, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, is_data).await
    }

    /// First data packet from the given 64-bit address.
    pub async fn first_data_packet_from(&self, addr: Addr64, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, move |p| is_data(p) && data_source64(p) == Some(addr)).await
    }

    /// First data packet from the given 16-bit address.
    pub async fn first_data_packet_from16(
        &self,
        addr: Addr16,
        timeout: Duration,
    ) -> Option<Packet> {
        self.first_matching(timeout, move |p| is_data(p) && data_source16(p) == Some(addr)).await
    }

    /// First explicit-addressing data packet.
    pub async fn first_explicit_data_packet(&self, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, |p| matches!(p, Packet::ExplicitRx(_))).await
    }

    /// First explicit-addressing data packet from the given address.
    pub async fn first_explicit_data_packet_from(
        &self,
        addr: Addr64,
        timeout: Duration,
    ) -> Option<Packet> {
        self.first_matching(timeout, move |p| {
            matches!(p, Packet::ExplicitRx(rx) if rx.source64 == addr)
        })
        .await
    }

    /// First IPv4 data packet.
    pub async fn first_ip_data_packet(&self, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, |p| matches!(p, Packet::RxIpv4(_))).await
    }

    /// First IPv4 data packet from the given source address.
    pub async fn first_ip_data_packet_from(
        &self,
        ip: Ipv4Addr,
        timeout: Duration,
    ) -> Option<Packet> {
        self.first_matching(timeout, move |p| {
            matches!(p, Packet::RxIpv4(rx) if rx.source == ip)
        })
        .await
    }

    /// First user data relay output packet.
    pub async fn first_user_data_relay_packet(&self, timeout: Duration) -> Option<Packet> {
        self.first_matching(timeout, |p| matches!(p, Packet::UserDataRelayOutput(_))).await
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn is_data(packet: &Packet) -> bool {
    matches!(packet, Packet::Receive(_) | Packet::Rx64(_) | Packet::Rx16(_))
}

fn data_source64(packet: &Packet) -> Option<Addr64> {
    match packet {
        Packet::Receive(rx) => Some(rx.source64),
        Packet::Rx64(rx) => Some(rx.source),
        Packet::Rx16(_) => None,
        _ => None,
    }
}

fn data_source16(packet: &Packet) -> Option<Addr16> {
    match packet {
        Packet::Receive(rx) => Some(rx.source16),
        Packet::Rx16(rx) => Some(rx.source),
        Packet::Rx64(_) => None,
        _ => None,
    }
}
