//! Request/response correlation table.
//!
//! Each synchronous send registers a one-shot waiter keyed by its frame
//! id before the bytes leave the transport. The reader resolves waiters
//! as frames arrive: a frame completes a waiter when the frame id and
//! expected response type match, the AT command name matches (for AT
//! exchanges), and the frame is not a byte-for-byte echo of the request.
//!
//! # Invariants
//!
//! - At most one waiter is resolved per incoming frame.
//! - Duplicate frame ids are first-wins: the earliest registered waiter
//!   matching a frame gets it.
//! - Closing the table drops every sender, which the waiting side
//!   observes as the interface closing.

use std::{collections::HashMap, sync::Mutex};

use bytes::Bytes;
use tokio::sync::oneshot;

use apiary_proto::{AtCmd, FrameType, Packet};

/// What a registered waiter is waiting for.
#[derive(Debug)]
struct Waiter {
    /// Response frame type that completes this exchange.
    expected: FrameType,
    /// AT command name to match, for AT exchanges.
    command: Option<AtCmd>,
    /// Serialized request payload, for echo rejection.
    sent_payload: Bytes,
    /// Completion channel.
    tx: oneshot::Sender<Packet>,
}

/// Handle returned to the sender; resolves to the matched response.
#[derive(Debug)]
pub(crate) struct ResponseHandle {
    pub(crate) rx: oneshot::Receiver<Packet>,
    pub(crate) frame_id: u8,
    pub(crate) token: usize,
}

/// Table of in-flight synchronous requests.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Waiters per frame id, in registration order.
    by_frame_id: HashMap<u8, Vec<(usize, Waiter)>>,
    /// Monotonic token distinguishing waiters that share a frame id.
    next_token: usize,
    /// Set once the session closes; registrations are refused.
    closed: bool,
}

impl PendingRequests {
    /// Register a waiter for `frame_id` expecting `expected`.
    ///
    /// Returns `None` if the table was closed (session shut down).
    pub(crate) fn register(
        &self,
        frame_id: u8,
        expected: FrameType,
        command: Option<AtCmd>,
        sent_payload: Bytes,
    ) -> Option<ResponseHandle> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.closed {
            return None;
        }
        let token = inner.next_token;
        inner.next_token = inner.next_token.wrapping_add(1);
        inner
            .by_frame_id
            .entry(frame_id)
            .or_default()
            .push((token, Waiter { expected, command, sent_payload, tx }));
        Some(ResponseHandle { rx, frame_id, token })
    }

    /// Remove a waiter that timed out or was cancelled.
    pub(crate) fn remove(&self, frame_id: u8, token: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(waiters) = inner.by_frame_id.get_mut(&frame_id) {
            waiters.retain(|(t, _)| *t != token);
            if waiters.is_empty() {
                inner.by_frame_id.remove(&frame_id);
            }
        }
    }

    /// Offer an incoming packet to the table.
    ///
    /// Resolves and removes the first matching waiter; returns whether
    /// one was resolved.
    pub(crate) fn resolve(&self, packet: &Packet) -> bool {
        let Some(frame_id) = packet.frame_id() else {
            return false;
        };
        let Some(frame_type) = packet.frame_type() else {
            return false;
        };

        let payload = packet.serialize();

        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(waiters) = inner.by_frame_id.get_mut(&frame_id) else {
            return false;
        };

        let position = waiters.iter().position(|(_, waiter)| {
            if waiter.expected != frame_type {
                return false;
            }
            if let Some(sent_cmd) = &waiter.command {
                match response_command(packet) {
                    Some(got) if sent_cmd.matches(&got) => {},
                    _ => return false,
                }
            }
            // Echo rejection: a local loopback hands us our own request
            // bytes, which carry the right frame id but must not satisfy
            // the wait.
            waiter.sent_payload != payload
        });

        let Some(position) = position else {
            return false;
        };
        let (_, waiter) = waiters.remove(position);
        if waiters.is_empty() {
            inner.by_frame_id.remove(&frame_id);
        }
        // The receiver may have timed out between our check and this
        // send; a failed send just drops the packet for this waiter.
        waiter.tx.send(packet.clone()).is_ok()
    }

    /// Close the table: refuse new registrations and fail every waiter.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.closed = true;
        inner.by_frame_id.clear();
    }

    /// Number of in-flight waiters (diagnostics).
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_frame_id.values().map(Vec::len).sum()
    }
}

/// Command name of a response packet, for AT name matching.
fn response_command(packet: &Packet) -> Option<AtCmd> {
    match packet {
        Packet::AtCommandResponse(resp) => Some(resp.command),
        Packet::RemoteAtCommandResponse(resp) => Some(resp.command),
        _ => None,
    }
}
