//! Background frame pump.
//!
//! One reader task per open session owns the transport's read side. It
//! feeds the incremental decoder, parses complete frames, and hands each
//! packet to the three consumers in a fixed order: the correlation table
//! (synchronous waiters), the lookaside queue, and the event channel.
//! Event subscribers therefore observe frames in exactly the order they
//! arrived on the wire.
//!
//! The task exits promptly when the session closes (shutdown notify or
//! closing flag) or the transport reports closed. Corrupt frames cost a
//! warning and a resynchronization, never the task.

use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

use tracing::{debug, trace, warn};

use apiary_proto::{
    packet::IoSample, Addr16, Addr64, FrameDecoder, Packet, RelayInterface,
};

use crate::{
    device::SessionState,
    error::TransportError,
    events::{Event, ExplicitData, IoSampleData, IpData, ReceivedData},
    network::RemoteNode,
};

/// How long a single transport read waits before the loop re-checks the
/// shutdown flag and the operating mode.
const READ_POLL: Duration = Duration::from_millis(100);

/// Read buffer size; frames are small, this covers several per pass.
const READ_BUF_LEN: usize = 512;

/// Spawn the reader task for a session.
pub(crate) fn spawn(state: Arc<SessionState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state))
}

async fn run(state: Arc<SessionState>) {
    let mut decoder = FrameDecoder::new(state.mode());
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        if state.closing.load(Ordering::Acquire) {
            break;
        }

        // The mode can change under us during the open handshake. Only a
        // change in escaping semantics warrants resetting the decoder
        // (Unknown and Api both decode plain); a gratuitous reset could
        // drop a frame split across reads.
        let mode = state.mode();
        if decoder.mode().is_escaped() != mode.is_escaped() {
            decoder.set_mode(mode);
        }

        let read = tokio::select! {
            () = state.shutdown.notified() => break,
            read = state.transport.read(&mut buf, READ_POLL) => read,
        };

        match read {
            Ok(0) => {},
            Ok(n) => {
                // The command-mode probe listens to the raw stream; API
                // decoding continues regardless (a module in transparent
                // mode produces no delimiters for it to chew on).
                state.tap_bytes(&buf[..n]);

                for &byte in &buf[..n] {
                    match decoder.decode(byte) {
                        Ok(Some(frame)) => handle_frame(&state, &frame).await,
                        Ok(None) => {},
                        Err(err) => {
                            warn!(error = %err, "discarding corrupt frame");
                        },
                    }
                }
            },
            Err(TransportError::TimedOut) => {},
            Err(TransportError::Closed) => {
                debug!("transport closed, reader exiting");
                break;
            },
            Err(err) => {
                warn!(error = %err, "transport read failed, reader exiting");
                break;
            },
        }
    }

    // No further events or responses can arrive; fail the waiters now
    // rather than letting them run out their timeouts.
    state.pending.close();
}

/// Process one complete, checksum-verified frame payload.
async fn handle_frame(state: &Arc<SessionState>, frame: &[u8]) {
    let packet = match Packet::parse(frame) {
        Ok(packet) => packet,
        Err(err) => {
            warn!(error = %err, "discarding unparseable frame");
            return;
        },
    };
    trace!(frame_type = packet.frame_type_byte(), "frame received");

    if let Some(node) = source_node(&packet) {
        state.network.add(node);
    }

    // Waiters first: a correlated response is also queued and published,
    // but resolving before queueing keeps the sync path prompt.
    state.pending.resolve(&packet);

    state.queue.push(packet.clone()).await;

    emit_events(state, packet);
}

/// Derive the remote node a frame came from, for auto-registration.
fn source_node(packet: &Packet) -> Option<RemoteNode> {
    let node = match packet {
        Packet::Receive(rx) => RemoteNode::new(rx.source64, rx.source16),
        Packet::ExplicitRx(rx) => RemoteNode::new(rx.source64, rx.source16),
        Packet::IoSampleRx(rx) => RemoteNode::new(rx.source64, rx.source16),
        Packet::Rx64(rx) => {
            let mut node = RemoteNode::new(rx.source, Addr16::UNKNOWN);
            node.rssi = Some(rx.rssi);
            node
        },
        Packet::Rx16(rx) => {
            let mut node = RemoteNode::new(Addr64::UNKNOWN, rx.source);
            node.rssi = Some(rx.rssi);
            node
        },
        Packet::Rx64Io(rx) => {
            let mut node = RemoteNode::new(rx.source, Addr16::UNKNOWN);
            node.rssi = Some(rx.rssi);
            node
        },
        Packet::Rx16Io(rx) => {
            let mut node = RemoteNode::new(Addr64::UNKNOWN, rx.source);
            node.rssi = Some(rx.rssi);
            node
        },
        _ => return None,
    };
    Some(node)
}

/// Fan a packet out to the event channel.
fn emit_events(state: &Arc<SessionState>, packet: Packet) {
    state.emit(Event::PacketReceived(packet.clone()));

    match packet {
        Packet::Receive(rx) => {
            state.emit(Event::DataReceived(ReceivedData {
                source64: rx.source64,
                source16: rx.source16,
                is_broadcast: rx.options.is_broadcast(),
                data: rx.data,
            }));
        },
        Packet::Rx64(rx) => {
            state.emit(Event::DataReceived(ReceivedData {
                source64: rx.source,
                source16: Addr16::UNKNOWN,
                is_broadcast: rx.options.is_broadcast(),
                data: rx.data,
            }));
        },
        Packet::Rx16(rx) => {
            state.emit(Event::DataReceived(ReceivedData {
                source64: Addr64::UNKNOWN,
                source16: rx.source,
                is_broadcast: rx.options.is_broadcast(),
                data: rx.data,
            }));
        },
        Packet::ExplicitRx(rx) => {
            state.emit(Event::ExplicitDataReceived(ExplicitData {
                source64: rx.source64,
                source16: rx.source16,
                src_endpoint: rx.src_endpoint,
                dst_endpoint: rx.dst_endpoint,
                cluster_id: rx.cluster_id,
                profile_id: rx.profile_id,
                is_broadcast: rx.options.is_broadcast(),
                data: rx.data,
            }));
        },
        Packet::IoSampleRx(rx) => match IoSample::parse(&rx.sample_data) {
            Ok(sample) => {
                state.emit(Event::IoSampleReceived(IoSampleData {
                    source64: rx.source64,
                    source16: rx.source16,
                    sample,
                }));
            },
            Err(err) => warn!(error = %err, "discarding unparseable I/O sample"),
        },
        Packet::Rx64Io(rx) => match IoSample::parse_legacy(&rx.sample_data) {
            Ok(sample) => {
                state.emit(Event::IoSampleReceived(IoSampleData {
                    source64: rx.source,
                    source16: Addr16::UNKNOWN,
                    sample,
                }));
            },
            Err(err) => warn!(error = %err, "discarding unparseable I/O sample"),
        },
        Packet::Rx16Io(rx) => match IoSample::parse_legacy(&rx.sample_data) {
            Ok(sample) => {
                state.emit(Event::IoSampleReceived(IoSampleData {
                    source64: Addr64::UNKNOWN,
                    source16: rx.source,
                    sample,
                }));
            },
            Err(err) => warn!(error = %err, "discarding unparseable I/O sample"),
        },
        Packet::ModemStatus(status) => {
            state.emit(Event::ModemStatusReceived(status.status));
        },
        Packet::UserDataRelayOutput(relay) => {
            state.emit(Event::UserDataRelayReceived {
                source: relay.source,
                data: relay.data.clone(),
            });
            let interface_event = match relay.source {
                RelayInterface::Bluetooth => Event::BluetoothDataReceived(relay.data),
                RelayInterface::MicroPython => Event::MicroPythonDataReceived(relay.data),
                RelayInterface::Serial => Event::SerialDataReceived(relay.data),
            };
            state.emit(interface_event);
        },
        Packet::RxIpv4(rx) => {
            state.emit(Event::IpDataReceived(IpData {
                source: rx.source,
                dest_port: rx.dest_port,
                src_port: rx.src_port,
                data: rx.data,
            }));
        },
        Packet::RxSms(sms) => {
            state.emit(Event::SmsReceived {
                phone_number: sms.phone_number,
                message: sms.message,
            });
        },
        _ => {},
    }
}
