//! Property-based round-trip tests for the packet model.
//!
//! Every packet variant, with arbitrary field assignments, must survive
//! `parse(serialize(p)) == p` — both directly and when carried through the
//! full frame codec in plain and escaped modes.

use apiary_proto::{
    codec,
    packet::{
        AtCommand, AtCommandQueue, AtCommandResponse, ExplicitAddressing, ExplicitRx, IoSampleRx,
        ModemStatusPacket, ReceivePacket, RemoteAtCommand, RemoteAtCommandResponse, Rx16, Rx16Io,
        Rx64, Rx64Io, TransmitRequest, TransmitStatus, Tx16, Tx64, TxIpv4, TxSms, TxStatus,
        UserDataRelay, UserDataRelayOutput,
    },
    Addr16, Addr64, AtCmd, AtCommandStatus, DeliveryStatus, FrameDecoder, IpProtocol, ModemStatus,
    OperatingMode, Packet, ReceiveOptions, RelayInterface, TransmitOptions,
};
use bytes::Bytes;
use proptest::prelude::*;

fn arbitrary_addr64() -> impl Strategy<Value = Addr64> {
    any::<u64>().prop_map(Addr64::from_u64)
}

fn arbitrary_addr16() -> impl Strategy<Value = Addr16> {
    any::<u16>().prop_map(Addr16::from_u16)
}

fn arbitrary_at_cmd() -> impl Strategy<Value = AtCmd> {
    prop::array::uniform2(b'0'..=b'Z').prop_map(AtCmd)
}

fn arbitrary_data() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(Bytes::from)
}

fn arbitrary_relay_interface() -> impl Strategy<Value = RelayInterface> {
    prop_oneof![
        Just(RelayInterface::Serial),
        Just(RelayInterface::Bluetooth),
        Just(RelayInterface::MicroPython),
    ]
}

fn arbitrary_phone() -> impl Strategy<Value = String> {
    "[0-9]{1,19}"
}

/// One strategy per packet variant, combined below.
fn arbitrary_packet() -> impl Strategy<Value = Packet> {
    let at = (any::<u8>(), arbitrary_at_cmd(), arbitrary_data())
        .prop_map(|(id, cmd, param)| Packet::AtCommand(AtCommand::set(id, cmd, param)));

    let at_queue = (any::<u8>(), arbitrary_at_cmd(), arbitrary_data()).prop_map(
        |(frame_id, command, parameter)| {
            Packet::AtCommandQueue(AtCommandQueue { frame_id, command, parameter })
        },
    );

    let at_response = (any::<u8>(), arbitrary_at_cmd(), any::<u8>(), arbitrary_data()).prop_map(
        |(frame_id, command, status, value)| {
            Packet::AtCommandResponse(AtCommandResponse {
                frame_id,
                command,
                status: AtCommandStatus::from_u8(status),
                value,
            })
        },
    );

    let remote_at = (
        any::<u8>(),
        arbitrary_addr64(),
        arbitrary_addr16(),
        any::<u8>(),
        arbitrary_at_cmd(),
        arbitrary_data(),
    )
        .prop_map(|(frame_id, dest64, dest16, options, command, parameter)| {
            Packet::RemoteAtCommand(RemoteAtCommand {
                frame_id,
                dest64,
                dest16,
                options,
                command,
                parameter,
            })
        });

    let remote_at_response = (
        any::<u8>(),
        arbitrary_addr64(),
        arbitrary_addr16(),
        arbitrary_at_cmd(),
        any::<u8>(),
        arbitrary_data(),
    )
        .prop_map(|(frame_id, source64, source16, command, status, value)| {
            Packet::RemoteAtCommandResponse(RemoteAtCommandResponse {
                frame_id,
                source64,
                source16,
                command,
                status: AtCommandStatus::from_u8(status),
                value,
            })
        });

    let transmit = (
        any::<u8>(),
        arbitrary_addr64(),
        arbitrary_addr16(),
        any::<u8>(),
        any::<u8>(),
        arbitrary_data(),
    )
        .prop_map(|(frame_id, dest64, dest16, radius, options, data)| {
            Packet::TransmitRequest(TransmitRequest {
                frame_id,
                dest64,
                dest16,
                broadcast_radius: radius,
                options: TransmitOptions::from_bits(options),
                data,
            })
        });

    let explicit = (
        any::<u8>(),
        arbitrary_addr64(),
        arbitrary_addr16(),
        any::<(u8, u8, u16, u16)>(),
        any::<u8>(),
        arbitrary_data(),
    )
        .prop_map(|(frame_id, dest64, dest16, (src_ep, dst_ep, cluster, profile), options, data)| {
            Packet::ExplicitAddressing(ExplicitAddressing {
                frame_id,
                dest64,
                dest16,
                src_endpoint: src_ep,
                dst_endpoint: dst_ep,
                cluster_id: cluster,
                profile_id: profile,
                broadcast_radius: 0,
                options: TransmitOptions::from_bits(options),
                data,
            })
        });

    prop_oneof![at, at_queue, at_response, remote_at, remote_at_response, transmit, explicit]
}

/// Second half of the variant space (proptest tuples cap out; two groups
/// keep the strategies readable).
fn arbitrary_packet_indicators() -> impl Strategy<Value = Packet> {
    let tx64 = (any::<u8>(), arbitrary_addr64(), any::<u8>(), arbitrary_data()).prop_map(
        |(frame_id, dest, options, data)| {
            Packet::Tx64(Tx64 {
                frame_id,
                dest,
                options: TransmitOptions::from_bits(options),
                data,
            })
        },
    );

    let tx16 = (any::<u8>(), arbitrary_addr16(), any::<u8>(), arbitrary_data()).prop_map(
        |(frame_id, dest, options, data)| {
            Packet::Tx16(Tx16 {
                frame_id,
                dest,
                options: TransmitOptions::from_bits(options),
                data,
            })
        },
    );

    let transmit_status = (any::<u8>(), arbitrary_addr16(), any::<(u8, u8, u8)>()).prop_map(
        |(frame_id, dest16, (retries, delivery, discovery))| {
            Packet::TransmitStatus(TransmitStatus {
                frame_id,
                dest16,
                retry_count: retries,
                delivery: DeliveryStatus::from_u8(delivery),
                discovery,
            })
        },
    );

    let tx_status = (any::<u8>(), any::<u8>()).prop_map(|(frame_id, delivery)| {
        Packet::TxStatus(TxStatus { frame_id, delivery: DeliveryStatus::from_u8(delivery) })
    });

    let receive = (arbitrary_addr64(), arbitrary_addr16(), any::<u8>(), arbitrary_data())
        .prop_map(|(source64, source16, options, data)| {
            Packet::Receive(ReceivePacket {
                source64,
                source16,
                options: ReceiveOptions::from_bits(options),
                data,
            })
        });

    let rx64 = (arbitrary_addr64(), any::<u8>(), any::<u8>(), arbitrary_data()).prop_map(
        |(source, rssi, options, data)| {
            Packet::Rx64(Rx64 { source, rssi, options: ReceiveOptions::from_bits(options), data })
        },
    );

    let rx16 = (arbitrary_addr16(), any::<u8>(), any::<u8>(), arbitrary_data()).prop_map(
        |(source, rssi, options, data)| {
            Packet::Rx16(Rx16 { source, rssi, options: ReceiveOptions::from_bits(options), data })
        },
    );

    let explicit_rx = (
        arbitrary_addr64(),
        arbitrary_addr16(),
        any::<(u8, u8, u16, u16)>(),
        any::<u8>(),
        arbitrary_data(),
    )
        .prop_map(|(source64, source16, (src_ep, dst_ep, cluster, profile), options, data)| {
            Packet::ExplicitRx(ExplicitRx {
                source64,
                source16,
                src_endpoint: src_ep,
                dst_endpoint: dst_ep,
                cluster_id: cluster,
                profile_id: profile,
                options: ReceiveOptions::from_bits(options),
                data,
            })
        });

    let io_sample = (arbitrary_addr64(), arbitrary_addr16(), any::<u8>(), arbitrary_data())
        .prop_map(|(source64, source16, options, sample_data)| {
            Packet::IoSampleRx(IoSampleRx {
                source64,
                source16,
                options: ReceiveOptions::from_bits(options),
                sample_data,
            })
        });

    let rx64_io = (arbitrary_addr64(), any::<u8>(), any::<u8>(), arbitrary_data()).prop_map(
        |(source, rssi, options, sample_data)| {
            Packet::Rx64Io(Rx64Io {
                source,
                rssi,
                options: ReceiveOptions::from_bits(options),
                sample_data,
            })
        },
    );

    let rx16_io = (arbitrary_addr16(), any::<u8>(), any::<u8>(), arbitrary_data()).prop_map(
        |(source, rssi, options, sample_data)| {
            Packet::Rx16Io(Rx16Io {
                source,
                rssi,
                options: ReceiveOptions::from_bits(options),
                sample_data,
            })
        },
    );

    let modem_status = any::<u8>().prop_map(|status| {
        Packet::ModemStatus(ModemStatusPacket { status: ModemStatus::from_u8(status) })
    });

    let relay = (any::<u8>(), arbitrary_relay_interface(), arbitrary_data()).prop_map(
        |(frame_id, dest, data)| {
            Packet::UserDataRelay(UserDataRelay { frame_id, dest, data })
        },
    );

    let relay_output = (arbitrary_relay_interface(), arbitrary_data())
        .prop_map(|(source, data)| {
            Packet::UserDataRelayOutput(UserDataRelayOutput { source, data })
        });

    let tx_ipv4 = (
        any::<u8>(),
        any::<[u8; 4]>(),
        any::<(u16, u16)>(),
        any::<u8>(),
        any::<u8>(),
        arbitrary_data(),
    )
        .prop_map(|(frame_id, ip, (dest_port, src_port), protocol, options, data)| {
            Packet::TxIpv4(TxIpv4 {
                frame_id,
                dest: ip.into(),
                dest_port,
                src_port,
                protocol: IpProtocol::from_u8(protocol),
                options,
                data,
            })
        });

    let tx_sms = (any::<u8>(), arbitrary_phone(), arbitrary_data()).prop_map(
        |(frame_id, phone, message)| {
            Packet::TxSms(TxSms::new(frame_id, &phone, message).unwrap())
        },
    );

    let transmits: BoxedStrategy<Packet> =
        prop_oneof![tx64, tx16, transmit_status, tx_status, receive, rx64, rx16, explicit_rx]
            .boxed();
    let indicators: BoxedStrategy<Packet> = prop_oneof![
        io_sample,
        rx64_io,
        rx16_io,
        modem_status,
        relay,
        relay_output,
        tx_ipv4,
        tx_sms,
    ]
    .boxed();
    prop_oneof![transmits, indicators]
}

fn any_packet() -> impl Strategy<Value = Packet> {
    prop_oneof![arbitrary_packet(), arbitrary_packet_indicators()]
}

#[test]
fn prop_packet_roundtrip() {
    proptest!(|(packet in any_packet())| {
        let payload = packet.serialize();

        // PROPERTY: parse(serialize(p)) == p
        let parsed = Packet::parse(&payload).unwrap();
        prop_assert_eq!(&parsed, &packet);

        // PROPERTY: the first payload byte is the frame type discriminant
        prop_assert_eq!(payload[0], packet.frame_type_byte());
    });
}

#[test]
fn prop_packet_roundtrip_through_codec() {
    proptest!(|(packet in any_packet())| {
        for mode in [OperatingMode::Api, OperatingMode::ApiEscape] {
            let wire = codec::encode_frame(&packet.serialize(), mode).unwrap();

            let mut decoder = FrameDecoder::new(mode);
            let mut decoded = None;
            for &byte in wire.iter() {
                if let Some(frame) = decoder.decode(byte).unwrap() {
                    decoded = Some(frame);
                }
            }

            // PROPERTY: full wire round-trip is identity in both modes
            let frame = decoded.unwrap();
            prop_assert_eq!(Packet::parse(&frame).unwrap(), packet.clone());
        }
    });
}

#[test]
fn prop_receive_broadcast_predicate() {
    proptest!(|(options in any::<u8>(), addr in any::<u64>())| {
        let packet = Packet::Receive(ReceivePacket {
            source64: Addr64::from_u64(addr),
            source16: Addr16::UNKNOWN,
            options: ReceiveOptions::from_bits(options),
            data: Bytes::new(),
        });

        // PROPERTY: broadcast iff receive-options bit 1 or bit 2 is set
        prop_assert_eq!(packet.is_broadcast(), options & 0x06 != 0);
    });
}

#[test]
fn prop_frame_id_only_on_request_frames() {
    proptest!(|(packet in any_packet())| {
        // PROPERTY: needs_frame_id() agrees with frame_id() presence
        prop_assert_eq!(packet.needs_frame_id(), packet.frame_id().is_some());
    });
}

#[test]
fn unknown_frame_type_is_preserved() {
    let payload = [0xA3, 0x01, 0x02, 0x03];
    let packet = Packet::parse(&payload).unwrap();
    let Packet::Unknown(ref unknown) = packet else {
        panic!("expected unknown packet");
    };
    assert_eq!(unknown.frame_type, 0xA3);
    assert_eq!(&unknown.body[..], &[0x01, 0x02, 0x03]);
    assert_eq!(&packet.serialize()[..], &payload);
}
