// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
mod common;

use common::setup;
use nvme_mi_host::Error;
use nvme_mi_host::mctp::fragment::{Reassembler, Reassembly};
use nvme_mi_host::mctp::{MSG_TYPE_NVME_MI, split_msg_type};
use nvme_mi_host::nvme::mi::Request;
use nvme_mi_host::smbus::{PacketBuilder, PacketOptions, PacketParser, calculate_pec};

#[rustfmt::skip]
const HEALTH_STATUS_POLL: [u8; 13] = [
    0x3a, 0x0f, 0x09,
    0x01, 0x01, 0x00, 0xc8,
    0x04,
    0x01, 0x00, 0x00, 0x00,
    0xa4
];

#[test]
fn health_status_poll_packet() {
    setup();

    let mut builder = PacketBuilder::new();
    let packet = builder
        .build_nvme_mi_request(
            0x01,
            &Request::health_status_poll().pack().unwrap(),
            false,
            &PacketOptions::default(),
        )
        .unwrap();
    assert_eq!(packet, HEALTH_STATUS_POLL);
    assert_eq!(calculate_pec(&HEALTH_STATUS_POLL[..12]), 0xa4);
}

#[test]
fn tag_counter() {
    setup();

    let mut builder = PacketBuilder::new();
    let opts = PacketOptions::default();
    for i in 0..10u8 {
        assert_eq!(builder.current_tag(), i % 8);
        let packet = builder.build_raw(0x01, MSG_TYPE_NVME_MI, &[], &opts).unwrap();
        assert_eq!(packet[6] & 0x07, i % 8);
    }

    builder.set_tag(5);
    let packet = builder
        .build_raw(0x01, MSG_TYPE_NVME_MI, &[], &PacketOptions {
            msg_tag: Some(2),
            ..opts
        })
        .unwrap();
    assert_eq!(packet[6] & 0x07, 2);
    assert_eq!(builder.current_tag(), 5);

    builder.reset_tag();
    assert_eq!(builder.current_tag(), 0);
}

#[test]
fn overrides() {
    setup();

    let mut builder = PacketBuilder::new();
    let opts = PacketOptions {
        src_eid: Some(0x08),
        som: false,
        eom: true,
        pkt_seq: 2,
        msg_tag: Some(3),
        tag_owner: false,
        smbus_addr: Some(0x42),
        include_pec: Some(false),
    };
    let packet = builder.build_raw(0x09, 0x7e, &[0xaa, 0xbb], &opts).unwrap();

    #[rustfmt::skip]
    const EXPECTED: [u8; 10] = [
        0x42, 0x0f, 0x07,
        0x01, 0x09, 0x08, 0x63,
        0x7e,
        0xaa, 0xbb,
    ];
    assert_eq!(packet, EXPECTED);
}

#[test]
fn mctp_control_packet() {
    setup();

    let mut builder = PacketBuilder::new();
    let packet = builder
        .build_mctp_control(0x00, 0x02, &[], &PacketOptions::default())
        .unwrap();
    assert_eq!(packet[2], 0x07);
    assert_eq!(&packet[7..10], [0x00, 0x80, 0x02]);
    assert_eq!(*packet.last().unwrap(), calculate_pec(&packet[..10]));
}

#[test]
fn integrity_check_bit() {
    setup();

    let mut builder = PacketBuilder::new();
    let packet = builder
        .build_nvme_mi_request(0x01, &[], true, &PacketOptions::default())
        .unwrap();
    assert_eq!(packet[7], 0x84);
    assert_eq!(split_msg_type(packet[7]), (MSG_TYPE_NVME_MI, true));
}

#[test]
fn oversized_body() {
    setup();

    let mut builder = PacketBuilder::new();
    let payload = [0u8; 251];
    assert!(matches!(
        builder.build_raw(0x01, MSG_TYPE_NVME_MI, &payload, &PacketOptions::default()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn parse_health_status_poll() {
    setup();

    let packet = PacketParser::default().parse(&HEALTH_STATUS_POLL).unwrap();
    assert_eq!(packet.smbus_addr, 0x3a);
    assert_eq!(packet.byte_count, 9);
    assert_eq!(packet.header.dest_eid, 0x01);
    assert_eq!(packet.header.src_eid, 0x00);
    assert!(packet.header.som && packet.header.eom && packet.header.tag_owner);
    assert_eq!(packet.msg_type, 0x04);
    assert_eq!(packet.payload, [0x01, 0x00, 0x00, 0x00]);
    assert_eq!(packet.pec, Some(0xa4));
    assert_eq!(packet.pack(), HEALTH_STATUS_POLL);
}

#[test]
fn pec_bit_flips() {
    setup();

    let parser = PacketParser::default();
    for i in (0..HEALTH_STATUS_POLL.len()).filter(|&i| i != 2) {
        for bit in 0..8 {
            let mut packet = HEALTH_STATUS_POLL;
            packet[i] ^= 1 << bit;
            assert!(
                matches!(parser.parse(&packet), Err(Error::Pec { .. })),
                "Flip of bit {bit} in byte {i} not detected"
            );
        }
    }
}

#[test]
fn parse_without_pec() {
    setup();

    let parser = PacketParser::new(false);
    let packet = parser.parse(&HEALTH_STATUS_POLL[..12]).unwrap();
    assert_eq!(packet.pec, None);
    assert_eq!(packet.payload, [0x01, 0x00, 0x00, 0x00]);

    // Trailing PEC byte is ignored
    let packet = parser.parse(&HEALTH_STATUS_POLL).unwrap();
    assert_eq!(packet.pec, None);
}

#[test]
fn parse_short() {
    setup();

    let parser = PacketParser::default();
    assert!(matches!(
        parser.parse(&HEALTH_STATUS_POLL[..7]),
        Err(Error::Format(_))
    ));
    assert!(matches!(parser.parse(&[]), Err(Error::Format(_))));

    // Byte count claims more than is present
    assert!(matches!(
        parser.parse(&HEALTH_STATUS_POLL[..12]),
        Err(Error::Format(_))
    ));
}

#[test]
fn parse_byte_count_too_small() {
    setup();

    let mut packet = HEALTH_STATUS_POLL;
    packet[2] = 0x04;
    assert!(matches!(
        PacketParser::new(false).parse(&packet),
        Err(Error::Format(_))
    ));
}

#[test]
fn parse_command_code() {
    setup();

    let mut packet = HEALTH_STATUS_POLL;
    packet[1] = 0x0e;
    packet[12] = calculate_pec(&packet[..12]);
    assert!(matches!(
        PacketParser::default().parse(&packet),
        Err(Error::Format(_))
    ));
}

#[test]
fn fragments_through_parser() {
    setup();

    let payload: Vec<u8> = (0..100).collect();
    let mut builder = PacketBuilder::new();
    builder.set_tag(6);
    let packets = builder
        .build_fragments(0x01, MSG_TYPE_NVME_MI, &payload, 32, &PacketOptions::default())
        .unwrap();
    assert_eq!(packets.len(), 4);
    assert_eq!(builder.current_tag(), 7);

    let parser = PacketParser::default();
    let mut reassembler = Reassembler::new();
    let mut message = None;
    for (i, p) in packets.iter().enumerate() {
        let packet = parser.parse(p).unwrap();
        assert_eq!(packet.header.msg_tag, 6);
        assert_eq!(packet.header.pkt_seq, (i & 3) as u8);
        assert_eq!(packet.header.som, i == 0);
        assert_eq!(packet.header.eom, i == 3);
        if let Reassembly::Complete(m) = reassembler.accept(packet.fragment()).unwrap() {
            message = Some(m);
        }
    }

    let message = message.unwrap();
    assert_eq!(message[0], MSG_TYPE_NVME_MI);
    assert_eq!(&message[1..], payload);
}

#[test]
fn fragments_boundaries() {
    setup();

    let parser = PacketParser::default();
    for max in [4usize, 8, 16] {
        // The body is the message type plus payload
        for len in [max - 1, max, max + 1] {
            let payload = vec![0x5a; len];
            let mut builder = PacketBuilder::new();
            let packets = builder
                .build_fragments(0x01, MSG_TYPE_NVME_MI, &payload, max, &PacketOptions::default())
                .unwrap();
            assert_eq!(packets.len(), (len + 1).div_ceil(max));

            let mut reassembler = Reassembler::new();
            let res: Vec<Reassembly> = packets
                .iter()
                .map(|p| reassembler.accept(parser.parse(p).unwrap().fragment()).unwrap())
                .collect();
            let Some(Reassembly::Complete(m)) = res.last() else {
                panic!("Message incomplete for len {len}, max {max}");
            };
            assert_eq!(m.len(), len + 1);
        }
    }
}

#[test]
fn fragment_out_of_order() {
    setup();

    let payload: Vec<u8> = (0..20).collect();
    let mut builder = PacketBuilder::new();
    let packets = builder
        .build_fragments(0x01, MSG_TYPE_NVME_MI, &payload, 8, &PacketOptions::default())
        .unwrap();
    assert_eq!(packets.len(), 3);

    let parser = PacketParser::default();
    let mut reassembler = Reassembler::new();
    let frag = |i: usize| parser.parse(&packets[i]).unwrap().fragment();

    assert_eq!(reassembler.accept(frag(0)).unwrap(), Reassembly::Incomplete);
    assert!(matches!(reassembler.accept(frag(2)), Err(Error::Sequence(_))));
    assert_eq!(reassembler.in_flight(), 0);
    assert!(matches!(reassembler.accept(frag(1)), Err(Error::Sequence(_))));
}
