use anyhow::Result;
use bytes::Bytes;
use rtp_stream_codec::{Error, HEADER_SIZE, PT_AUDIO, PT_FEC, PT_NACK, PT_RTX, RtpPacket};

#[test]
#[rustfmt::skip]
fn test_header_layout() {
    let mut packet = RtpPacket::new_media(PT_AUDIO, 0x0102, 0x0a0b0c0d, 0x11223344, Bytes::from_static(b"xy"));
    packet.marker = true;
    packet.csrc = vec![0x55667788];

    assert_eq!(
        packet.to_bytes().as_ref(),
        &[
            0x81, 0xe0, 0x01, 0x02,
            0x0a, 0x0b, 0x0c, 0x0d,
            0x11, 0x22, 0x33, 0x44,
            0x55, 0x66, 0x77, 0x88,
            b'x', b'y',
        ]
    );
}

#[test]
fn test_round_trip() -> Result<()> {
    let mut packet = RtpPacket::new_media(PT_AUDIO, 65535, u32::MAX, 0xcafebabe, Bytes::from_static(&[0u8; 320]));
    packet.padding = true;
    packet.extension = true;
    packet.marker = true;
    packet.csrc = vec![1, 2, 3];

    let decoded = RtpPacket::decode(&packet.to_bytes())?;
    assert_eq!(decoded, packet);

    // Empty payload still round-trips to the bare header.
    let empty = RtpPacket::new_media(PT_AUDIO, 0, 0, 0, Bytes::new());
    assert_eq!(empty.to_bytes().len(), HEADER_SIZE);
    assert_eq!(RtpPacket::decode(&empty.to_bytes())?, empty);

    Ok(())
}

#[test]
fn test_decode_failures() {
    assert_eq!(RtpPacket::decode(&[]), Err(Error::MalformedHeader));
    assert_eq!(RtpPacket::decode(&[0x80; 11]), Err(Error::MalformedHeader));

    // Header claims three CSRC entries but carries only one.
    let mut bytes = RtpPacket::new_media(PT_AUDIO, 1, 2, 3, Bytes::new()).to_bytes().to_vec();
    bytes[0] |= 0x03;
    bytes.extend_from_slice(&[0, 0, 0, 9]);
    assert_eq!(RtpPacket::decode(&bytes), Err(Error::TruncatedCsrc));
}

#[test]
fn test_unknown_payload_type_is_opaque() -> Result<()> {
    let mut bytes = RtpPacket::new_media(PT_AUDIO, 1, 2, 3, Bytes::from_static(b"data")).to_bytes().to_vec();
    bytes[1] = 0x7f;

    let decoded = RtpPacket::decode(&bytes)?;
    assert_eq!(decoded.payload_type, 127);
    assert_eq!(decoded.payload.as_ref(), b"data");
    assert_eq!(decoded.nack_sequence_numbers(), Err(Error::WrongPacketType));
    assert_eq!(decoded.original_seq(), None);

    Ok(())
}

#[test]
fn test_nack() -> Result<()> {
    let seqs = [0u16, 5, 65535, 32768];
    let nack = RtpPacket::new_nack(&seqs, 7);

    assert_eq!(nack.payload_type, PT_NACK);
    assert_eq!(nack.payload.len(), seqs.len() * 2);
    assert_eq!(nack.nack_sequence_numbers()?, seqs.to_vec());

    let decoded = RtpPacket::decode(&nack.to_bytes())?;
    assert_eq!(decoded.nack_sequence_numbers()?, seqs.to_vec());

    let media = RtpPacket::new_media(PT_AUDIO, 1, 2, 3, Bytes::new());
    assert_eq!(media.nack_sequence_numbers(), Err(Error::WrongPacketType));

    Ok(())
}

#[test]
fn test_rtx() -> Result<()> {
    let original = RtpPacket::new_media(PT_AUDIO, 1000, 160000, 42, Bytes::from_static(b"frame"));
    let rtx = RtpPacket::new_rtx(&original);

    assert_eq!(rtx.payload_type, PT_RTX);
    assert_eq!(rtx.seq_num, original.seq_num);
    assert_eq!(rtx.timestamp, original.timestamp);
    assert_eq!(rtx.ssrc, original.ssrc);
    assert_eq!(rtx.original_seq(), Some(1000));
    assert_eq!(rtx.rtx_payload().unwrap(), original.payload);

    // The original sequence number survives the wire.
    let decoded = RtpPacket::decode(&rtx.to_bytes())?;
    assert_eq!(decoded, rtx);
    assert_eq!(decoded.original_seq, Some(1000));

    assert_eq!(original.original_seq(), None);
    assert_eq!(original.rtx_payload(), None);

    Ok(())
}

#[test]
fn test_fec_envelope_is_opaque() -> Result<()> {
    // The codec does not interpret FEC payloads; they ride through as-is.
    let fec = RtpPacket::new_media(PT_FEC, 4, 480, 9, Bytes::from_static(&[0, 1, 0, 2, 0xff]));
    let decoded = RtpPacket::decode(&fec.to_bytes())?;

    assert_eq!(decoded.payload_type, PT_FEC);
    assert_eq!(decoded.payload, fec.payload);

    Ok(())
}
