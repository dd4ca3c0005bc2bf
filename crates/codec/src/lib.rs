//! ## RTP: A Transport Protocol for Real-Time Applications
//!
//! [RFC3550]: https://tools.ietf.org/html/rfc3550
//!
//! The real-time transport protocol (RTP) provides end-to-end delivery
//! services for data with real-time characteristics, such as interactive
//! audio.  Those services include payload type identification, sequence
//! numbering, timestamping and delivery monitoring.  RTP itself does not
//! guarantee delivery or prevent out-of-order delivery; the sequence
//! numbers included in RTP allow the receiver to reconstruct the sender's
//! packet sequence.
//!
//! On top of the [RFC3550] data packet this crate defines three custom
//! control packet types carried in the same envelope:
//!
//! - `NACK` (65): receiver-to-sender list of sequence numbers whose
//!   retransmission is requested.
//! - `FEC` (97): XOR parity over a fixed-size group of media payloads,
//!   prefixed by the member sequence numbers.
//! - `RTX` (98): retransmission of a media packet, carrying the original
//!   sequence number in the first two payload bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

const VERSION_MASK: u8 = 0b11000000;
const PADDING_MASK: u8 = 0b00100000;
const EXTENSION_MASK: u8 = 0b00010000;
const CSRC_COUNT_MASK: u8 = 0b00001111;
const MARKER_MASK: u8 = 0b10000000;
const PAYLOAD_TYPE_MASK: u8 = 0b01111111;

/// Fixed part of the RTP header, excluding the CSRC list.
pub const HEADER_SIZE: usize = 12;

/// Negative acknowledgment control packet.
pub const PT_NACK: u8 = 65;
/// PCM audio media packet.
pub const PT_AUDIO: u8 = 96;
/// XOR parity packet covering one FEC group.
pub const PT_FEC: u8 = 97;
/// Retransmission of a previously sent media packet.
pub const PT_RTX: u8 = 98;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    MalformedHeader,
    TruncatedCsrc,
    WrongPacketType,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// ### RTP Data Transfer Protocol
///
/// ```bash
///   0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The same envelope carries media and the custom control packet types;
/// the interpretation of `payload` depends on `payload_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    /// This field identifies the format of the RTP payload and determines
    /// its interpretation by the application. 7 bits.
    pub payload_type: u8,
    /// The sequence number increments by one for each RTP data packet
    /// sent, and may be used by the receiver to detect packet loss and to
    /// restore packet sequence.
    pub seq_num: u16,
    /// The timestamp reflects the sampling instant of the first octet in
    /// the RTP data packet.
    pub timestamp: u32,
    /// The SSRC field identifies the synchronization source, chosen once
    /// per sender.
    pub ssrc: u32,
    /// The CSRC list identifies the contributing sources for the payload
    /// contained in this packet. At most 15 entries.
    pub csrc: Vec<u32>,
    pub payload: Bytes,
    /// Sequence number of the packet being retransmitted. Only populated
    /// on `PT_RTX` packets, where it mirrors the first two payload bytes.
    pub original_seq: Option<u16>,
}

impl RtpPacket {
    /// Creates a media packet with default header flags.
    pub fn new_media(payload_type: u8, seq_num: u16, timestamp: u32, ssrc: u32, payload: Bytes) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            seq_num,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            payload,
            original_seq: None,
        }
    }

    /// Creates a NACK packet requesting retransmission of the given
    /// sequence numbers.
    ///
    /// Sequence number and timestamp carry no meaning on a NACK and are
    /// encoded as zero.
    ///
    /// # Test
    ///
    /// ```
    /// use rtp_stream_codec::{PT_NACK, RtpPacket};
    ///
    /// let nack = RtpPacket::new_nack(&[5, 6, 1000], 0xdeadbeef);
    ///
    /// assert_eq!(nack.payload_type, PT_NACK);
    /// assert_eq!(nack.seq_num, 0);
    /// assert_eq!(nack.timestamp, 0);
    /// assert_eq!(nack.nack_sequence_numbers().unwrap(), vec![5, 6, 1000]);
    /// ```
    pub fn new_nack(missing_seq_nums: &[u16], ssrc: u32) -> Self {
        let mut payload = BytesMut::with_capacity(missing_seq_nums.len() * 2);
        for seq in missing_seq_nums {
            payload.put_u16(*seq);
        }

        Self::new_media(PT_NACK, 0, 0, ssrc, payload.freeze())
    }

    /// Creates a retransmission packet for a previously sent media packet.
    ///
    /// The outer header mirrors the original; the payload is the original
    /// sequence number followed by the original payload bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::Bytes;
    /// use rtp_stream_codec::{PT_AUDIO, PT_RTX, RtpPacket};
    ///
    /// let original = RtpPacket::new_media(PT_AUDIO, 42, 6720, 1, Bytes::from_static(b"pcm"));
    /// let rtx = RtpPacket::new_rtx(&original);
    ///
    /// assert_eq!(rtx.payload_type, PT_RTX);
    /// assert_eq!(rtx.seq_num, original.seq_num);
    /// assert_eq!(rtx.original_seq(), Some(42));
    /// assert_eq!(rtx.rtx_payload().unwrap(), original.payload);
    /// ```
    pub fn new_rtx(original: &RtpPacket) -> Self {
        let mut payload = BytesMut::with_capacity(2 + original.payload.len());
        payload.put_u16(original.seq_num);
        payload.extend_from_slice(&original.payload);

        let mut packet = Self::new_media(
            PT_RTX,
            original.seq_num,
            original.timestamp,
            original.ssrc,
            payload.freeze(),
        );

        packet.original_seq = Some(original.seq_num);
        packet
    }

    /// # Test
    ///
    /// ```
    /// use bytes::{Bytes, BytesMut};
    /// use rtp_stream_codec::{PT_AUDIO, RtpPacket};
    ///
    /// let packet = RtpPacket::new_media(PT_AUDIO, 1, 160, 0x12345678, Bytes::from_static(&[0xaa]));
    ///
    /// let mut buf = BytesMut::new();
    /// packet.encode(&mut buf);
    ///
    /// assert_eq!(
    ///     &buf[..],
    ///     &[
    ///         0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0xa0,
    ///         0x12, 0x34, 0x56, 0x78, 0xaa,
    ///     ]
    /// );
    /// ```
    #[rustfmt::skip]
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.clear();

        let cc = self.csrc.len() as u8 & CSRC_COUNT_MASK;

        let mut basic = [0u8; 2];
        basic[0] = (self.version << 6) & VERSION_MASK;
        basic[0] = if self.padding { basic[0] | PADDING_MASK } else { basic[0] };
        basic[0] = if self.extension { basic[0] | EXTENSION_MASK } else { basic[0] };
        basic[0] |= cc;
        basic[1] = if self.marker { MARKER_MASK } else { 0 };
        basic[1] |= self.payload_type & PAYLOAD_TYPE_MASK;

        buf.put(&basic[..]);
        buf.put_u16(self.seq_num);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for item in &self.csrc {
            buf.put_u32(*item);
        }

        buf.put(self.payload.as_ref());
    }

    /// Encodes into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(HEADER_SIZE + self.csrc.len() * 4 + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes a datagram into a packet.
    ///
    /// The payload type is not validated; unknown types decode as opaque
    /// payloads and are ignored by higher layers.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::Bytes;
    /// use rtp_stream_codec::{Error, PT_AUDIO, RtpPacket};
    ///
    /// let mut packet = RtpPacket::new_media(PT_AUDIO, 7, 1120, 3, Bytes::from_static(b"abc"));
    /// packet.marker = true;
    /// packet.csrc = vec![1, 2];
    ///
    /// let decoded = RtpPacket::decode(&packet.to_bytes()).unwrap();
    /// assert_eq!(decoded, packet);
    ///
    /// assert_eq!(RtpPacket::decode(&[0x80; 4]), Err(Error::MalformedHeader));
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader);
        }

        let mut buf = bytes;
        let version = (buf[0] & VERSION_MASK) >> 6;
        let padding = (buf[0] & PADDING_MASK) != 0;
        let extension = (buf[0] & EXTENSION_MASK) != 0;
        let csrc_count = (buf[0] & CSRC_COUNT_MASK) as usize;
        let marker = (buf[1] & MARKER_MASK) != 0;
        let payload_type = buf[1] & PAYLOAD_TYPE_MASK;
        buf.advance(2);

        let seq_num = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.len() < csrc_count * 4 {
            return Err(Error::TruncatedCsrc);
        }

        let csrc = (0..csrc_count).map(|_| buf.get_u32()).collect::<Vec<u32>>();
        let payload = Bytes::copy_from_slice(buf);

        let original_seq = if payload_type == PT_RTX && payload.len() >= 2 {
            Some(u16::from_be_bytes([payload[0], payload[1]]))
        } else {
            None
        };

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            seq_num,
            timestamp,
            ssrc,
            csrc,
            payload,
            original_seq,
        })
    }

    /// Parses the sequence number list out of a NACK payload.
    ///
    /// A trailing odd byte is ignored; well-formed NACK payloads are
    /// always an even number of bytes.
    pub fn nack_sequence_numbers(&self) -> Result<Vec<u16>, Error> {
        if self.payload_type != PT_NACK {
            return Err(Error::WrongPacketType);
        }

        Ok(self
            .payload
            .chunks_exact(2)
            .map(|item| u16::from_be_bytes([item[0], item[1]]))
            .collect())
    }

    pub fn is_rtx(&self) -> bool {
        self.payload_type == PT_RTX
    }

    /// Sequence number of the retransmitted packet, `None` for non-RTX
    /// packets.
    pub fn original_seq(&self) -> Option<u16> {
        if !self.is_rtx() || self.payload.len() < 2 {
            return None;
        }

        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Payload of the retransmitted packet, `None` for non-RTX packets.
    pub fn rtx_payload(&self) -> Option<Bytes> {
        if !self.is_rtx() || self.payload.len() < 2 {
            return None;
        }

        Some(self.payload.slice(2..))
    }
}
