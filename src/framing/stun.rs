use bytes::{BufMut, BytesMut};
use std::io;

use super::FrameCodec;

const STUN_HEADER_LEN: usize = 20;
const CHANNEL_DATA_HEADER_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum FrameKind {
    Stun,
    ChannelData,
}

fn frame_kind(first: u8) -> io::Result<FrameKind> {
    match first >> 6 {
        0b00 => Ok(FrameKind::Stun),
        0b01 => Ok(FrameKind::ChannelData),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "neither a stun message nor channel data",
        )),
    }
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Delimits STUN messages and TURN ChannelData messages in a TCP stream.
///
/// A STUN message carries its body length after the 20 byte header. A
/// ChannelData message has a 4 byte header and is padded to a multiple of
/// four bytes on stream transports; the padding is stripped on receive.
#[derive(Clone, Copy, Debug, Default)]
pub struct StunTcpCodec;

impl FrameCodec for StunTcpCodec {
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        if buf.len() < CHANNEL_DATA_HEADER_LEN {
            return Ok(None);
        }
        let body = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        Ok(Some(match frame_kind(buf[0])? {
            FrameKind::Stun => STUN_HEADER_LEN + body,
            FrameKind::ChannelData => CHANNEL_DATA_HEADER_LEN + padded(body),
        }))
    }

    fn encode(&self, packet: &[u8], out: &mut BytesMut) -> io::Result<()> {
        let frame_len = self.frame_len(packet)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet shorter than a header")
        })?;
        let kind = frame_kind(packet[0])?;
        let exact = match kind {
            FrameKind::Stun => frame_len,
            FrameKind::ChannelData => {
                CHANNEL_DATA_HEADER_LEN + u16::from_be_bytes([packet[2], packet[3]]) as usize
            }
        };
        if packet.len() != exact && packet.len() != frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "packet length does not match its header",
            ));
        }
        out.reserve(frame_len);
        out.put_slice(packet);
        out.put_bytes(0, frame_len - packet.len());
        Ok(())
    }

    fn decode(&self, mut frame: BytesMut) -> BytesMut {
        if let Ok(FrameKind::ChannelData) = frame_kind(frame[0]) {
            let len = CHANNEL_DATA_HEADER_LEN + u16::from_be_bytes([frame[2], frame[3]]) as usize;
            frame.truncate(len);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{PacketSocket, TcpPacketSocket};
    use crate::test_util::MockShared;
    use rust_p2p_socket_core::socket::Address;

    fn binding_request() -> Vec<u8> {
        let mut msg = vec![0x00, 0x01, 0x00, 0x08, 0x21, 0x12, 0xa4, 0x42];
        msg.extend_from_slice(&[7u8; 12]);
        // one 4-byte attribute
        msg.extend_from_slice(&[0x80, 0x22, 0x00, 0x04, b't', b'e', b's', b't']);
        msg
    }

    #[test]
    fn stun_message_length() {
        let codec = StunTcpCodec;
        let msg = binding_request();
        assert_eq!(codec.frame_len(&msg[..3]).unwrap(), None);
        assert_eq!(codec.frame_len(&msg).unwrap(), Some(28));
        let mut out = BytesMut::new();
        codec.encode(&msg, &mut out).unwrap();
        assert_eq!(&out[..], &msg[..]);
        assert_eq!(&codec.decode(out)[..], &msg[..]);
    }

    #[test]
    fn channel_data_padding() {
        let codec = StunTcpCodec;
        let data = [0x40, 0x00, 0x00, 0x05, 1, 2, 3, 4, 5];
        let mut out = BytesMut::new();
        codec.encode(&data, &mut out).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(&out[9..], &[0, 0, 0]);
        assert_eq!(codec.frame_len(&out).unwrap(), Some(12));
        assert_eq!(&codec.decode(out)[..], &data[..]);

        let e = codec
            .encode(&[0x40, 0x00, 0x00, 0x05, 1], &mut BytesMut::new())
            .unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_unknown_first_byte() {
        let codec = StunTcpCodec;
        let e = codec.frame_len(&[0x80, 0, 0, 0]).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn mixed_stream() {
        let shared = MockShared::new();
        let mut inner = shared.socket();
        inner
            .connect(&Address::new("198.51.100.1:3478".parse().unwrap()))
            .unwrap();
        let mut socket = TcpPacketSocket::new(inner, Box::new(StunTcpCodec));
        let msg = binding_request();
        shared.push_inbound(&msg[..10]);
        assert_eq!(
            socket.recv_packet().unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
        shared.push_inbound(&msg[10..]);
        shared.push_inbound(&[0x40, 0x01, 0x00, 0x02, 0xaa, 0xbb, 0, 0]);
        assert_eq!(&socket.recv_packet().unwrap().0[..], &msg[..]);
        assert_eq!(&socket.recv_packet().unwrap().0[..], &[0x40, 0x01, 0x00, 0x02, 0xaa, 0xbb]);
    }
}
