//! Async framing over any byte stream.

use crate::error::ProtocolError;
use crate::packet::{decode_header, Packet, HEADER_LEN};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads the next packet from `reader`.
///
/// Waits for a full header, then for the whole declared payload. Returns
/// `Ok(None)` when the stream ends at or inside the header, which is how a
/// peer closing its socket looks from here.
pub async fn read_packet<P, R>(reader: &mut R) -> Result<Option<P>, ProtocolError>
where
    P: Packet,
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(_) => return Err(ProtocolError::ConnectionClosed),
    }

    let (kind, size) = decode_header::<P::Kind>(&header)?;
    let mut payload = vec![0u8; size];
    if size > 0 {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
    }

    P::decode_payload(kind, &payload).map(Some)
}

/// Writes `packet` as a single buffer so the header and payload leave together.
pub async fn write_packet<P, W>(writer: &mut W, packet: &P) -> Result<(), ProtocolError>
where
    P: Packet,
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|_| ProtocolError::ConnectionClosed)?;
    writer
        .flush()
        .await
        .map_err(|_| ProtocolError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ClientboundPacket, DisconnectReason, ServerboundPacket};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_packet_across_split_reads() {
        let bytes = ServerboundPacket::Move {
            dx: 1.0,
            dy: 2.0,
            dz: 3.0,
        }
        .encode()
        .unwrap();

        let mut reader = Builder::new()
            .read(&bytes[..5])
            .read(&bytes[5..14])
            .read(&bytes[14..])
            .build();

        let packet: Option<ServerboundPacket> = read_packet(&mut reader).await.unwrap();
        assert_eq!(
            packet,
            Some(ServerboundPacket::Move {
                dx: 1.0,
                dy: 2.0,
                dz: 3.0
            })
        );
    }

    #[tokio::test]
    async fn test_zero_length_payload_yields_immediately() {
        let bytes = ServerboundPacket::Leave.encode().unwrap();
        let mut reader = Builder::new().read(&bytes).build();

        let packet: Option<ServerboundPacket> = read_packet(&mut reader).await.unwrap();
        assert_eq!(packet, Some(ServerboundPacket::Leave));
    }

    #[tokio::test]
    async fn test_eof_on_header_is_peer_disconnect() {
        let mut empty = Builder::new().build();
        let packet: Option<ServerboundPacket> = read_packet(&mut empty).await.unwrap();
        assert!(packet.is_none());

        let mut short = Builder::new().read(&[0, 0, 0]).build();
        let packet: Option<ServerboundPacket> = read_packet(&mut short).await.unwrap();
        assert!(packet.is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_payload_is_connection_closed() {
        let bytes = ServerboundPacket::Rotate { yaw: 1.0 }.encode().unwrap();
        let mut reader = Builder::new().read(&bytes[..HEADER_LEN + 2]).build();

        let result: Result<Option<ServerboundPacket>, _> = read_packet(&mut reader).await;
        assert_eq!(result, Err(ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_unknown_type_fails_before_payload() {
        let mut bytes = 99u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        let mut reader = Builder::new().read(&bytes).build();

        let result: Result<Option<ServerboundPacket>, _> = read_packet(&mut reader).await;
        assert_eq!(result, Err(ProtocolError::MalformedHeader(99)));
    }

    #[tokio::test]
    async fn test_write_packet_emits_one_frame() {
        let packet = ClientboundPacket::Disconnect {
            reason: DisconnectReason::TooManyClients,
        };
        let expected = packet.encode().unwrap();
        let mut writer = Builder::new().write(&expected).build();

        write_packet(&mut writer, &packet).await.unwrap();
    }
}
