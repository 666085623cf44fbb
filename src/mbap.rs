//! MBAP framing for Modbus TCP
//!
//! ```text
//! +----------------+-------------+--------+---------+-----------------+
//! | transaction id | protocol id | length | unit id | PDU (fc + data) |
//! |       2        |      2      |   2    |    1    |   length - 1    |
//! +----------------+-------------+--------+---------+-----------------+
//! ```
//!
//! Shared by the client transport and the server's connection handlers.

use ::bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{
    MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MIN_MBAP_LENGTH, MODBUS_PROTOCOL_ID,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;
use crate::protocol::UnitId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id plus PDU length
    pub length: u16,
    pub unit_id: UnitId,
}

impl MbapHeader {
    pub fn new(transaction_id: u16, unit_id: UnitId, pdu_len: usize) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    pub fn parse(raw: &[u8; MBAP_HEADER_LEN]) -> ModbusResult<Self> {
        let header = Self {
            transaction_id: u16::from_be_bytes([raw[0], raw[1]]),
            protocol_id: u16::from_be_bytes([raw[2], raw[3]]),
            length: u16::from_be_bytes([raw[4], raw[5]]),
            unit_id: raw[6],
        };

        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(ModbusError::frame(format!(
                "unexpected protocol id {}",
                header.protocol_id
            )));
        }
        let length = header.length as usize;
        if !(MIN_MBAP_LENGTH..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(ModbusError::frame(format!(
                "MBAP length {} outside {}..={}",
                length, MIN_MBAP_LENGTH, MAX_MBAP_LENGTH
            )));
        }
        Ok(header)
    }

    #[inline]
    pub fn pdu_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16(self.transaction_id);
        buf.put_u16(self.protocol_id);
        buf.put_u16(self.length);
        buf.put_u8(self.unit_id);
    }
}

/// A complete Modbus TCP application data unit
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MbapHeader,
    pub pdu: ModbusPdu,
}

impl Frame {
    pub fn new(transaction_id: u16, unit_id: UnitId, pdu: ModbusPdu) -> Self {
        Self {
            header: MbapHeader::new(transaction_id, unit_id, pdu.len()),
            pdu,
        }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + self.pdu.len());
        self.header.encode_into(&mut buf);
        buf.put_slice(self.pdu.as_slice());
        buf
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before the first header byte.
pub async fn read_frame<R>(reader: &mut R) -> ModbusResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; MBAP_HEADER_LEN];

    let first = reader.read(&mut raw[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut raw[1..]).await?;

    let header = MbapHeader::parse(&raw)?;
    let mut body = [0u8; MAX_MBAP_LENGTH];
    let body = &mut body[..header.pdu_len()];
    reader.read_exact(body).await?;

    Ok(Some(Frame {
        header,
        pdu: ModbusPdu::from_slice(body)?,
    }))
}
