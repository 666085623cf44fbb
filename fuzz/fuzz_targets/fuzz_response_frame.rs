//! Arbitrary bytes from a device: header parse, PDU interpretation and payload parsing.
#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_station::constants::MBAP_HEADER_LEN;
use modbus_station::mbap::MbapHeader;
use modbus_station::{ModbusPdu, ModbusResponse};

fuzz_target!(|data: &[u8]| {
    if data.len() < MBAP_HEADER_LEN {
        return;
    }
    let (head, body) = data.split_at(MBAP_HEADER_LEN);
    let mut raw = [0u8; MBAP_HEADER_LEN];
    raw.copy_from_slice(head);

    let Ok(header) = MbapHeader::parse(&raw) else {
        return;
    };
    let Some(pdu_bytes) = body.get(..header.pdu_len()) else {
        return;
    };
    if let Ok(pdu) = ModbusPdu::from_slice(pdu_bytes) {
        if let Ok(response) = ModbusResponse::from_pdu(header.unit_id, &pdu) {
            let _ = response.parse_registers(1);
            let _ = response.parse_bits(8);
        }
    }
});
