//! Arbitrary request PDUs must decode to a request or an exception, never panic.
#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_station::protocol::ServerRequest;
use modbus_station::ModbusPdu;

fuzz_target!(|data: &[u8]| {
    if let Ok(pdu) = ModbusPdu::from_slice(data) {
        if let Ok(request) = ServerRequest::from_pdu(&pdu) {
            let _ = request.function();
        }
    }
});
