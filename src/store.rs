//! In-memory register store served by [`ModbusServer`](crate::server::ModbusServer)
//!
//! Four independently addressed areas of fixed capacity. Addresses are 1-based: slot `1`
//! is the first element and slot `capacity` the last. Every access is range-checked
//! against the capacity fixed at construction.
//!
//! Each area sits behind its own lock, so protocol handlers, the local API and a
//! simulation feed contend only when they touch the same area.

use std::ops::Range;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::codec::UiAddress;
use crate::constants::MAX_SEED_REGISTERS;
use crate::error::{ModbusError, ModbusResult};

const HOLDING: &str = "holding registers";
const INPUT: &str = "input registers";
const COILS: &str = "coils";
const DISCRETE: &str = "discrete inputs";

#[derive(Debug)]
pub struct RegisterStore {
    capacity: usize,
    holding: RwLock<Vec<u16>>,
    input: RwLock<Vec<u16>>,
    coils: RwLock<Vec<bool>>,
    discrete: RwLock<Vec<bool>>,
}

impl RegisterStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            holding: RwLock::new(vec![0; capacity]),
            input: RwLock::new(vec![0; capacity]),
            coils: RwLock::new(vec![false; capacity]),
            discrete: RwLock::new(vec![false; capacity]),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set holding registers `1..=count` to `10 * i`.
    ///
    /// Counts above [`MAX_SEED_REGISTERS`] are rejected rather than wrapped.
    pub fn seed_holding_registers(&self, count: usize) -> ModbusResult<()> {
        if count > MAX_SEED_REGISTERS {
            return Err(ModbusError::invalid_data(format!(
                "seed count {} exceeds {}",
                count, MAX_SEED_REGISTERS
            )));
        }
        let values: Vec<u16> = (1..=count).map(|i| (10 * i) as u16).collect();
        self.write(&self.holding, HOLDING, 1, &values)?;
        debug!("Seeded holding registers 1..={} with 10*i", count);
        Ok(())
    }

    /// Validate `start >= 1 && start + count - 1 <= capacity`, returning the array range.
    pub fn check_range(
        &self,
        area: &'static str,
        start: UiAddress,
        count: usize,
    ) -> ModbusResult<Range<usize>> {
        let last = start as i64 + count as i64 - 1;
        if start < 1 || last > self.capacity as i64 {
            return Err(ModbusError::OutOfRange {
                area,
                start: start as i64,
                count,
                capacity: self.capacity,
            });
        }
        let offset = (start - 1) as usize;
        Ok(offset..offset + count)
    }

    fn read<T: Copy>(
        &self,
        lock: &RwLock<Vec<T>>,
        area: &'static str,
        start: UiAddress,
        count: usize,
    ) -> ModbusResult<Vec<T>> {
        let range = self.check_range(area, start, count)?;
        let guard = lock
            .read()
            .map_err(|_| ModbusError::internal(format!("{} lock poisoned", area)))?;
        Ok(guard[range].to_vec())
    }

    fn write<T: Copy>(
        &self,
        lock: &RwLock<Vec<T>>,
        area: &'static str,
        start: UiAddress,
        values: &[T],
    ) -> ModbusResult<()> {
        let range = self.check_range(area, start, values.len())?;
        let mut guard = lock
            .write()
            .map_err(|_| ModbusError::internal(format!("{} lock poisoned", area)))?;
        guard[range].copy_from_slice(values);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn read_holding_registers(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<u16>> {
        self.read(&self.holding, HOLDING, start, count)
    }

    pub fn read_input_registers(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<u16>> {
        self.read(&self.input, INPUT, start, count)
    }

    pub fn read_coils(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<bool>> {
        self.read(&self.coils, COILS, start, count)
    }

    pub fn read_discrete_inputs(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<bool>> {
        self.read(&self.discrete, DISCRETE, start, count)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub fn write_holding_register(&self, address: UiAddress, value: u16) -> ModbusResult<()> {
        self.write(&self.holding, HOLDING, address, &[value])
    }

    pub fn write_holding_registers(&self, start: UiAddress, values: &[u16]) -> ModbusResult<()> {
        self.write(&self.holding, HOLDING, start, values)
    }

    pub fn write_input_register(&self, address: UiAddress, value: u16) -> ModbusResult<()> {
        self.write(&self.input, INPUT, address, &[value])
    }

    pub fn write_input_registers(&self, start: UiAddress, values: &[u16]) -> ModbusResult<()> {
        self.write(&self.input, INPUT, start, values)
    }

    pub fn write_coil(&self, address: UiAddress, value: bool) -> ModbusResult<()> {
        self.write(&self.coils, COILS, address, &[value])
    }

    pub fn write_coils(&self, start: UiAddress, values: &[bool]) -> ModbusResult<()> {
        self.write(&self.coils, COILS, start, values)
    }

    pub fn write_discrete_input(&self, address: UiAddress, value: bool) -> ModbusResult<()> {
        self.write(&self.discrete, DISCRETE, address, &[value])
    }

    pub fn write_discrete_inputs(&self, start: UiAddress, values: &[bool]) -> ModbusResult<()> {
        self.write(&self.discrete, DISCRETE, start, values)
    }
}

/// Direct access to a running server's store for a simulation feed.
///
/// Bypasses the protocol layer but not the range checks. Holds the store of the server
/// run it was taken from; take a fresh one after a restart.
///
/// # Example
///
/// ```rust,no_run
/// use modbus_station::ModbusServer;
///
/// # async fn example() -> modbus_station::ModbusResult<()> {
/// let server = ModbusServer::new();
/// server.start("127.0.0.1", 15020).await?;
///
/// let feed = server.buffer_access()?;
/// feed.set_input_registers(1, &[230, 231, 229])?;
/// feed.set_discrete_input(4, true)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BufferAccess {
    store: Arc<RegisterStore>,
}

impl BufferAccess {
    pub(crate) fn new(store: Arc<RegisterStore>) -> Self {
        Self { store }
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn set_holding_register(&self, address: UiAddress, value: u16) -> ModbusResult<()> {
        self.store.write_holding_register(address, value)
    }

    pub fn set_holding_registers(&self, start: UiAddress, values: &[u16]) -> ModbusResult<()> {
        self.store.write_holding_registers(start, values)
    }

    pub fn set_input_register(&self, address: UiAddress, value: u16) -> ModbusResult<()> {
        self.store.write_input_register(address, value)
    }

    pub fn set_input_registers(&self, start: UiAddress, values: &[u16]) -> ModbusResult<()> {
        self.store.write_input_registers(start, values)
    }

    pub fn set_coil(&self, address: UiAddress, value: bool) -> ModbusResult<()> {
        self.store.write_coil(address, value)
    }

    pub fn set_discrete_input(&self, address: UiAddress, value: bool) -> ModbusResult<()> {
        self.store.write_discrete_input(address, value)
    }

    pub fn set_discrete_inputs(&self, start: UiAddress, values: &[bool]) -> ModbusResult<()> {
        self.store.write_discrete_inputs(start, values)
    }

    pub fn holding_registers(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<u16>> {
        self.store.read_holding_registers(start, count)
    }

    pub fn coils(&self, start: UiAddress, count: usize) -> ModbusResult<Vec<bool>> {
        self.store.read_coils(start, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_values() {
        let store = RegisterStore::new(100);
        store.seed_holding_registers(16).unwrap();
        assert_eq!(store.read_holding_registers(1, 4).unwrap(), vec![10, 20, 30, 40]);
        assert_eq!(store.read_holding_registers(16, 2).unwrap(), vec![160, 0]);
    }

    #[test]
    fn test_seed_never_wraps() {
        let store = RegisterStore::new(10_000);
        store.seed_holding_registers(MAX_SEED_REGISTERS).unwrap();
        assert_eq!(
            store.read_holding_registers(MAX_SEED_REGISTERS as i32, 1).unwrap(),
            vec![65_530]
        );
        assert!(matches!(
            store.seed_holding_registers(7_000),
            Err(ModbusError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_bounds() {
        let store = RegisterStore::new(10_000);

        assert!(store.read_holding_registers(1, 1).is_ok());
        assert!(store.read_holding_registers(10_000, 1).is_ok());
        assert!(store.read_holding_registers(9_996, 5).is_ok());

        let err = store.read_holding_registers(10_000, 5).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::OutOfRange {
                area: "holding registers",
                start: 10_000,
                count: 5,
                capacity: 10_000
            }
        ));

        assert!(store.read_coils(0, 1).is_err());
        assert!(store.read_input_registers(-3, 1).is_err());
        assert!(store.write_coils(9_999, &[true, true, true]).is_err());
    }

    #[test]
    fn test_areas_are_independent() {
        let store = RegisterStore::new(10);
        store.write_holding_register(3, 7).unwrap();
        store.write_input_registers(3, &[8]).unwrap();
        store.write_coil(3, true).unwrap();

        assert_eq!(store.read_holding_registers(3, 1).unwrap(), vec![7]);
        assert_eq!(store.read_input_registers(3, 1).unwrap(), vec![8]);
        assert_eq!(store.read_coils(1, 3).unwrap(), vec![false, false, true]);
        assert_eq!(store.read_discrete_inputs(3, 1).unwrap(), vec![false]);
    }

    #[test]
    fn test_buffer_access() {
        let store = Arc::new(RegisterStore::new(10));
        let feed = BufferAccess::new(store.clone());

        feed.set_input_registers(9, &[1, 2]).unwrap();
        feed.set_discrete_input(1, true).unwrap();
        assert!(feed.set_input_registers(10, &[1, 2]).is_err());

        assert_eq!(store.read_input_registers(9, 2).unwrap(), vec![1, 2]);
        assert_eq!(store.read_discrete_inputs(1, 1).unwrap(), vec![true]);
        assert_eq!(feed.capacity(), 10);
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(RegisterStore::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let addr = (t * 100 + i + 1) as i32;
                        store.write_holding_register(addr, addr as u16).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let all = store.read_holding_registers(1, 800).unwrap();
        assert!(all.iter().enumerate().all(|(i, &v)| v as usize == i + 1));
    }
}
