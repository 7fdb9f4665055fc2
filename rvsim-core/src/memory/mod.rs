//! Physical memory and address routing: RAM, UART, CLINT, and the host "magic" addresses.

mod clint;
mod ram;
mod uart;

pub use clint::Clint;
pub use ram::Ram;
pub use uart::Uart;

use crate::unit;
use log::{trace, warn};

/// Console output magic address: writes emit their low byte to host stdout.
pub const CONSOLE_MAGIC_ADDR: u32 = 0xFFFF_FFF4;
/// Exit magic address: writes set the simulator's exit code and stop the run.
pub const EXIT_MAGIC_ADDR: u32 = 0xFFFF_FFF0;

/// UART device base address.
pub const UART_BASE: u32 = 0x1000_0000;
/// Size of the UART's mapped address window.
pub const UART_SIZE: u32 = 0x1000;

/// CLINT device base address.
pub const CLINT_BASE: u32 = 0x0200_0000;
/// Size of the CLINT's mapped address window.
pub const CLINT_SIZE: u32 = 0x1_0000;

/// Default RAM base address, per the SiFive-derived memory map this target's software assumes.
pub const DEFAULT_MEM_BASE: u32 = 0x8000_0000;
/// Default RAM window size: 2 MiB.
pub const DEFAULT_MEM_SIZE: u32 = 2 * 1024 * 1024;

/// Side effect of a memory write that the interpreter must react to: the fetch/execute loop
/// cannot observe these by reading registers, so [`Memory::write`] surfaces them directly.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryEvent {
    /// Nothing the interpreter needs to react to beyond the write itself.
    None,
    /// A byte was written to the magic-address console sink, entirely separate from the UART
    /// device.
    Console(u8),
    /// The guest requested simulator exit with the given exit code (low 31 bits, already
    /// shifted per `(value >> 1) & 0x7fffffff`).
    Exit(u32),
}

/// The simulator's physical address space: one RAM window, a UART, a CLINT, and the magic
/// addresses, classified in the fixed order from the component design.
#[derive(Debug)]
pub struct Memory {
    mem_base: u32,
    ram: Ram,
    uart: Uart,
    clint: Clint,
    /// ELF-derived `tohost` address; `0` means "none discovered", matching the convention that
    /// physical address `0` is never a valid `tohost` target for this target's linker scripts.
    tohost_addr: u32,
}

impl Memory {
    pub fn new(mem_base: u32, mem_size: u32) -> Self {
        Self {
            mem_base,
            ram: Ram::new(mem_size),
            uart: Uart::new(),
            clint: Clint::new(),
            tohost_addr: 0,
        }
    }

    pub fn reset(&mut self) {
        self.ram.reset();
        self.uart.reset();
        self.clint.reset();
    }

    pub fn mem_base(&self) -> u32 {
        self.mem_base
    }

    pub fn mem_size(&self) -> u32 {
        self.ram.len()
    }

    pub fn set_tohost_addr(&mut self, addr: u32) {
        self.tohost_addr = addr;
    }

    pub fn clint(&self) -> &Clint {
        &self.clint
    }

    pub fn clint_mut(&mut self) -> &mut Clint {
        &mut self.clint
    }

    pub fn uart_mut(&mut self) -> &mut Uart {
        &mut self.uart
    }

    /// Loads `data` into the RAM window at `addr`, used by the ELF loader to place `PT_LOAD`
    /// segment contents. Bytes falling outside the RAM window are silently dropped.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        if let Some(offset) = addr.checked_sub(self.mem_base) {
            self.ram.load(offset, data);
        } else {
            warn!("ELF segment at {addr:#010x} falls below the RAM window, dropped");
        }
    }

    /// Reads a little-endian value of `size` bytes (one of [`unit::BYTE`], [`unit::HALFWORD`],
    /// [`unit::WORD`]) at `addr`. Misaligned accesses are decomposed into their natural byte
    /// sequence rather than faulting.
    pub fn read(&mut self, addr: u32, size: u32) -> u32 {
        let mut buf = [0u8; 4];
        let buf = &mut buf[..size as usize];
        if addr == CONSOLE_MAGIC_ADDR || addr == EXIT_MAGIC_ADDR {
            return 0;
        }
        if let Some(offset) = in_range(addr, UART_BASE, UART_SIZE) {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = self.uart.read(offset + i as u32) as u8;
            }
            return le_bytes_to_u32(buf);
        }
        if let Some(offset) = in_range(addr, CLINT_BASE, CLINT_SIZE) {
            let word = self.clint.read(offset & !0b11);
            let shift = (offset & 0b11) * 8;
            return word >> shift;
        }
        if self.tohost_addr != 0 && addr == self.tohost_addr {
            return 0;
        }
        if let Some(offset) = in_range(addr, self.mem_base, self.ram.len()) {
            self.ram.read(offset, buf);
            return le_bytes_to_u32(buf);
        }
        trace!("OOB read at {addr:#010x} ({size} bytes), returning 0");
        0
    }

    /// Writes a little-endian value of `size` bytes at `addr`, returning any [`MemoryEvent`] the
    /// interpreter needs to act on.
    pub fn write(&mut self, addr: u32, size: u32, value: u32) -> MemoryEvent {
        if addr == CONSOLE_MAGIC_ADDR {
            return MemoryEvent::Console(value as u8);
        }
        if addr == EXIT_MAGIC_ADDR {
            return MemoryEvent::Exit((value >> 1) & 0x7FFF_FFFF);
        }
        if let Some(offset) = in_range(addr, UART_BASE, UART_SIZE) {
            let bytes = value.to_le_bytes();
            for i in 0..size {
                self.uart.write(offset + i, u32::from(bytes[i as usize]));
            }
            return MemoryEvent::None;
        }
        if let Some(offset) = in_range(addr, CLINT_BASE, CLINT_SIZE) {
            self.clint.write(offset & !0b11, value);
            return MemoryEvent::None;
        }
        if self.tohost_addr != 0 && addr == self.tohost_addr {
            if value != 0 {
                return MemoryEvent::Exit((value >> 1) & 0x7FFF_FFFF);
            }
            return MemoryEvent::None;
        }
        if let Some(offset) = in_range(addr, self.mem_base, self.ram.len()) {
            let bytes = value.to_le_bytes();
            self.ram.write(offset, &bytes[..size as usize]);
            return MemoryEvent::None;
        }
        trace!("OOB write at {addr:#010x} ({size} bytes) dropped");
        MemoryEvent::None
    }

    /// Reads a byte, for signature extraction and GDB memory inspection (same classification as
    /// [`Self::read`], exposed at byte granularity for callers that need to walk arbitrary
    /// ranges).
    pub fn read_byte(&mut self, addr: u32) -> u8 {
        self.read(addr, unit::BYTE) as u8
    }

    pub fn read_word(&mut self, addr: u32) -> u32 {
        self.read(addr, unit::WORD)
    }
}

fn in_range(addr: u32, base: u32, size: u32) -> Option<u32> {
    let offset = addr.checked_sub(base)?;
    (offset < size).then_some(offset)
}

fn le_bytes_to_u32(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes[..buf.len()].copy_from_slice(buf);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_magic_write_is_reported() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        assert_eq!(
            MemoryEvent::Console(b'H'),
            mem.write(CONSOLE_MAGIC_ADDR, unit::WORD, b'H' as u32)
        );
    }

    #[test]
    fn exit_magic_write_decodes_exit_code() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        assert_eq!(
            MemoryEvent::Exit(0),
            mem.write(EXIT_MAGIC_ADDR, unit::WORD, 0)
        );
        assert_eq!(
            MemoryEvent::Exit(1),
            mem.write(EXIT_MAGIC_ADDR, unit::WORD, (1 << 1) | 1)
        );
    }

    #[test]
    fn ram_round_trip() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        mem.write(DEFAULT_MEM_BASE, unit::WORD, 0xDEAD_BEEF);
        assert_eq!(0xDEAD_BEEF, mem.read(DEFAULT_MEM_BASE, unit::WORD));
    }

    #[test]
    fn uart_is_routed_through_device() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        mem.write(UART_BASE, unit::BYTE, b'x' as u32);
        assert_eq!(vec![b'x'], mem.uart_mut().drain_tx());
    }

    #[test]
    fn clint_is_routed_through_device() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        mem.write(CLINT_BASE + clint::MSIP_OFFSET, unit::WORD, 1);
        assert!(mem.clint().software_pending());
    }

    #[test]
    fn tohost_write_requests_exit() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        mem.set_tohost_addr(DEFAULT_MEM_BASE + 0x1000);
        assert_eq!(
            MemoryEvent::Exit(0),
            mem.write(DEFAULT_MEM_BASE + 0x1000, unit::WORD, 0b10)
        );
    }

    #[test]
    fn out_of_bounds_access_does_not_panic() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        assert_eq!(0, mem.read(0x4000_0000, unit::WORD));
        assert_eq!(
            MemoryEvent::None,
            mem.write(0x4000_0000, unit::WORD, 0x1234)
        );
    }

    #[test]
    fn misaligned_access_round_trips() {
        let mut mem = Memory::new(DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE);
        mem.write(DEFAULT_MEM_BASE + 1, unit::WORD, 0x0102_0304);
        assert_eq!(0x0102_0304, mem.read(DEFAULT_MEM_BASE + 1, unit::WORD));
    }
}
