//! The interpreter core: fetch-decode-execute, trap delivery, and commit logging for a single
//! RV32IMA + Zicsr hart.

use log::{trace, warn};

use crate::breakpoint::{BreakpointSet, WatchKind};
use crate::csr::{CsrFile, CsrSpecifier};
use crate::execute;
use crate::instruction::{CsrOp, DecodeError, Instruction, LoadWidth, StoreWidth};
use crate::memory::{Memory, MemoryEvent};
use crate::registers::{Registers, Specifier};
use crate::unit;

/// Illegal instruction, per the RISC-V privileged spec's machine-mode exception cause table.
pub const CAUSE_ILLEGAL_INSTRUCTION: u32 = 2;
/// Breakpoint (`EBREAK`).
pub const CAUSE_BREAKPOINT: u32 = 3;
/// Environment call from M-mode (`ECALL`).
pub const CAUSE_ECALL_FROM_M: u32 = 11;

/// Default safety bound on retired instructions/steps before the run is forced to end.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 100_000_000;

/// The outcome of a single [`Hart::step`] call: what the caller (the plain driver loop or the
/// GDB stub) needs to react to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StepEvent {
    /// An instruction retired (or a trap was delivered) with no condition the caller must act
    /// on beyond continuing the run.
    Retired,
    /// The program counter, after this step, equals an enabled breakpoint address.
    Breakpoint,
    /// An enabled watchpoint overlapped this step's memory access; carries the watchpoint's
    /// base address and the kind it was registered with.
    Watchpoint(u32, WatchKind),
    /// The guest requested simulator exit (console magic write to the exit address, or a
    /// non-zero write to `tohost`), carrying the exit code.
    Exit(u32),
    /// The fetched word's major opcode isn't one this core implements at all (as opposed to a
    /// malformed encoding of a known opcode, which traps as an illegal instruction). This is a
    /// fatal host-visible condition: the caller should report it and stop the run.
    UnsupportedInstruction(u32),
}

/// One retired instruction's worth of side-effects, for the optional commit trace (§4.5.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitRecord {
    pub pc: u32,
    pub raw_instruction: u32,
    pub gpr_write: Option<(Specifier, u32)>,
    pub csr_write: Option<(CsrSpecifier, u32)>,
    /// Address, plus the written value for stores (`None` for loads).
    pub mem_access: Option<(u32, Option<u32>)>,
}

/// Architectural state and execution loop for one RV32IMA + Zicsr hart, plus the devices and
/// breakpoint/watchpoint tables it owns.
///
/// Mirrors the ownership sketched in the design notes: the GDB server drives this through a
/// `&mut Hart`, calling [`Hart::step`] directly and reading/writing registers, memory and the
/// breakpoint tables through the plain accessor methods below, rather than through a table of
/// callbacks.
#[derive(Debug)]
pub struct Hart {
    registers: Registers,
    csrs: CsrFile,
    memory: Memory,
    breakpoints: BreakpointSet,
    instret: u64,
    running: bool,
    exit_code: u32,
    instruction_limit: u64,
    reset_pc: u32,
    console_out: Vec<u8>,
}

impl Hart {
    pub fn new(mem_base: u32, mem_size: u32, initial_pc: u32) -> Self {
        Self {
            registers: Registers::new(initial_pc),
            csrs: CsrFile::new(),
            memory: Memory::new(mem_base, mem_size),
            breakpoints: BreakpointSet::new(),
            instret: 0,
            running: true,
            exit_code: 0,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            reset_pc: initial_pc,
            console_out: Vec::new(),
        }
    }

    /// Drains bytes written to the console magic address since the last call, for the driver to
    /// forward to host stdout. The interpreter itself never touches stdout.
    pub fn take_console_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.console_out)
    }

    /// Drains bytes written to the UART's TX FIFO since the last call, for the driver to forward
    /// to host stdout. Separate from the console magic sink (see `MemoryEvent::Console`): real
    /// target software speaks to the UART device, not the magic address, so the driver must
    /// flush both.
    pub fn take_uart_output(&mut self) -> Vec<u8> {
        self.memory.uart_mut().drain_tx()
    }

    pub fn set_instruction_limit(&mut self, limit: u64) {
        self.instruction_limit = limit;
    }

    pub fn set_tohost_addr(&mut self, addr: u32) {
        self.memory.set_tohost_addr(addr);
    }

    /// Resets GPRs and CSRs, restores `pc` to the reset vector recorded at construction (or
    /// later updated via [`Self::set_reset_pc`]), clears the breakpoint/watchpoint tables, and
    /// marks the hart as running again. Used by the GDB `R` packet.
    pub fn reset(&mut self) {
        self.registers.reset(self.reset_pc);
        self.csrs = CsrFile::new();
        self.memory.reset();
        self.breakpoints.clear();
        self.instret = 0;
        self.running = true;
        self.exit_code = 0;
        self.console_out.clear();
    }

    pub fn set_reset_pc(&mut self, pc: u32) {
        self.reset_pc = pc;
    }

    /// Sets the current `pc`, independent of the reset vector. Used by the loader to seed
    /// execution at the resolved entry point without disturbing already-loaded memory.
    pub fn set_pc(&mut self, pc: u32) {
        *self.registers.pc_mut() = pc;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn exit_code(&self) -> u32 {
        self.exit_code
    }

    pub fn instret(&self) -> u64 {
        self.instret
    }

    pub fn pc(&self) -> u32 {
        self.registers.pc()
    }

    pub fn x(&self, specifier: Specifier) -> u32 {
        self.registers.x(specifier)
    }

    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        self.registers.set_x(specifier, value)
    }

    pub fn gdb_registers(&self) -> [u32; crate::registers::GDB_LEN] {
        self.registers.gdb_order()
    }

    pub fn set_gdb_registers(&mut self, regs: &[u32; crate::registers::GDB_LEN]) {
        self.registers.set_gdb_order(regs)
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointSet {
        &mut self.breakpoints
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn memory(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Reads a byte through the same address routing as guest loads, for GDB memory-inspection
    /// packets and the signature extractor. Does not participate in watchpoint matching.
    pub fn read_byte(&mut self, addr: u32) -> u8 {
        self.memory.read_byte(addr)
    }

    /// Writes a byte through the same address routing as guest stores, for GDB memory-mutation
    /// packets. Does not participate in watchpoint matching.
    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.memory.write(addr, unit::BYTE, u32::from(value));
    }

    /// Reads a CSR for the GDB `p`/`g` register-access packets.
    pub fn read_csr(&self, csr: CsrSpecifier) -> u32 {
        self.csrs.read(csr, self.instret, self.memory.clint().mtime())
    }

    /// Writes a CSR for the GDB `P`/`G` register-access packets.
    pub fn write_csr(&mut self, csr: CsrSpecifier, value: u32) {
        self.csrs.write(csr, value);
    }

    /// Executes one fetch-decode-execute cycle (or trap delivery), ticking the CLINT and
    /// retired-instruction counter exactly once, per §4.5.1.
    pub fn step(&mut self) -> StepEvent {
        let timer_pending = self.memory.clint().timer_pending();
        let software_pending = self.memory.clint().software_pending();
        self.csrs.set_pending(timer_pending, software_pending);

        self.memory.clint_mut().tick();
        self.instret += 1;

        if let Some(cause) = self.csrs.pending_interrupt_cause() {
            self.take_trap(cause, 0);
            return self.post_step_event();
        }

        if self.instret > self.instruction_limit {
            self.running = false;
            return StepEvent::Exit(self.exit_code);
        }

        let pc = self.registers.pc();
        let raw = self.memory.read_word(pc);

        match Instruction::decode(raw) {
            Err(DecodeError::UnsupportedOpcode) => {
                self.running = false;
                return StepEvent::UnsupportedInstruction(raw);
            }
            Err(DecodeError::IllegalInstruction) => {
                self.take_trap(CAUSE_ILLEGAL_INSTRUCTION, raw);
            }
            Ok(instruction) => {
                let record = self.execute(instruction, pc, raw);
                let _ = record; // commit logging is the driver's concern; see CommitRecord
            }
        }

        self.registers.set_x(Specifier::X0, 0);
        self.post_step_event()
    }

    /// Like [`Self::step`], but also returns the [`CommitRecord`] for the driver's commit trace.
    pub fn step_with_trace(&mut self) -> (StepEvent, Option<CommitRecord>) {
        let timer_pending = self.memory.clint().timer_pending();
        let software_pending = self.memory.clint().software_pending();
        self.csrs.set_pending(timer_pending, software_pending);

        self.memory.clint_mut().tick();
        self.instret += 1;

        if let Some(cause) = self.csrs.pending_interrupt_cause() {
            let pc = self.registers.pc();
            self.take_trap(cause, 0);
            let record = CommitRecord {
                pc,
                raw_instruction: 0,
                csr_write: Some((0x341, self.csrs.mepc())),
                ..Default::default()
            };
            return (self.post_step_event(), Some(record));
        }

        if self.instret > self.instruction_limit {
            self.running = false;
            return (StepEvent::Exit(self.exit_code), None);
        }

        let pc = self.registers.pc();
        let raw = self.memory.read_word(pc);

        let record = match Instruction::decode(raw) {
            Err(DecodeError::UnsupportedOpcode) => {
                self.running = false;
                return (StepEvent::UnsupportedInstruction(raw), None);
            }
            Err(DecodeError::IllegalInstruction) => {
                self.take_trap(CAUSE_ILLEGAL_INSTRUCTION, raw);
                Some(CommitRecord {
                    pc,
                    raw_instruction: raw,
                    csr_write: Some((0x341, self.csrs.mepc())),
                    ..Default::default()
                })
            }
            Ok(instruction) => Some(self.execute(instruction, pc, raw)),
        };

        self.registers.set_x(Specifier::X0, 0);
        (self.post_step_event(), record)
    }

    fn post_step_event(&mut self) -> StepEvent {
        if !self.running {
            return StepEvent::Exit(self.exit_code);
        }
        if self.breakpoints.has_breakpoint(self.registers.pc()) {
            return StepEvent::Breakpoint;
        }
        if let Some((addr, kind)) = self.breakpoints.take_watchpoint_hit() {
            return StepEvent::Watchpoint(addr, kind);
        }
        StepEvent::Retired
    }

    fn take_trap(&mut self, cause: u32, tval: u32) {
        let pc = self.registers.pc();
        self.csrs.set_mepc(pc);
        self.csrs.set_mcause(cause);
        self.csrs.set_mtval(tval);
        self.csrs.enter_trap();
        *self.registers.pc_mut() = self.csrs.mtvec() & !0b11;
    }

    /// Executes a decoded instruction at `pc` (the `pc` it was fetched from), returning the
    /// commit-trace fields for the driver. Mutates registers, CSRs, memory and `pc` in place.
    fn execute(&mut self, instruction: Instruction, pc: u32, raw: u32) -> CommitRecord {
        let mut record = CommitRecord {
            pc,
            raw_instruction: raw,
            ..Default::default()
        };
        let mut next_pc = pc.wrapping_add(4);

        match instruction {
            Instruction::Lui { dest, immediate } => {
                self.write_gpr(&mut record, dest, immediate as u32);
            }
            Instruction::Auipc { dest, immediate } => {
                self.write_gpr(&mut record, dest, pc.wrapping_add_signed(immediate));
            }
            Instruction::Jal { dest, offset } => {
                self.write_gpr(&mut record, dest, pc.wrapping_add(4));
                next_pc = pc.wrapping_add_signed(offset);
            }
            Instruction::Jalr { dest, base, offset } => {
                let target = self.registers.x(base).wrapping_add_signed(offset) & !1;
                self.write_gpr(&mut record, dest, pc.wrapping_add(4));
                next_pc = target;
            }
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                if execute::branch_taken(condition, self.registers.x(src1), self.registers.x(src2))
                {
                    next_pc = pc.wrapping_add_signed(offset);
                }
            }
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let value = execute::reg_imm(op, self.registers.x(src), immediate);
                self.write_gpr(&mut record, dest, value);
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let value = execute::reg_shift_imm(op, self.registers.x(src), shift_amount_u5);
                self.write_gpr(&mut record, dest, value);
            }
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let value = execute::reg_reg(op, self.registers.x(src1), self.registers.x(src2));
                self.write_gpr(&mut record, dest, value);
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let addr = self.registers.x(base).wrapping_add_signed(offset);
                let value = self.load(addr, width);
                record.mem_access = Some((addr, None));
                self.write_gpr(&mut record, dest, value);
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let addr = self.registers.x(base).wrapping_add_signed(offset);
                let value = self.registers.x(src);
                self.store(addr, width, value);
                record.mem_access = Some((addr, Some(value)));
            }
            Instruction::Fence { .. } => {}
            Instruction::Ecall => {
                self.take_trap(CAUSE_ECALL_FROM_M, 0);
                record.csr_write = Some((0x341, self.csrs.mepc()));
                next_pc = self.registers.pc();
            }
            Instruction::Ebreak => {
                self.take_trap(CAUSE_BREAKPOINT, pc);
                record.csr_write = Some((0x341, self.csrs.mepc()));
                next_pc = self.registers.pc();
            }
            Instruction::Mret => {
                self.csrs.mret();
                next_pc = self.csrs.mepc();
            }
            Instruction::Csr {
                op,
                dest,
                csr,
                src,
            } => {
                let should_write = !matches!(op, CsrOp::ReadSet | CsrOp::ReadClear) || src != Specifier::X0;
                let src_value = self.registers.x(src);
                self.do_csr(&mut record, op, dest, csr, src_value, should_write);
            }
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => {
                let should_write =
                    !matches!(op, CsrOp::ReadSet | CsrOp::ReadClear) || immediate != 0;
                self.do_csr(&mut record, op, dest, csr, immediate, should_write);
            }
            Instruction::Amo {
                op,
                aq: _,
                rl: _,
                src,
                addr,
                dest,
            } => {
                self.execute_amo(&mut record, op, src, addr, dest);
            }
        }

        *self.registers.pc_mut() = next_pc;
        record
    }

    fn write_gpr(&mut self, record: &mut CommitRecord, dest: Specifier, value: u32) {
        self.registers.set_x(dest, value);
        if dest != Specifier::X0 {
            record.gpr_write = Some((dest, value));
        }
    }

    fn do_csr(
        &mut self,
        record: &mut CommitRecord,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        operand: u32,
        should_write: bool,
    ) {
        let mtime = self.memory.clint().mtime();
        let old = self.csrs.read(csr, self.instret, mtime);
        if dest != Specifier::X0 {
            self.registers.set_x(dest, old);
            record.gpr_write = Some((dest, old));
        }
        if should_write {
            let new = match op {
                CsrOp::ReadWrite => operand,
                CsrOp::ReadSet => old | operand,
                CsrOp::ReadClear => old & !operand,
            };
            self.csrs.write(csr, new);
            // A CSR write suppresses the GPR-write field on this trace line, per §3's invariant.
            record.gpr_write = None;
            record.csr_write = Some((csr, new));
        }
    }

    fn execute_amo(
        &mut self,
        record: &mut CommitRecord,
        op: crate::instruction::AmoOp,
        src: Specifier,
        addr_reg: Specifier,
        dest: Specifier,
    ) {
        use crate::instruction::AmoOp;
        let addr = self.registers.x(addr_reg);
        self.breakpoints.check_access(addr, unit::WORD, WatchKind::Access);
        let old = self.memory.read_word(addr);
        match op {
            AmoOp::Lr => {
                self.write_gpr(record, dest, old);
                return;
            }
            AmoOp::Sc => {
                let value = self.registers.x(src);
                self.memory.write(addr, unit::WORD, value);
                record.mem_access = Some((addr, Some(value)));
                self.write_gpr(record, dest, 0);
                return;
            }
            _ => {}
        }
        let operand = self.registers.x(src);
        let new = execute::amo_apply(op, old, operand);
        self.memory.write(addr, unit::WORD, new);
        record.mem_access = Some((addr, Some(new)));
        self.write_gpr(record, dest, old);
    }

    fn load(&mut self, addr: u32, width: LoadWidth) -> u32 {
        self.breakpoints.check_access(addr, load_width_bytes(width), WatchKind::Read);
        match width {
            LoadWidth::Lb => self.memory.read(addr, unit::BYTE) as i8 as i32 as u32,
            LoadWidth::Lbu => self.memory.read(addr, unit::BYTE),
            LoadWidth::Lh => self.memory.read(addr, unit::HALFWORD) as i16 as i32 as u32,
            LoadWidth::Lhu => self.memory.read(addr, unit::HALFWORD),
            LoadWidth::Lw => self.memory.read(addr, unit::WORD),
        }
    }

    fn store(&mut self, addr: u32, width: StoreWidth, value: u32) {
        self.breakpoints.check_access(addr, store_width_bytes(width), WatchKind::Write);
        let size = store_width_bytes(width);
        match self.memory.write(addr, size, value) {
            MemoryEvent::None => {}
            MemoryEvent::Console(byte) => {
                trace!("console write: {byte:#04x}");
                self.console_out.push(byte);
            }
            MemoryEvent::Exit(code) => {
                self.exit_code = code;
                self.running = false;
            }
        }
    }
}

fn load_width_bytes(width: LoadWidth) -> u32 {
    match width {
        LoadWidth::Lb | LoadWidth::Lbu => unit::BYTE,
        LoadWidth::Lh | LoadWidth::Lhu => unit::HALFWORD,
        LoadWidth::Lw => unit::WORD,
    }
}

fn store_width_bytes(width: StoreWidth) -> u32 {
    match width {
        StoreWidth::Sb => unit::BYTE,
        StoreWidth::Sh => unit::HALFWORD,
        StoreWidth::Sw => unit::WORD,
    }
}

/// Renders a [`CommitRecord`] in the commit-log line format from §6.
pub fn format_commit(record: &CommitRecord) -> String {
    let mut line = format!(
        "core 0: 3 0x{:08x} (0x{:08x})",
        record.pc, record.raw_instruction
    );
    if let Some((csr, value)) = record.csr_write {
        line.push_str(&format!(" c{csr:03x}_{} 0x{value:08x}", csr_name(csr)));
    } else if let Some((reg, value)) = record.gpr_write {
        line.push_str(&format!(" {reg} 0x{value:08x}"));
    }
    if let Some((addr, stored)) = record.mem_access {
        match stored {
            Some(value) => line.push_str(&format!(" mem 0x{addr:08x} 0x{value:08x}")),
            None => line.push_str(&format!(" mem 0x{addr:08x}")),
        }
    }
    line
}

fn csr_name(csr: CsrSpecifier) -> &'static str {
    match csr {
        0x300 => "mstatus",
        0x301 => "misa",
        0x304 => "mie",
        0x305 => "mtvec",
        0x340 => "mscratch",
        0x341 => "mepc",
        0x342 => "mcause",
        0x343 => "mtval",
        0x344 => "mip",
        _ => {
            warn!("commit trace for unnamed CSR {csr:#06x}");
            "unknown"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_MEM_BASE;

    fn hart_at(base: u32) -> Hart {
        Hart::new(base, 0x1000, base)
    }

    fn store_word(hart: &mut Hart, addr: u32, word: u32) {
        hart.memory_mut().write(addr, unit::WORD, word);
    }

    #[test]
    fn addi_retires_and_advances_pc() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        // addi x1, x0, 42
        let instr = (42 << 20) | (0 << 15) | (0b000 << 12) | (1 << 7) | 0b0010011;
        store_word(&mut hart, DEFAULT_MEM_BASE, instr);
        assert_eq!(StepEvent::Retired, hart.step());
        assert_eq!(42, hart.x(Specifier::from_u5(1)));
        assert_eq!(DEFAULT_MEM_BASE + 4, hart.pc());
    }

    #[test]
    fn divu_by_zero_round_trips_through_hart() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        // addi x1, x0, 42
        store_word(
            &mut hart,
            DEFAULT_MEM_BASE,
            (42 << 20) | (0b000 << 12) | (1 << 7) | 0b0010011,
        );
        // divu x1, x1, x0
        store_word(
            &mut hart,
            DEFAULT_MEM_BASE + 4,
            (0b0000001 << 25) | (0 << 20) | (1 << 15) | (0b101 << 12) | (1 << 7) | 0b0110011,
        );
        hart.step();
        hart.step();
        assert_eq!(0xFFFF_FFFF, hart.x(Specifier::from_u5(1)));
    }

    #[test]
    fn ebreak_traps_with_mtval_equal_to_pc() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        hart.csrs.write(0x305, DEFAULT_MEM_BASE + 0x200); // mtvec
        store_word(&mut hart, DEFAULT_MEM_BASE, 0b1110011 | (1 << 20));
        assert_eq!(StepEvent::Retired, hart.step());
        assert_eq!(DEFAULT_MEM_BASE + 0x200, hart.pc());
        assert_eq!(CAUSE_BREAKPOINT, hart.csrs.read(0x342, 0, 0));
        assert_eq!(DEFAULT_MEM_BASE, hart.csrs.read(0x343, 0, 0));
    }

    #[test]
    fn mret_restores_mie_and_jumps_to_mepc() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        hart.csrs.write(0x300, 1 << 3); // mstatus.MIE
        hart.csrs.enter_trap();
        hart.csrs.set_mepc(DEFAULT_MEM_BASE + 0x100);
        // mret
        store_word(&mut hart, DEFAULT_MEM_BASE, (0b0011000 << 25) | (2 << 20) | 0b1110011);
        hart.step();
        assert_eq!(DEFAULT_MEM_BASE + 0x100, hart.pc());
        assert!(hart.csrs.mie_enabled());
    }

    #[test]
    fn breakpoint_event_fires_after_pc_matches() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        store_word(&mut hart, DEFAULT_MEM_BASE, 0b0010011); // addi x0, x0, 0 (nop)
        hart.breakpoints_mut().insert_breakpoint(DEFAULT_MEM_BASE + 4);
        assert_eq!(StepEvent::Breakpoint, hart.step());
    }

    #[test]
    fn watchpoint_event_fires_on_matching_store() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        // sw x0, 0(x0) -> stores 0 at address in x0 (0x0), which is out of our RAM window but
        // still routed through Memory::write and thus still checked against watchpoints.
        store_word(&mut hart, DEFAULT_MEM_BASE, 0b0100011);
        hart.breakpoints_mut()
            .insert_watchpoint(0, 4, WatchKind::Write);
        assert_eq!(StepEvent::Watchpoint(0, WatchKind::Write), hart.step());
    }

    #[test]
    fn exit_magic_write_stops_the_hart() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        hart.set_x(Specifier::from_u5(1), crate::memory::EXIT_MAGIC_ADDR);
        // sw x0, 0(x1)
        store_word(&mut hart, DEFAULT_MEM_BASE, (1 << 15) | (0b010 << 12) | 0b0100011);
        assert_eq!(StepEvent::Exit(0), hart.step());
        assert!(!hart.is_running());
    }

    #[test]
    fn unsupported_opcode_is_fatal() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        // 0b1111111 is not a recognized 7-bit opcode.
        store_word(&mut hart, DEFAULT_MEM_BASE, 0xFFFF_FFFF);
        assert_eq!(
            StepEvent::UnsupportedInstruction(0xFFFF_FFFF),
            hart.step()
        );
        assert!(!hart.is_running());
    }

    #[test]
    fn timer_interrupt_delivers_without_executing_spin_instruction() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        hart.csrs.write(0x305, DEFAULT_MEM_BASE + 0x100); // mtvec
        hart.csrs.write(0x300, 1 << 3); // mstatus.MIE
        hart.csrs.write(0x304, 0x888); // mie: all enabled
        hart.memory_mut().clint_mut().write(0x4000, 0); // mtimecmp = 0, already <= mtime
        store_word(&mut hart, DEFAULT_MEM_BASE, 0b1101111); // jal x0, 0 (spins on itself)
        let event = hart.step();
        assert_eq!(StepEvent::Retired, event);
        assert_eq!(DEFAULT_MEM_BASE + 0x100, hart.pc());
        assert_eq!(0x8000_0007, hart.csrs.read(0x342, 0, 0));
        assert!(!hart.csrs.mie_enabled());
    }

    #[test]
    fn reset_restores_gprs_and_reset_pc_and_clears_breakpoints() {
        let mut hart = hart_at(DEFAULT_MEM_BASE);
        hart.set_reset_pc(DEFAULT_MEM_BASE + 0x40);
        hart.set_x(Specifier::from_u5(5), 0xDEAD_BEEF);
        hart.set_pc(DEFAULT_MEM_BASE + 0x200);
        hart.breakpoints_mut().insert_breakpoint(DEFAULT_MEM_BASE + 0x10);
        hart.csrs.write(0x300, 1 << 3); // mstatus.MIE
        hart.running = false;

        hart.reset();

        assert_eq!(0, hart.x(Specifier::from_u5(5)));
        assert_eq!(DEFAULT_MEM_BASE + 0x40, hart.pc());
        assert!(hart.is_running());
        assert_eq!(0, hart.csrs.read(0x300, 0, 0));
        assert!(!hart.breakpoints_mut().has_breakpoint(DEFAULT_MEM_BASE + 0x10));
    }
}
