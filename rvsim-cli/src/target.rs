//! The `gdbstub` target: a thin wrapper around [`Hart`] plus the one bit of state gdbstub needs
//! between a resume request and the blocking event loop that actually drives execution.

use gdbstub_arch::riscv::reg::RiscvCoreRegs;
use rvsim_core::breakpoint::WatchKind;
use rvsim_core::csr::CsrSpecifier;
use rvsim_core::hart::{Hart, StepEvent};
use rvsim_core::registers::Specifier;

/// What the interpreter should do the next time the blocking event loop drives it, set by the
/// `gdbstub` resume/step trait impls in `gdb/resume.rs` and `gdb/step.rs`.
#[derive(Debug, Clone, Copy)]
pub enum ResumeAction {
    Step,
    Continue,
    RangeStep(u32, u32),
}

/// The outcome of actually running the interpreter until something gdbstub cares about.
#[derive(Debug, Clone, Copy)]
pub enum StopCondition {
    DoneStep,
    SwBreak,
    Watchpoint(u32, WatchKind),
    Exited(u8),
    Terminated,
    /// Incoming data arrived on the connection mid-run; the caller should go process it.
    Interrupted,
}

pub struct SimTarget {
    hart: Hart,
    pub pending_resume: Option<ResumeAction>,
}

impl SimTarget {
    pub fn new(hart: Hart) -> Self {
        Self {
            hart,
            pending_resume: None,
        }
    }

    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.hart
    }

    pub fn into_hart(self) -> Hart {
        self.hart
    }

    /// Drains console and UART output produced since the last drain and forwards it to stdout.
    /// Called from the blocking event loop after every step so output appears promptly under
    /// GDB too.
    pub fn flush_console(&mut self) {
        use std::io::Write;
        let mut bytes = self.hart.take_console_output();
        bytes.extend(self.hart.take_uart_output());
        if !bytes.is_empty() {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&bytes);
            let _ = stdout.flush();
        }
    }

    /// Runs the interpreter according to `action` until a GDB-visible stop condition occurs, or
    /// `has_incoming` reports data waiting on the connection.
    pub fn run_until_stop(
        &mut self,
        action: ResumeAction,
        mut has_incoming: impl FnMut() -> bool,
    ) -> StopCondition {
        loop {
            if has_incoming() {
                return StopCondition::Interrupted;
            }

            let event = self.hart.step();
            self.flush_console();
            match event {
                StepEvent::Retired => match action {
                    ResumeAction::Step => return StopCondition::DoneStep,
                    ResumeAction::RangeStep(start, end)
                        if !(start..end).contains(&self.hart.pc()) =>
                    {
                        return StopCondition::DoneStep
                    }
                    _ => {}
                },
                StepEvent::Breakpoint => return StopCondition::SwBreak,
                StepEvent::Watchpoint(addr, kind) => return StopCondition::Watchpoint(addr, kind),
                StepEvent::Exit(code) => return StopCondition::Exited(code as u8),
                StepEvent::UnsupportedInstruction(raw) => {
                    log::error!(
                        "unsupported instruction encoding {raw:#010x} at {:#010x}",
                        self.hart.pc()
                    );
                    return StopCondition::Terminated;
                }
            }
        }
    }

    pub fn read_registers(&self, regs: &mut RiscvCoreRegs<u32>) {
        for r in Specifier::iter_all() {
            regs.x[usize::from(r)] = self.hart.x(r);
        }
        regs.pc = self.hart.pc();
    }

    pub fn write_registers(&mut self, regs: &RiscvCoreRegs<u32>) {
        for r in Specifier::iter_all() {
            self.hart.set_x(r, regs.x[usize::from(r)]);
        }
        self.hart.set_pc(regs.pc);
    }

    pub fn read_addrs(&mut self, start_addr: u32, data: &mut [u8]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = self.hart.read_byte(start_addr.wrapping_add(i as u32));
        }
    }

    pub fn write_addrs(&mut self, start_addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.hart.write_byte(start_addr.wrapping_add(i as u32), byte);
        }
    }

    pub fn read_csr(&self, csr: CsrSpecifier) -> u32 {
        self.hart.read_csr(csr)
    }

    pub fn write_csr(&mut self, csr: CsrSpecifier, value: u32) {
        self.hart.write_csr(csr, value)
    }
}
