//! Wires [`SimTarget`] into `gdbstub`'s blocking event loop: one `GdbStub::run_blocking` call
//! drives both packet I/O and the fetch-execute loop on this single thread, per §5's mandate
//! that the server and the interpreter share one call stack rather than communicate over channels.

mod base_ops;
mod breakpoints;
mod registers;
mod resume;
mod step;

use gdbstub::arch::Arch;
use gdbstub::common::Signal;
use gdbstub::conn::{Connection, ConnectionExt};
use gdbstub::stub::run_blocking::{self, BlockingEventLoop};
use gdbstub::stub::{GdbStub, GdbStubError, SingleThreadStopReason};
use gdbstub::target::ext::base::BaseOps;
use gdbstub::target::ext::breakpoints::{BreakpointsOps, WatchKind as GdbWatchKind};
use gdbstub::target::Target;
use gdbstub_arch::riscv::reg::id::RiscvRegId;
use gdbstub_arch::riscv::reg::RiscvCoreRegs;
use gdbstub_arch::riscv::Riscv32;

use crate::target::{ResumeAction, SimTarget, StopCondition};
use crate::tcp::TcpStream;

/// RV32 architecture definition for `gdbstub`, reusing `gdbstub_arch`'s register/breakpoint-kind
/// types and target description XML (RV32I + the CSRs this core implements).
pub struct OurRiscv32;

impl Arch for OurRiscv32 {
    type Usize = u32;
    type Registers = RiscvCoreRegs<u32>;
    type BreakpointKind = <Riscv32 as Arch>::BreakpointKind;
    type RegId = RiscvRegId<u32>;

    fn target_description_xml() -> Option<&'static str> {
        <Riscv32 as Arch>::target_description_xml()
    }
}

/// This target never produces its own fatal errors; a unit struct keeps `gdbstub`'s associated
/// error type concrete without inventing failure modes this interpreter can't hit.
#[derive(Debug)]
pub struct GdbTargetError;

impl std::fmt::Display for GdbTargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interpreter error")
    }
}

impl std::error::Error for GdbTargetError {}

impl Target for SimTarget {
    type Arch = OurRiscv32;
    type Error = GdbTargetError;

    fn base_ops(&mut self) -> BaseOps<'_, Self::Arch, Self::Error> {
        BaseOps::SingleThread(self)
    }

    fn support_breakpoints(&mut self) -> Option<BreakpointsOps<'_, Self>> {
        Some(self)
    }
}

/// No state of its own: every method is a plain function operating on `&mut SimTarget` and
/// `&mut TcpStream`, so a zero-variant enum is enough to name the `BlockingEventLoop` impl.
pub enum SimEventLoop {}

impl BlockingEventLoop for SimEventLoop {
    type Target = SimTarget;
    type Connection = TcpStream;
    type StopReason = SingleThreadStopReason<u32>;

    fn wait_for_stop_reason(
        target: &mut SimTarget,
        conn: &mut TcpStream,
    ) -> Result<
        run_blocking::Event<SingleThreadStopReason<u32>>,
        run_blocking::WaitForStopReasonError<
            <SimTarget as Target>::Error,
            <TcpStream as Connection>::Error,
        >,
    > {
        loop {
            if let Some(_byte) = conn
                .peek()
                .map_err(run_blocking::WaitForStopReasonError::Connection)?
            {
                let byte = conn
                    .read()
                    .map_err(run_blocking::WaitForStopReasonError::Connection)?;
                return Ok(run_blocking::Event::IncomingData(byte));
            }

            let action = target.pending_resume.take().unwrap_or(ResumeAction::Continue);
            let condition = target.run_until_stop(action, || matches!(conn.peek(), Ok(Some(_))));
            match condition {
                StopCondition::Interrupted => continue,
                other => return Ok(run_blocking::Event::TargetStopped(stop_reason_for(other))),
            }
        }
    }

    fn on_interrupt(
        _target: &mut SimTarget,
    ) -> Result<Option<SingleThreadStopReason<u32>>, <SimTarget as Target>::Error> {
        Ok(Some(SingleThreadStopReason::Signal(Signal::SIGINT)))
    }
}

fn stop_reason_for(condition: StopCondition) -> SingleThreadStopReason<u32> {
    match condition {
        StopCondition::DoneStep => SingleThreadStopReason::DoneStep,
        StopCondition::SwBreak => SingleThreadStopReason::SwBreak(()),
        StopCondition::Watchpoint(addr, kind) => SingleThreadStopReason::Watch {
            tid: (),
            kind: match kind {
                rvsim_core::breakpoint::WatchKind::Read => GdbWatchKind::Read,
                rvsim_core::breakpoint::WatchKind::Write => GdbWatchKind::Write,
                rvsim_core::breakpoint::WatchKind::Access => GdbWatchKind::ReadWrite,
            },
            addr,
        },
        StopCondition::Exited(code) => SingleThreadStopReason::Exited(code),
        StopCondition::Terminated => SingleThreadStopReason::Terminated(Signal::SIGILL),
        StopCondition::Interrupted => unreachable!("handled by the caller before reaching here"),
    }
}

pub fn run_server(
    connection: TcpStream,
    target: &mut SimTarget,
) -> Result<
    gdbstub::stub::DisconnectReason,
    GdbStubError<<SimTarget as Target>::Error, <TcpStream as Connection>::Error>,
> {
    GdbStub::new(connection).run_blocking::<SimEventLoop>(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchpoint_kind_maps_to_gdb_read_write() {
        let reason = stop_reason_for(StopCondition::Watchpoint(
            0x8000_1000,
            rvsim_core::breakpoint::WatchKind::Access,
        ));
        match reason {
            SingleThreadStopReason::Watch { kind, addr, .. } => {
                assert_eq!(GdbWatchKind::ReadWrite, kind);
                assert_eq!(0x8000_1000, addr);
            }
            other => panic!("expected a Watch stop reason, got {other:?}"),
        }
    }

    #[test]
    fn sw_break_and_exit_map_directly() {
        assert!(matches!(
            stop_reason_for(StopCondition::SwBreak),
            SingleThreadStopReason::SwBreak(())
        ));
        assert!(matches!(
            stop_reason_for(StopCondition::Exited(7)),
            SingleThreadStopReason::Exited(7)
        ));
    }
}
