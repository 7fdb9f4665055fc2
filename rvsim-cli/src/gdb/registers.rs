use std::io::Write as _;

use gdbstub::target::ext::base::single_register_access::SingleRegisterAccess;
use gdbstub::target::{TargetError, TargetResult};
use gdbstub_arch::riscv::reg::id::RiscvRegId;
use rvsim_core::registers::Specifier;

use super::SimTarget;

impl SingleRegisterAccess<()> for SimTarget {
    fn read_register(
        &mut self,
        _tid: (),
        reg_id: RiscvRegId<u32>,
        mut buf: &mut [u8],
    ) -> TargetResult<usize, Self> {
        let value = match reg_id {
            RiscvRegId::Gpr(i) => {
                let specifier = Specifier::new(i).ok_or(TargetError::NonFatal)?;
                self.hart().x(specifier)
            }
            RiscvRegId::Pc => self.hart().pc(),
            RiscvRegId::Csr(csr) => self.read_csr(csr),
            _ => return Err(TargetError::NonFatal),
        };
        Ok(buf.write(&value.to_le_bytes())?)
    }

    fn write_register(
        &mut self,
        _tid: (),
        reg_id: RiscvRegId<u32>,
        val: &[u8],
    ) -> TargetResult<(), Self> {
        let mut bytes = [0u8; 4];
        let len = val.len().min(4);
        bytes[..len].copy_from_slice(&val[..len]);
        let value = u32::from_le_bytes(bytes);

        match reg_id {
            RiscvRegId::Gpr(i) => {
                let specifier = Specifier::new(i).ok_or(TargetError::NonFatal)?;
                self.hart_mut().set_x(specifier, value);
            }
            RiscvRegId::Pc => self.hart_mut().set_pc(value),
            RiscvRegId::Csr(csr) => self.write_csr(csr, value),
            _ => return Err(TargetError::NonFatal),
        }
        Ok(())
    }
}
