use gdbstub::common::Signal;
use gdbstub::target::ext::base::singlethread::{SingleThreadRangeStepping, SingleThreadSingleStep};

use crate::target::ResumeAction;

use super::SimTarget;

impl SingleThreadSingleStep for SimTarget {
    fn step(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.pending_resume = Some(ResumeAction::Step);
        Ok(())
    }
}

impl SingleThreadRangeStepping for SimTarget {
    fn resume_range_step(&mut self, start: u32, end: u32) -> Result<(), Self::Error> {
        self.pending_resume = Some(ResumeAction::RangeStep(start, end));
        Ok(())
    }
}
