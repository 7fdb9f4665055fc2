use gdbstub::common::Signal;
use gdbstub::target::ext::base::singlethread::{
    SingleThreadRangeSteppingOps, SingleThreadResume, SingleThreadSingleStepOps,
};

use crate::target::ResumeAction;

use super::SimTarget;

impl SingleThreadResume for SimTarget {
    fn resume(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.pending_resume = Some(ResumeAction::Continue);
        Ok(())
    }

    fn support_single_step(&mut self) -> Option<SingleThreadSingleStepOps<'_, Self>> {
        Some(self)
    }

    fn support_range_step(&mut self) -> Option<SingleThreadRangeSteppingOps<'_, Self>> {
        Some(self)
    }
}
