pub mod auto_close;
pub mod employee;
pub mod face;
pub mod invitation;
pub mod punch;
pub mod schedule;

pub use auto_close::{AutoCloseAction, AutoCloseSchedule, AutoCloseTimeline};
pub use punch::{EntryTimes, PunchError, PunchKind, PunchState, PunchWindowCheck, TimecardSummary};
pub use schedule::{ScheduleError, ScheduleSummary, ScheduleTemplate};
