//! Attendance timekeeping: the time clock session of one employee and the reports built from
//! time clock records.

pub mod report;
pub mod session;
pub mod state;
pub mod ticker;
