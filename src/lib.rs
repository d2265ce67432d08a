//! Attendance timekeeping and shift scheduling core.
//! Turns time clock records fetched from the backend into live session state and attendance
//! reports, and keeps shift rosters free of double bookings and missed shifts.
//!

pub mod api;
pub mod attendance;
pub mod cli;
pub mod error;
pub mod schedule;
pub mod utils;
