//! Shift scheduling: double booking checks, missed shift flagging and placing shifts into
//! display slots.

pub mod conflict;
pub mod missed;
pub mod slots;
