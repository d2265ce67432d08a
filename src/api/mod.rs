//! Boundary to the remote API. The backend owns time clock records and shifts; this crate only
//! holds read-through copies and talks to it through [TimekeepingApi].

pub mod entities;
pub mod http;

use async_trait::async_trait;
use entities::{
    ClockInRequest, ClockOutRequest, Shift, ShiftDraft, ShiftQuery, ShiftUpdate, TimeClockRecord,
};

use crate::error::Result;

/// Request/response contract of the backend. Implemented over HTTP by [http::HttpApiClient].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimekeepingApi: Send + Sync {
    async fn list_time_clocks(&self, employee_id: &str) -> Result<Vec<TimeClockRecord>>;

    async fn clock_in(&self, request: ClockInRequest) -> Result<TimeClockRecord>;

    async fn clock_out(&self, request: ClockOutRequest) -> Result<TimeClockRecord>;

    async fn start_break(&self, time_clock_id: &str) -> Result<TimeClockRecord>;

    async fn end_break(&self, time_clock_id: &str) -> Result<TimeClockRecord>;

    async fn list_shifts(&self, query: ShiftQuery) -> Result<Vec<Shift>>;

    async fn create_shift(&self, draft: ShiftDraft) -> Result<Shift>;

    async fn update_shift(&self, shift_id: &str, update: ShiftUpdate) -> Result<Shift>;

    async fn delete_shift(&self, shift_id: &str) -> Result<()>;
}
