use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use chrono::TimeZone;
use tracing::{debug, info, instrument};

use super::state::{derive_snapshot, AttendanceState, BreakLedger, SessionSnapshot};
use crate::{
    api::{
        entities::{ClockInRequest, ClockOutRequest, TimeClockRecord},
        TimekeepingApi,
    },
    error::{Result, SessionAction, TimekeepingError},
    utils::clock::Clock,
};

#[derive(Debug, Default)]
struct SessionData {
    records: Vec<TimeClockRecord>,
    ledger: BreakLedger,
}

/// Read side of a session. Cheap to clone, used by [super::ticker::ElapsedTicker] to recompute
/// the snapshot on every tick.
#[derive(Clone)]
pub struct SessionView<Tz: TimeZone> {
    data: Arc<Mutex<SessionData>>,
    alive: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl<Tz: TimeZone> SessionView<Tz> {
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.data();
        derive_snapshot(&data.records, &data.ledger, self.clock.time(), &self.tz)
    }

    pub fn is_attached(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

/// Attendance of one employee as seen by one client. All mutations go through the backend first;
/// local records only change from the backend's response.
pub struct TimeClockSession<Tz: TimeZone> {
    employee_id: Option<String>,
    api: Arc<dyn TimekeepingApi>,
    view: SessionView<Tz>,
}

impl<Tz: TimeZone> TimeClockSession<Tz> {
    pub fn new(
        employee_id: Option<String>,
        api: Arc<dyn TimekeepingApi>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            employee_id: employee_id.filter(|v| !v.trim().is_empty()),
            api,
            view: SessionView {
                data: Arc::new(Mutex::new(SessionData::default())),
                alive: Arc::new(AtomicBool::new(true)),
                clock,
                tz,
            },
        }
    }

    pub fn view(&self) -> SessionView<Tz> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.view.snapshot()
    }

    pub fn records(&self) -> Vec<TimeClockRecord> {
        self.view.data().records.clone()
    }

    /// Marks the owner of the session as gone. Responses that arrive afterwards are dropped.
    pub fn detach(&self) {
        self.view.alive.store(false, Ordering::Relaxed);
    }

    fn employee(&self) -> Result<&str> {
        self.employee_id
            .as_deref()
            .ok_or_else(|| TimekeepingError::InvalidState("No employee selected".into()))
    }

    fn require(
        &self,
        action: SessionAction,
        allowed: AttendanceState,
    ) -> Result<(String, TimeClockRecord)> {
        let employee = self.employee()?.to_string();
        let snapshot = self.snapshot();
        match snapshot.record {
            Some(record) if snapshot.state == allowed => Ok((employee, record)),
            _ => Err(TimekeepingError::InvalidTransition {
                action,
                state: snapshot.state.describe(),
            }),
        }
    }

    /// Applies `f` unless the session was detached while the request was in flight.
    fn apply(&self, f: impl FnOnce(&mut SessionData)) {
        if !self.view.is_attached() {
            debug!("Session detached, dropping response");
            return;
        }
        f(&mut *self.view.data());
    }

    /// Replaces local records with the backend's copy.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let employee = self.employee()?;
        let mut records = self.api.list_time_clocks(employee).await?;
        records.retain(|v| v.employee_id == employee);
        records.sort_by_key(|v| v.clock_in);
        debug!("Loaded {} records", records.len());
        self.apply(|data| data.records = records);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clock_in(&self, shift_id: Option<&str>) -> Result<TimeClockRecord> {
        let employee = self.employee()?.to_string();
        let state = self.snapshot().state;
        if state.is_active() {
            return Err(TimekeepingError::InvalidTransition {
                action: SessionAction::ClockIn,
                state: state.describe(),
            });
        }

        let record = self
            .api
            .clock_in(ClockInRequest {
                employee_id: employee,
                shift_id: shift_id.map(str::to_string),
            })
            .await?;
        info!("Clocked in at {}", record.clock_in);

        self.apply(|data| {
            data.ledger = BreakLedger::for_record(&record.id);
            upsert(&mut data.records, record.clone());
        });
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn start_break(&self) -> Result<TimeClockRecord> {
        let (_, open) = self.require(SessionAction::StartBreak, AttendanceState::Working)?;
        let record = self.api.start_break(&open.id).await?;
        info!("Break started at {:?}", record.break_start);
        self.apply(|data| upsert(&mut data.records, record.clone()));
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn end_break(&self) -> Result<TimeClockRecord> {
        let (_, open) = self.require(SessionAction::EndBreak, AttendanceState::OnBreak)?;
        let record = self.api.end_break(&open.id).await?;
        info!(
            "Break ended at {:?}, lasted {}s",
            record.break_end,
            record.closed_break_seconds()
        );
        self.apply(|data| {
            data.ledger.close_break(&record);
            upsert(&mut data.records, record.clone());
        });
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn clock_out(&self) -> Result<TimeClockRecord> {
        let (employee, open) = self.require(SessionAction::ClockOut, AttendanceState::Working)?;
        let record = self
            .api
            .clock_out(ClockOutRequest {
                employee_id: employee,
                time_clock_id: open.id,
            })
            .await?;
        info!("Clocked out at {:?}", record.clock_out);
        self.apply(|data| upsert(&mut data.records, record.clone()));
        Ok(record)
    }
}

fn upsert(records: &mut Vec<TimeClockRecord>, record: TimeClockRecord) {
    match records.iter_mut().find(|v| v.id == record.id) {
        Some(existing) => *existing = record,
        None => {
            records.push(record);
            records.sort_by_key(|v| v.clock_in);
        }
    }
}
