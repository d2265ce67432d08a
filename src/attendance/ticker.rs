use std::{sync::Arc, time::Duration};

use chrono::TimeZone;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{session::SessionView, state::SessionSnapshot};
use crate::utils::clock::Clock;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Publishes a fresh [SessionSnapshot] every tick while it changes. Every tick recomputes from
/// the stored timestamps, so missed ticks (for example after the machine slept) need no catching
/// up.
pub struct ElapsedTicker<Tz: TimeZone> {
    view: SessionView<Tz>,
    next: mpsc::Sender<SessionSnapshot>,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl<Tz: TimeZone> ElapsedTicker<Tz> {
    pub fn new(
        view: SessionView<Tz>,
        next: mpsc::Sender<SessionSnapshot>,
        shutdown: CancellationToken,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            view,
            next,
            shutdown,
            clock,
            period,
        }
    }

    /// Executes the ticker loop. Stops on cancellation, when the receiver goes away or when the
    /// session is detached.
    pub async fn run(self) {
        let mut tick_point = self.clock.instant();
        let mut last_sent: Option<SessionSnapshot> = None;
        loop {
            if !self.view.is_attached() {
                debug!("Session detached, stopping ticker");
                return;
            }

            let snapshot = self.view.snapshot();
            if last_sent.as_ref() != Some(&snapshot) {
                trace!(
                    "Tick {} worked={}s break={}s",
                    snapshot.state,
                    snapshot.worked_seconds,
                    snapshot.break_seconds
                );
                if self.next.send(snapshot.clone()).await.is_err() {
                    debug!("Snapshot receiver closed, stopping ticker");
                    return;
                }
                last_sent = Some(snapshot);
            }

            // Schedule from the previous tick point, never replay ticks that were missed.
            tick_point = (tick_point + self.period).max(self.clock.instant());

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{ElapsedTicker, DEFAULT_TICK};
    use crate::{
        api::{entities::TimeClockRecord, MockTimekeepingApi},
        attendance::{session::TimeClockSession, state::AttendanceState},
        utils::{clock::TokioClock, logging::TEST_LOGGING},
    };

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_wall_clock() {
        *TEST_LOGGING;
        let start = Utc.from_utc_datetime(
            &TEST_DATE.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        );
        let clock = Arc::new(TokioClock::starting_at(start));
        let mut api = MockTimekeepingApi::new();
        api.expect_list_time_clocks().returning(move |_| {
            Ok(vec![TimeClockRecord {
                id: "r1".into(),
                employee_id: "e1".into(),
                shift_id: None,
                clock_in: start - chrono::Duration::hours(1),
                clock_out: None,
                break_start: None,
                break_end: None,
                total_hours: None,
            }])
        });
        let session = TimeClockSession::new(Some("e1".into()), Arc::new(api), clock.clone(), Utc);
        session.refresh().await.unwrap();

        let (sender, mut receiver) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let ticker = ElapsedTicker::new(
            session.view(),
            sender,
            shutdown.clone(),
            clock.clone(),
            DEFAULT_TICK,
        );

        let (_, collected) = tokio::join!(ticker.run(), async {
            let mut collected = vec![];
            for _ in 0..3 {
                collected.push(receiver.recv().await.unwrap());
            }
            // Everything the ticker computes is derived from time, so jumping ahead is fine.
            tokio::time::advance(Duration::from_secs(60)).await;
            collected.push(receiver.recv().await.unwrap());
            shutdown.cancel();
            collected
        });

        assert!(collected.iter().all(|v| v.state == AttendanceState::Working));
        assert_eq!(collected[0].worked_seconds, 3600);
        assert_eq!(collected[1].worked_seconds, 3601);
        assert_eq!(collected[2].worked_seconds, 3602);
        assert!(collected[3].worked_seconds >= 3662);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_session_stops_ticker() {
        let start = Utc.from_utc_datetime(&TEST_DATE.and_time(NaiveTime::MIN));
        let clock = Arc::new(TokioClock::starting_at(start));
        let session = TimeClockSession::new(
            Some("e1".into()),
            Arc::new(MockTimekeepingApi::new()),
            clock.clone(),
            Utc,
        );
        let (sender, mut receiver) = mpsc::channel(4);
        let ticker = ElapsedTicker::new(
            session.view(),
            sender,
            CancellationToken::new(),
            clock,
            DEFAULT_TICK,
        );

        session.detach();
        ticker.run().await;
        assert!(receiver.recv().await.is_none());
    }
}
