use ansi_term::Colour;
use chrono::{DateTime, Duration, Local, Utc};

use crate::{
    api::entities::Shift,
    attendance::{
        report::AttendanceSummary,
        state::{AttendanceState, SessionSnapshot},
    },
    schedule::{missed::SweepReport, slots::SlotGrid},
};

/// `HH:MM:SS`, the way a running clock is shown. Hours keep growing past 24.
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

pub fn format_duration(seconds: i64) -> String {
    let v = Duration::seconds(seconds.max(0));
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}

fn paint_state(state: AttendanceState) -> String {
    let colour = match state {
        AttendanceState::Idle => Colour::White,
        AttendanceState::Working => Colour::Green,
        AttendanceState::OnBreak => Colour::Yellow,
        AttendanceState::Finished => Colour::Blue,
    };
    colour.bold().paint(state.describe()).to_string()
}

/// One line summary of a session, also used for every tick of `watch`.
pub fn snapshot_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "{}\tworked {}\tbreaks {}",
        paint_state(snapshot.state),
        format_clock(snapshot.worked_seconds),
        format_clock(snapshot.break_seconds)
    );
    if let Some(current) = snapshot.current_break_seconds {
        line.push_str(&format!("\ton break for {}", format_clock(current)));
    }
    line
}

pub fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("{}", snapshot_line(snapshot));
    if let Some(record) = &snapshot.record {
        let clock_out = record
            .clock_out
            .map(local_time)
            .unwrap_or_else(|| "...".into());
        println!("{}\t{} - {}", record.id, local_time(record.clock_in), clock_out);
    }
}

pub fn print_summary(summary: &AttendanceSummary) {
    for day in &summary.days {
        let clock_out = match (day.open, day.clock_out) {
            (true, _) | (false, None) => "...".to_string(),
            (false, Some(v)) => local_time(v),
        };
        println!(
            "{}\t{} - {}\t{}\tbreaks {}",
            day.date.format("%x"),
            local_time(day.clock_in),
            clock_out,
            format_duration(day.worked_seconds),
            format_duration(day.break_seconds)
        );
    }
    if summary.days.is_empty() {
        println!("No time clock records between {} and {}", summary.from, summary.to);
        return;
    }
    println!(
        "{}\t{}\tbreaks {}",
        Colour::White.bold().paint("Total"),
        format_duration(summary.worked_seconds),
        format_duration(summary.break_seconds)
    );
}

pub fn shift_line(shift: &Shift) -> String {
    format!(
        "{}\t{}\t{} {} - {}\t{}",
        shift.id,
        shift.employee_id,
        shift.start_time.with_timezone(&Local).format("%x"),
        local_time(shift.start_time),
        local_time(shift.end_time),
        if shift.is_missed { "missed" } else { "" }
    )
}

pub fn print_sweep(report: &SweepReport) {
    for id in &report.flagged {
        println!("{}\t{id}", Colour::Red.paint("missed"));
    }
    for id in &report.attended {
        println!("{}\t{id}", Colour::Green.paint("attended"));
    }
    for (id, reason) in &report.failed {
        println!("{}\t{id}\t{reason}", Colour::Yellow.paint("failed"));
    }
    println!(
        "{} flagged, {} attended, {} failed",
        report.flagged.len(),
        report.attended.len(),
        report.failed.len()
    );
}

pub fn print_conflicts(pairs: &[(&Shift, &Shift)]) {
    if pairs.is_empty() {
        println!("No conflicting shifts");
        return;
    }
    for (a, b) in pairs {
        println!("{}", Colour::Red.bold().paint("conflict"));
        println!("  {}", shift_line(a));
        println!("  {}", shift_line(b));
    }
}

pub fn print_grid(grid: &SlotGrid<'_>) {
    println!("{}", grid.date.format("%x"));
    for row in &grid.rows {
        println!(
            "{} ({:02}:00 - {:02}:00)",
            Colour::White.bold().paint(row.slot.name.as_str()),
            row.slot.start_hour,
            row.slot.end_hour
        );
        for shift in &row.shifts {
            println!("  {}", shift_line(shift));
        }
    }
    if !grid.unassigned.is_empty() {
        println!("{}", Colour::Yellow.bold().paint("Outside of any slot"));
        for shift in &grid.unassigned {
            println!("  {}", shift_line(shift));
        }
    }
}
