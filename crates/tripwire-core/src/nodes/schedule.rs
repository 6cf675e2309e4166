//! Event-schedule nodes and schedule-window persistence.

use chrono::{NaiveTime, Timelike};
use tripwire_types::ScheduleWindow;

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter};

/// Owner of an event name.
///
/// While the node lives in a world, its header's event name is registered
/// in the world's registry together with [`window`](Self::window). Every
/// node sharing that event name is gated by the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSchedule {
    /// When the event is active.
    pub window: ScheduleWindow,
}

impl EventSchedule {
    /// Create a schedule active during `window`.
    pub const fn new(window: ScheduleWindow) -> Self {
        Self { window }
    }
}

const WINDOW_ALWAYS: u8 = 0;
const WINDOW_BETWEEN: u8 = 1;
const WINDOW_DAILY: u8 = 2;

pub(crate) fn encode_window(
    window: &ScheduleWindow,
    w: &mut SaveWriter,
) -> Result<(), CodecError> {
    match window {
        ScheduleWindow::Always => w.write_tag(WINDOW_ALWAYS),
        ScheduleWindow::Between { start, end } => {
            w.write_tag(WINDOW_BETWEEN)?;
            w.write_time(*start)?;
            w.write_time(*end)
        }
        ScheduleWindow::Daily {
            start,
            end,
            utc_offset_minutes,
        } => {
            w.write_tag(WINDOW_DAILY)?;
            w.put(&start.num_seconds_from_midnight())?;
            w.put(&end.num_seconds_from_midnight())?;
            w.put(utc_offset_minutes)
        }
    }
}

pub(crate) fn decode_window(r: &mut SaveReader<'_>) -> Result<ScheduleWindow, CodecError> {
    match r.read_tag()? {
        WINDOW_ALWAYS => Ok(ScheduleWindow::Always),
        WINDOW_BETWEEN => Ok(ScheduleWindow::Between {
            start: r.read_time()?,
            end: r.read_time()?,
        }),
        WINDOW_DAILY => Ok(ScheduleWindow::Daily {
            start: time_of_day(r.get()?)?,
            end: time_of_day(r.get()?)?,
            utc_offset_minutes: r.get()?,
        }),
        tag => Err(CodecError::UnknownTag {
            component: "schedule window",
            tag,
        }),
    }
}

fn time_of_day(secs: u32) -> Result<NaiveTime, CodecError> {
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).ok_or_else(|| CodecError::Invalid {
        component: "schedule window",
        reason: format!("{secs}s is not a time of day"),
    })
}

// Layout v1: window (daily windows allowed)
// Layout v0: window (always / between only)
impl Persist for EventSchedule {
    const NAME: &'static str = "event schedule";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        encode_window(&self.window, w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        r.read_version(Self::NAME, Self::VERSION)?;
        Ok(Self {
            window: decode_window(r)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn round_trip(window: ScheduleWindow) -> ScheduleWindow {
        let mut w = SaveWriter::new();
        EventSchedule::new(window).encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        EventSchedule::decode(&mut SaveReader::new(&bytes))
            .unwrap()
            .window
    }

    #[test]
    fn windows_survive_persistence() {
        let between = ScheduleWindow::Between {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };
        assert_eq!(round_trip(between.clone()), between);

        let daily = ScheduleWindow::Daily {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
            utc_offset_minutes: -300,
        };
        assert_eq!(round_trip(daily.clone()), daily);
    }
}
