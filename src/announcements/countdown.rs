//! Spoken countdown announcements

use super::Announcement;

/// Picks the announcement for a remaining-seconds value
#[derive(Debug, Clone)]
pub struct CountdownAnnouncements {
    table: Vec<(i64, Announcement)>,
    last_spoken: Option<i64>,
}

fn minute_form(seconds: i64) -> Announcement {
    if seconds % 60 == 0 {
        Announcement::CountdownMinutes {
            minutes: seconds / 60,
        }
    } else {
        Announcement::CountdownMinutesSeconds {
            minutes: seconds / 60,
            seconds: seconds % 60,
        }
    }
}

impl CountdownAnnouncements {
    pub fn new() -> Self {
        let mut table = Vec::new();
        for s in (1..=10).rev() {
            table.push((s, Announcement::CountdownShort { seconds: s }));
        }
        for s in (15..=60).step_by(5) {
            table.push((s, Announcement::CountdownSeconds { seconds: s }));
        }
        for s in (75..=600).step_by(15) {
            table.push((s, minute_form(s)));
        }
        for s in (630..=1_800).step_by(30) {
            table.push((s, minute_form(s)));
        }
        Self {
            table,
            last_spoken: None,
        }
    }

    /// Announcement for `countdown_s`, unless there is none or it was just spoken
    pub fn select(&mut self, countdown_s: i64) -> Option<Announcement> {
        if self.last_spoken == Some(countdown_s) {
            return None;
        }
        let announcement = self
            .table
            .iter()
            .find(|(s, _)| *s == countdown_s)
            .map(|(_, a)| *a)?;
        self.last_spoken = Some(countdown_s);
        Some(announcement)
    }

    pub fn reset(&mut self) {
        self.last_spoken = None;
    }
}

impl Default for CountdownAnnouncements {
    fn default() -> Self {
        Self::new()
    }
}
