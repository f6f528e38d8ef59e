use crate::domain::models::Record;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

const WEEK_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketLabel {
    Today,
    Tomorrow,
    ThisWeek,
}

impl BucketLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Tomorrow => "Tomorrow",
            Self::ThisWeek => "This Week",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub label: BucketLabel,
    pub date_range: String,
    pub records: Vec<Record>,
}

/// Derived agenda view: regenerated from a cache snapshot on every read,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub buckets: Vec<DayBucket>,
    pub overdue: Vec<Record>,
    pub completed_today: usize,
    pub total_today: usize,
}

impl Projection {
    pub fn progress_percent(&self) -> f64 {
        if self.total_today == 0 {
            return 0.0;
        }
        self.completed_today as f64 / self.total_today as f64 * 100.0
    }

    pub fn all_today_completed(&self) -> bool {
        self.total_today > 0 && self.completed_today == self.total_today
    }

    pub fn has_overdue(&self) -> bool {
        !self.overdue.is_empty()
    }

    pub fn bucket(&self, label: BucketLabel) -> Option<&DayBucket> {
        self.buckets.iter().find(|bucket| bucket.label == label)
    }
}

/// Calendar date of an absolute instant in the viewer's timezone. Bucket
/// membership is decided on this, not on the UTC date, so items near
/// midnight do not land a day off.
pub fn local_due_date(due_at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    due_at.with_timezone(&tz).date_naive()
}

/// Pure projection of a record snapshot into day buckets plus the overdue
/// subset. Records without a due time have no temporal home and are
/// excluded entirely; overdue records are removed from the bucket they
/// would otherwise occupy.
pub fn project(records: &[Record], today: NaiveDate, tz: Tz) -> Projection {
    let tomorrow = today + Duration::days(1);
    let week_end = today + Duration::days(WEEK_WINDOW_DAYS);

    let mut dated: Vec<&Record> = records.iter().filter(|record| record.due_at.is_some()).collect();
    dated.sort_by_key(|record| record.due_at);

    let mut today_records = Vec::new();
    let mut tomorrow_records = Vec::new();
    let mut week_records = Vec::new();
    let mut overdue = Vec::new();

    for record in dated {
        let Some(due_at) = record.due_at else {
            continue;
        };
        let due_date = local_due_date(due_at, tz);

        if due_date < today {
            if !record.completed {
                overdue.push(record.clone());
            }
            continue;
        }
        if due_date == today {
            today_records.push(record.clone());
        } else if due_date == tomorrow {
            tomorrow_records.push(record.clone());
        } else if due_date <= week_end {
            week_records.push(record.clone());
        }
    }

    let completed_today = today_records.iter().filter(|record| record.completed).count();
    let total_today = today_records.len();

    let mut buckets = Vec::new();
    if !today_records.is_empty() {
        buckets.push(DayBucket {
            label: BucketLabel::Today,
            date_range: format_display_date(today),
            records: today_records,
        });
    }
    if !tomorrow_records.is_empty() {
        buckets.push(DayBucket {
            label: BucketLabel::Tomorrow,
            date_range: format_display_date(tomorrow),
            records: tomorrow_records,
        });
    }
    if !week_records.is_empty() {
        buckets.push(DayBucket {
            label: BucketLabel::ThisWeek,
            date_range: format!(
                "{} - {}",
                format_display_date(today + Duration::days(2)),
                format_display_date(week_end)
            ),
            records: week_records,
        });
    }

    Projection {
        buckets,
        overdue,
        completed_today,
        total_today,
    }
}

fn format_display_date(date: NaiveDate) -> String {
    date.format("%A, %b %-d").to_string()
}
