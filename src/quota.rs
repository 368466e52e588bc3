//! The quota tracker counts admitted analyses per client and calendar day.
//! Counts live in memory only; a new day starts every client at zero.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// A client and the day its requests are counted against
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QuotaKey {
    pub client: String,
    pub day: NaiveDate,
}

/// The result of asking the tracker to admit a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `count` is the client's total for the day including this request
    Admitted { count: u32 },

    /// The client already used `limit` requests today
    Denied { limit: u32 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Per-client daily request counter. One instance is shared by every request
/// handler; the check and the increment happen under a single lock.
#[derive(Debug)]
pub struct QuotaTracker {
    counts: Mutex<HashMap<QuotaKey, u32>>,
    daily_limit: u32,
}

impl QuotaTracker {
    pub fn new(daily_limit: u32) -> Self {
        QuotaTracker {
            counts: Mutex::new(HashMap::new()),
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Admit a request from `client` against today's local calendar day
    pub fn admit(&self, client: &str) -> Admission {
        self.admit_on(client, today())
    }

    /// Admit a request from `client` against `day`. A denied request leaves
    /// the count untouched
    pub fn admit_on(&self, client: &str, day: NaiveDate) -> Admission {
        let mut counts = self.lock();
        let count = counts
            .entry(QuotaKey {
                client: client.into(),
                day,
            })
            .or_insert(0);

        if *count >= self.daily_limit {
            return Admission::Denied {
                limit: self.daily_limit,
            };
        }

        *count += 1;
        Admission::Admitted { count: *count }
    }

    /// Requests admitted for `client` on `day`
    pub fn count(&self, client: &str, day: NaiveDate) -> u32 {
        let key = QuotaKey {
            client: client.into(),
            day,
        };
        self.lock().get(&key).copied().unwrap_or(0)
    }

    /// Drop every record for a day before `day`, returning how many were removed
    pub fn evict_before(&self, day: NaiveDate) -> usize {
        let mut counts = self.lock();
        let before = counts.len();
        counts.retain(|key, _| key.day >= day);
        let evicted = before - counts.len();

        debug!("evicted {evicted} quota records older than {day}");
        evicted
    }

    /// Number of (client, day) records currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QuotaKey, u32>> {
        // A poisoned map is still a valid set of counters
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The current calendar day in the server's local timezone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
