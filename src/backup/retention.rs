//! Decides which archive copies are surplus.
//!
//! Archive copies are grouped by the local calendar date of their mtime:
//!
//! * on or after the phase 1 cutover everything is kept,
//! * before it, one copy per day is kept,
//! * before the phase 2 cutover, one copy per week (weeks start on Monday).
//!
//! Within a bucket the newest mtime survives; ties go to the greatest path.

use crate::backup::found_file::FoundFile;

use bon::Builder;
use chrono::{Datelike, Days, NaiveDate};
use getset::Getters;
use serde::{Deserialize, Serialize};
use validator::Validate;

use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Validate, Serialize, Deserialize, Builder)]
pub struct RetentionConfig {
    /// Whole weeks, counted back from the start of the current week, during
    /// which every copy is kept. Disabled when absent or not positive, which
    /// also disables discarding entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase1_weeks: Option<i64>,
    /// Whole months, counted back from the first of the current month, after
    /// which daily thinning gives way to weekly thinning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase2_months: Option<i64>,
}

impl RetentionConfig {
    fn phase1(&self) -> Option<i64> {
        self.phase1_weeks.filter(|w| *w > 0)
    }

    fn phase2(&self) -> Option<i64> {
        self.phase2_months.filter(|m| *m > 0)
    }
}

/// An archive copy along with the source it was made from.
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct ArchiveEntry {
    file: FoundFile,
    /// Path of the archive copy with its timestamp and sequence number cut out.
    base_identity: String,
}

impl ArchiveEntry {
    pub fn new<S: Into<String>>(file: FoundFile, base_identity: S) -> Self {
        ArchiveEntry {
            file,
            base_identity: base_identity.into(),
        }
    }

    /// Local calendar date of the copy's mtime.
    pub fn date(&self) -> Option<NaiveDate> {
        self.file.modified_local().map(|dt| dt.date_naive())
    }
}

/// Monday `weeks` weeks before the week containing `today`.
pub fn phase1_cutover(today: NaiveDate, weeks: i64) -> Option<NaiveDate> {
    let weeks = u64::try_from(weeks).ok()?;
    let back = u64::from(today.weekday().num_days_from_monday()).checked_add(weeks.checked_mul(7)?)?;
    today.checked_sub_days(Days::new(back))
}

/// First day of the month `months` months before the month containing `today`.
pub fn phase2_cutover(today: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total = i64::from(today.year())
        .checked_mul(12)?
        .checked_add(i64::from(today.month0()))?
        .checked_sub(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Tier {
    Daily,
    Weekly,
}

#[derive(Clone, Copy, Debug)]
struct Cutovers {
    phase1: NaiveDate,
    phase2: Option<NaiveDate>,
}

impl Cutovers {
    fn bucket_of(&self, date: NaiveDate) -> Option<(Tier, NaiveDate)> {
        if date >= self.phase1 {
            return None;
        }
        match self.phase2 {
            Some(phase2) if date < phase2 => {
                let monday = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
                Some((Tier::Weekly, monday))
            }
            _ => Some((Tier::Daily, date)),
        }
    }
}

type BucketKey = (Tier, NaiveDate, String);

#[derive(Default)]
struct Thinning {
    keep: HashMap<BucketKey, ArchiveEntry>,
    discard: Vec<FoundFile>,
}

impl Thinning {
    fn push(mut self, key: BucketKey, entry: ArchiveEntry) -> Self {
        match self.keep.remove(&key) {
            None => {
                self.keep.insert(key, entry);
            }
            Some(kept) => match rank(&entry, &kept) {
                Ordering::Greater => {
                    self.discard.push(kept.file);
                    self.keep.insert(key, entry);
                }
                Ordering::Less => {
                    self.discard.push(entry.file);
                    self.keep.insert(key, kept);
                }
                // same file listed twice
                Ordering::Equal => {
                    self.keep.insert(key, kept);
                }
            },
        }
        self
    }

    fn into_discard(self) -> Vec<FoundFile> {
        let mut discard = self.discard;
        discard.sort_by(|a, b| a.key().cmp(b.key()));
        discard.dedup_by(|a, b| a.key() == b.key());
        discard
    }
}

fn rank(a: &ArchiveEntry, b: &ArchiveEntry) -> Ordering {
    a.file
        .mtime()
        .total_cmp(&b.file.mtime())
        .then_with(|| a.file.key().cmp(b.file.key()))
}

/// Archive copies to delete, ordered by path.
///
/// The result depends only on the set of entries, not on their order.
pub fn files_to_discard<I>(entries: I, today: NaiveDate, config: &RetentionConfig) -> Vec<FoundFile>
where
    I: IntoIterator<Item = ArchiveEntry>,
{
    let Some(phase1) = config
        .phase1()
        .map(|weeks| phase1_cutover(today, weeks).unwrap_or(NaiveDate::MIN))
    else {
        return Vec::new();
    };
    let cutovers = Cutovers {
        phase1,
        phase2: config
            .phase2()
            .map(|months| phase2_cutover(today, months).unwrap_or(NaiveDate::MIN)),
    };
    tracing::debug!(
        "RETENTION: phase1 {} phase2 {:?}",
        cutovers.phase1,
        cutovers.phase2
    );

    entries
        .into_iter()
        .fold(Thinning::default(), |thinning, entry| {
            let Some(date) = entry.date() else {
                tracing::debug!("SKIP(NoDate): {:?}", entry.file.path());
                return thinning;
            };
            match cutovers.bucket_of(date) {
                None => thinning,
                Some((tier, key)) => {
                    let bucket = (tier, key, entry.base_identity.clone());
                    thinning.push(bucket, entry)
                }
            }
        })
        .into_discard()
}
