use chrono::{DateTime, Datelike, Utc};

use atelier_core::{DomainError, DomainResult};

/// Sequential order references of the form `PREFIX-YYYY-NNNN`.
///
/// The sequence restarts at 1 every calendar year. Generators with the same
/// prefix order by position in the sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReferenceGenerator {
    prefix: String,
    year: i32,
    last: u32,
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            year: 0,
            last: 0,
        }
    }

    /// Continue after `last_reference`, e.g. one loaded from storage.
    pub fn resume_after(prefix: impl Into<String>, last_reference: &str) -> DomainResult<Self> {
        let prefix = prefix.into();
        let rest = last_reference
            .strip_prefix(prefix.as_str())
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(|| {
                DomainError::validation(format!("reference {last_reference} lacks prefix {prefix}"))
            })?;
        let (year, seq) = rest
            .split_once('-')
            .ok_or_else(|| DomainError::validation(format!("malformed reference {last_reference}")))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| DomainError::validation(format!("malformed year in {last_reference}")))?;
        let last = seq
            .parse::<u32>()
            .map_err(|_| DomainError::validation(format!("malformed sequence in {last_reference}")))?;
        Ok(Self { prefix, year, last })
    }

    pub fn next(&mut self, at: DateTime<Utc>) -> String {
        let year = at.year();
        if year != self.year {
            self.year = year;
            self.last = 0;
        }
        self.last += 1;
        format!("{}-{:04}-{:04}", self.prefix, self.year, self.last)
    }
}
