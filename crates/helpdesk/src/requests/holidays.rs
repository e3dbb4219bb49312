use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A configured non-working calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

/// Exclusion set for business-day arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    days: BTreeMap<NaiveDate, String>,
}

impl HolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = Holiday>) -> Self {
        let days = holidays
            .into_iter()
            .map(|holiday| (holiday.date, holiday.name))
            .collect();
        Self { days }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, HolidayImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads a `date,name` CSV export. Dates may be ISO or `DD/MM/YYYY`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, HolidayImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut holidays = Vec::new();

        for (index, row) in csv_reader.deserialize::<HolidayRow>().enumerate() {
            let row = row?;
            let date = parse_holiday_date(&row.date).ok_or_else(|| {
                HolidayImportError::InvalidDate {
                    line: index + 2,
                    value: row.date.clone(),
                }
            })?;
            holidays.push(Holiday {
                date,
                name: row.name,
            });
        }

        Ok(Self::new(holidays))
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn holiday_name(&self, date: NaiveDate) -> Option<&str> {
        self.days.get(&date).map(String::as_str)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn holidays(&self) -> impl Iterator<Item = Holiday> + '_ {
        self.days.iter().map(|(date, name)| Holiday {
            date: *date,
            name: name.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct HolidayRow {
    #[serde(alias = "Date", alias = "data")]
    date: String,
    #[serde(default, alias = "Name", alias = "nome")]
    name: String,
}

fn parse_holiday_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .ok()
}

#[derive(Debug)]
pub enum HolidayImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidDate { line: usize, value: String },
}

impl std::fmt::Display for HolidayImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HolidayImportError::Io(err) => write!(f, "failed to read holiday calendar: {}", err),
            HolidayImportError::Csv(err) => write!(f, "invalid holiday CSV data: {}", err),
            HolidayImportError::InvalidDate { line, value } => write!(
                f,
                "holiday on line {} has an unreadable date '{}'",
                line, value
            ),
        }
    }
}

impl std::error::Error for HolidayImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HolidayImportError::Io(err) => Some(err),
            HolidayImportError::Csv(err) => Some(err),
            HolidayImportError::InvalidDate { .. } => None,
        }
    }
}

impl From<std::io::Error> for HolidayImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for HolidayImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}
