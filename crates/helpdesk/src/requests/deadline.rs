use chrono::{NaiveDateTime, NaiveTime};

use super::domain::{Priority, RequestType};
use super::holidays::HolidayCalendar;

/// Deadlines always close at the end of the business day, local time.
pub const END_OF_BUSINESS_DAY: NaiveTime = match NaiveTime::from_hms_opt(18, 0, 0) {
    Some(time) => time,
    None => panic!("18:00 is a valid time of day"),
};

const UNRECOGNIZED_TYPE_DAYS: u32 = 3;

/// Service level, in business days, granted to each request type.
pub fn base_business_days(request_type: &RequestType) -> u32 {
    match request_type {
        RequestType::General => 1,
        RequestType::Systems => 10,
        RequestType::StockAdjustment => 2,
        RequestType::EquipmentRequest => 10,
        RequestType::PreventiveMaintenance => 5,
        RequestType::Other(_) => UNRECOGNIZED_TYPE_DAYS,
    }
}

/// Business days after the priority adjustment; never below one.
pub fn business_days_for(request_type: &RequestType, priority: Priority) -> u32 {
    let base = base_business_days(request_type);
    match priority {
        Priority::High => base.saturating_sub(1).max(1),
        Priority::Medium => base,
        Priority::Low => base + 1,
    }
}

/// Due timestamp for a request created at `created_at`.
///
/// Counting starts on the day after creation, so the result always lands at
/// least one business day ahead regardless of the creation time of day.
pub fn compute_deadline(
    request_type: &RequestType,
    priority: Priority,
    created_at: NaiveDateTime,
    holidays: &HolidayCalendar,
) -> NaiveDateTime {
    let mut remaining = business_days_for(request_type, priority);
    let mut date = created_at.date();

    while remaining > 0 {
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if holidays.is_business_day(date) {
            remaining -= 1;
        }
    }

    date.and_time(END_OF_BUSINESS_DAY)
}
