use crate::date::LocalFields;

/// Symmetric tolerance around the reminder minute. Must stay larger than the tick interval.
pub const DUE_TOLERANCE_MINUTES: u32 = 5;

pub fn is_due(reminder: &LocalFields, now: &LocalFields) -> bool {
    is_due_within(reminder, now, DUE_TOLERANCE_MINUTES)
}

/// Due when both fall on the same local calendar day and their minute-of-day values are at
/// most `tolerance_minutes` apart. Proximity across midnight never counts.
pub fn is_due_within(reminder: &LocalFields, now: &LocalFields, tolerance_minutes: u32) -> bool {
    reminder.same_day(now)
        && reminder.minute_of_day().abs_diff(now.minute_of_day()) <= tolerance_minutes
}
