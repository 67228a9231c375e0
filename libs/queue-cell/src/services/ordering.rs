// libs/queue-cell/src/services/ordering.rs
//! Pure queue arithmetic, applied to a snapshot after every mutation.

use crate::models::{QueueEntry, QueueEntryStatus};

/// Stable sort: in-progress first, then higher priority, then earlier scheduled time.
pub fn sort_entries(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| {
        let a_active = a.status == QueueEntryStatus::InProgress;
        let b_active = b.status == QueueEntryStatus::InProgress;
        b_active
            .cmp(&a_active)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.scheduled_time.cmp(&b.scheduled_time))
    });
}

/// Assigns cumulative waits to waiting entries in their current order.
/// Other entries are left untouched.
pub fn calculate_wait_times(entries: &mut [QueueEntry], average_minutes: u32) {
    let mut cumulative = 0u32;
    for entry in entries
        .iter_mut()
        .filter(|entry| entry.status == QueueEntryStatus::Waiting)
    {
        entry.estimated_wait_time = Some(cumulative);
        cumulative = cumulative.saturating_add(average_minutes);
    }
}

/// `round((old + observed) / 2)`, rounding halves up.
pub fn rolling_average(old_minutes: u32, observed_minutes: u32) -> u32 {
    let sum = old_minutes.saturating_add(observed_minutes);
    sum / 2 + sum % 2
}
