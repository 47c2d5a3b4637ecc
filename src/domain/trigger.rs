use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Smallest delay the notification port accepts.
pub const MIN_TRIGGER_DELAY_SECONDS: u64 = 1;

/// Next wall-clock occurrence of `slot_time` at or after `now`. A time that
/// has already passed today resolves to the same clock time tomorrow.
pub fn next_trigger_at(slot_time: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(slot_time);
    if today < now {
        today + Duration::days(1)
    } else {
        today
    }
}

pub fn trigger_delay_seconds(slot_time: NaiveTime, now: NaiveDateTime) -> u64 {
    let seconds = (next_trigger_at(slot_time, now) - now).num_seconds();
    u64::try_from(seconds)
        .unwrap_or(MIN_TRIGGER_DELAY_SECONDS)
        .max(MIN_TRIGGER_DELAY_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use proptest::prelude::*;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(hour, minute, second)
            .expect("valid time")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn upcoming_slot_fires_today() {
        assert_eq!(trigger_delay_seconds(time(9, 38), at(8, 0, 0)), 98 * 60);
        assert_eq!(next_trigger_at(time(9, 38), at(8, 0, 0)), at(9, 38, 0));
    }

    #[test]
    fn elapsed_slot_rolls_over_to_tomorrow() {
        let now = at(10, 0, 0);
        assert_eq!(next_trigger_at(time(9, 38), now), at(9, 38, 0) + Duration::days(1));
        assert_eq!(trigger_delay_seconds(time(9, 38), now), (24 * 60 - 22) * 60);
    }

    #[test]
    fn slot_at_current_instant_gets_minimum_delay() {
        assert_eq!(trigger_delay_seconds(time(9, 38), at(9, 38, 0)), MIN_TRIGGER_DELAY_SECONDS);
        let almost = at(9, 37, 59) + Duration::milliseconds(500);
        assert_eq!(trigger_delay_seconds(time(9, 38), almost), MIN_TRIGGER_DELAY_SECONDS);
    }

    // Feature: reminders, trigger time is never in the past and never non-positive
    proptest! {
        #[test]
        fn trigger_is_same_clock_time_and_strictly_ahead(
            slot_minutes in 0u32..(24 * 60),
            now_seconds in 0u32..(24 * 60 * 60),
        ) {
            let slot = time(slot_minutes / 60, slot_minutes % 60);
            let now = at(now_seconds / 3600, (now_seconds / 60) % 60, now_seconds % 60);

            let trigger = next_trigger_at(slot, now);
            let delay = trigger_delay_seconds(slot, now);

            prop_assert!(trigger >= now);
            prop_assert!(trigger - now < Duration::days(1));
            prop_assert_eq!(trigger.time(), slot);
            prop_assert_eq!(trigger.second(), 0);
            prop_assert!(delay >= MIN_TRIGGER_DELAY_SECONDS);
            if slot < now.time() {
                prop_assert_eq!(trigger.date(), now.date().succ_opt().expect("next day"));
            }
        }
    }
}
