use crate::domain::models::{PlanState, Slot};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("slot index {index} out of range for schedule of {len} slots")]
pub struct SlotIndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// True when the schedule is non-empty and every slot is active.
pub fn all_active(schedule: &[Slot]) -> bool {
    !schedule.is_empty() && schedule.iter().all(|slot| slot.active)
}

pub fn toggle_one(schedule: &[Slot], index: usize) -> Result<Vec<Slot>, SlotIndexOutOfRange> {
    if index >= schedule.len() {
        return Err(SlotIndexOutOfRange {
            index,
            len: schedule.len(),
        });
    }
    let mut updated = schedule.to_vec();
    updated[index].active = !updated[index].active;
    Ok(updated)
}

pub fn toggle_all(schedule: &[Slot], target: bool) -> Vec<Slot> {
    schedule
        .iter()
        .map(|slot| Slot {
            time: slot.time.clone(),
            active: target,
        })
        .collect()
}

impl PlanState {
    /// Swaps in a whole new sequence and recomputes `all_active`.
    pub fn replace_schedule(&mut self, schedule: Vec<Slot>) {
        self.all_active = all_active(&schedule);
        self.schedule = schedule;
    }

    /// Returns the slot's new activation state.
    pub fn toggle_slot(&mut self, index: usize) -> Result<bool, SlotIndexOutOfRange> {
        let updated = toggle_one(&self.schedule, index)?;
        let now_active = updated[index].active;
        self.replace_schedule(updated);
        Ok(now_active)
    }

    pub fn set_all(&mut self, target: bool) {
        let updated = toggle_all(&self.schedule, target);
        self.replace_schedule(updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Settings;
    use proptest::prelude::*;

    fn schedule_from_flags(flags: &[bool]) -> Vec<Slot> {
        flags
            .iter()
            .enumerate()
            .map(|(position, active)| Slot {
                time: format!("{:02}:00", 8 + position % 14),
                active: *active,
            })
            .collect()
    }

    #[test]
    fn toggle_one_flips_only_target() {
        let schedule = schedule_from_flags(&[false, true, false]);
        let updated = toggle_one(&schedule, 2).expect("toggle");
        assert_eq!(
            updated.iter().map(|slot| slot.active).collect::<Vec<_>>(),
            vec![false, true, true]
        );
        assert!(!schedule[2].active, "input sequence is not mutated");
    }

    #[test]
    fn toggle_one_rejects_out_of_range_index() {
        let schedule = schedule_from_flags(&[false, false]);
        assert_eq!(
            toggle_one(&schedule, 2),
            Err(SlotIndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn all_active_requires_non_empty_schedule() {
        assert!(!all_active(&[]));
        assert!(all_active(&schedule_from_flags(&[true, true])));
        assert!(!all_active(&schedule_from_flags(&[true, false])));
    }

    #[test]
    fn plan_state_tracks_all_active_across_mutations() {
        let mut state = PlanState::new(Settings::default(), schedule_from_flags(&[true, false]));
        assert!(!state.all_active);

        assert_eq!(state.toggle_slot(1), Ok(true));
        assert!(state.all_active);

        state.set_all(false);
        assert!(!state.all_active);
        assert!(state.schedule.iter().all(|slot| !slot.active));

        state.set_all(true);
        assert!(state.all_active);

        state.replace_schedule(schedule_from_flags(&[false, false, false]));
        assert!(!state.all_active);
    }

    // Feature: slot activation, toggling one slot never touches the others
    proptest! {
        #[test]
        fn toggle_one_changes_exactly_one_slot(
            flags in prop::collection::vec(any::<bool>(), 1..40),
            pick in any::<prop::sample::Index>(),
        ) {
            let schedule = schedule_from_flags(&flags);
            let index = pick.index(schedule.len());
            let updated = toggle_one(&schedule, index).expect("index in range");

            prop_assert_eq!(updated.len(), schedule.len());
            for (position, (before, after)) in schedule.iter().zip(&updated).enumerate() {
                prop_assert_eq!(&before.time, &after.time);
                if position == index {
                    prop_assert_eq!(after.active, !before.active);
                } else {
                    prop_assert_eq!(after.active, before.active);
                }
            }
        }
    }

    // Feature: slot activation, bulk toggle sets every slot
    proptest! {
        #[test]
        fn toggle_all_sets_every_slot(
            flags in prop::collection::vec(any::<bool>(), 1..40),
            target in any::<bool>(),
        ) {
            let mut state = PlanState::new(Settings::default(), schedule_from_flags(&flags));
            state.set_all(target);
            prop_assert!(state.schedule.iter().all(|slot| slot.active == target));
            prop_assert_eq!(state.all_active, target);
        }
    }
}
