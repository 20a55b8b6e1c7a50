use crate::types::{ChoiceConfig, ChoiceSelection, ResolutionDelay};

/// Floor shown by the elevator counter: starts at the origin and moves one
/// floor per `per_unit_ms` toward the selection once it is locked in.
pub(super) fn floor_counter(
    choice: &ChoiceConfig,
    selection: &ChoiceSelection,
    now_ms: u64,
) -> Option<i64> {
    let ResolutionDelay::Travel {
        origin,
        per_unit_ms,
        ..
    } = choice.resolution
    else {
        return None;
    };
    if !selection.is_locked {
        return Some(origin);
    }
    let Some(target) = selection
        .selected_key
        .as_deref()
        .and_then(|key| key.parse::<i64>().ok())
    else {
        return Some(origin);
    };

    let travelled = (now_ms.saturating_sub(selection.locked_at_ms) / per_unit_ms.max(1)) as i64;
    let distance = (target - origin).abs();
    Some(origin + (target - origin).signum() * travelled.min(distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChoiceSet;

    fn elevator() -> ChoiceConfig {
        ChoiceConfig {
            options: ChoiceSet::NumericRange { min: 1, max: 30 },
            resolution: ResolutionDelay::Travel {
                origin: 1,
                per_unit_ms: 200,
                base_ms: 1_000,
            },
            award: 20,
            success_id: "up".to_string(),
            failure_id: "down".to_string(),
            failure_intermediate_id: None,
        }
    }

    fn locked(key: &str, at: u64) -> ChoiceSelection {
        ChoiceSelection {
            selected_key: Some(key.to_string()),
            is_locked: true,
            locked_at_ms: at,
        }
    }

    #[test]
    fn counter_rests_at_origin_until_locked() {
        assert_eq!(
            floor_counter(&elevator(), &ChoiceSelection::default(), 5_000),
            Some(1)
        );
    }

    #[test]
    fn counter_climbs_one_floor_per_step_and_stops_at_target() {
        let choice = elevator();
        let selection = locked("6", 1_000);
        assert_eq!(floor_counter(&choice, &selection, 1_000), Some(1));
        assert_eq!(floor_counter(&choice, &selection, 1_450), Some(3));
        assert_eq!(floor_counter(&choice, &selection, 9_000), Some(6));
    }

    #[test]
    fn fixed_delay_choices_have_no_counter() {
        let mut choice = elevator();
        choice.resolution = ResolutionDelay::Fixed { ms: 2_000 };
        assert_eq!(floor_counter(&choice, &locked("6", 0), 100), None);
    }
}
