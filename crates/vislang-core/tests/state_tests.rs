use proptest::prelude::*;
use vislang_core::state_machine::{allowed_transitions, validate_transition, GenerationMachine};
use vislang_core::GenerationState;

fn any_state() -> impl Strategy<Value = GenerationState> {
    prop_oneof![
        Just(GenerationState::Drafting),
        Just(GenerationState::Validating),
        Just(GenerationState::Rendering),
        Just(GenerationState::Correcting),
        Just(GenerationState::Done),
        Just(GenerationState::Failed),
    ]
}

#[test]
fn test_drafting_transitions() {
    assert!(validate_transition(GenerationState::Drafting, GenerationState::Validating).is_ok());
    assert!(validate_transition(GenerationState::Drafting, GenerationState::Correcting).is_ok());

    // Invalid
    assert!(validate_transition(GenerationState::Drafting, GenerationState::Done).is_err());
    assert!(validate_transition(GenerationState::Drafting, GenerationState::Rendering).is_err());
}

#[test]
fn test_correcting_only_redrafts_or_fails() {
    assert!(validate_transition(GenerationState::Correcting, GenerationState::Drafting).is_ok());
    assert!(validate_transition(GenerationState::Correcting, GenerationState::Failed).is_ok());

    assert!(validate_transition(GenerationState::Correcting, GenerationState::Done).is_err());
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_state(), to in any_state()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    /// Any sequence of outcomes ends within the budget and only walks legal edges
    #[test]
    fn prop_machine_respects_budget(
        max in 1usize..6,
        outcomes in proptest::collection::vec(any::<bool>(), 0..40),
    ) {
        let mut machine = GenerationMachine::new(max);
        for passed in outcomes {
            if machine.is_terminal() {
                break;
            }
            if passed {
                machine.pass();
            } else if machine.fail() == GenerationState::Correcting {
                machine.redraft();
            }
        }

        prop_assert!(machine.attempt() <= max);
        for pair in machine.history().windows(2) {
            prop_assert!(validate_transition(pair[0], pair[1]).is_ok());
        }
        if machine.state() == GenerationState::Failed {
            prop_assert_eq!(machine.attempt(), max);
        }
    }
}
