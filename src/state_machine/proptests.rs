//! Property-based tests for the stage state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::protocol::StageEvent;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_data() -> impl Strategy<Value = serde_json::Value> {
    "[a-zA-Z ]{0,20}".prop_map(|text| json!({"response": text}))
}

fn arb_stage_event() -> impl Strategy<Value = StageEvent> {
    prop_oneof![
        Just(StageEvent::Stage1Start),
        arb_data().prop_map(|data| StageEvent::Stage1Complete { data }),
        Just(StageEvent::Stage2Start),
        (arb_data(), arb_data())
            .prop_map(|(data, metadata)| StageEvent::Stage2Complete { data, metadata }),
        Just(StageEvent::Stage3Start),
        arb_data().prop_map(|data| StageEvent::Stage3Complete { data }),
        Just(StageEvent::TitleComplete),
        Just(StageEvent::Complete),
        "[a-z ]{1,20}".prop_map(|message| StageEvent::Error { message }),
        "[a-z_]{1,12}".prop_map(|event_type| StageEvent::Unrecognized { event_type }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        9 => arb_stage_event().prop_map(Event::Stream),
        1 => "[a-z ]{1,20}".prop_map(|reason| Event::Disconnected { reason }),
    ]
}

/// The ordered happy path, with optional noise that the ordering contract
/// allows: `title_complete` and unknown event types anywhere before the end.
fn happy_path() -> Vec<StageEvent> {
    vec![
        StageEvent::Stage1Start,
        StageEvent::Stage1Complete { data: json!("A") },
        StageEvent::Stage2Start,
        StageEvent::Stage2Complete {
            data: json!("B"),
            metadata: json!({"label_to_model": {}}),
        },
        StageEvent::Stage3Start,
        StageEvent::Stage3Complete { data: json!("C") },
        StageEvent::Complete,
    ]
}

fn arb_ordered_sequence() -> impl Strategy<Value = Vec<StageEvent>> {
    proptest::collection::vec((0usize..7, prop_oneof![
        Just(StageEvent::TitleComplete),
        Just(StageEvent::Unrecognized { event_type: "heartbeat".to_string() }),
    ]), 0..4)
        .prop_map(|noise| {
            let mut events = happy_path();
            // Insert from the back so earlier indices stay valid
            let mut noise = noise;
            noise.sort_by(|a, b| b.0.cmp(&a.0));
            for (index, event) in noise {
                events.insert(index, event);
            }
            events
        })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Invariant 1: exactly one loading flag while pending, none after complete
    #[test]
    fn prop_single_loading_flag_until_complete(events in arb_ordered_sequence()) {
        let mut state = StageState::default();

        for event in events {
            let terminal = event.is_terminal();
            let result = transition(&state, Event::Stream(event));
            prop_assert!(result.is_ok(), "Ordered event rejected: {:?}", result);
            state = result.unwrap().new_state;

            if state.pending_stage().is_some() {
                prop_assert_eq!(state.loading().count(), 1, "state: {:?}", state);
            }
            if terminal {
                prop_assert_eq!(&state, &StageState::Settled);
                prop_assert!(!state.loading().any());
            }
        }
    }

    // Invariant 2: any prefix of the ordered sequence keeps at most one flag set
    #[test]
    fn prop_prefix_has_at_most_one_flag(cut in 0usize..7) {
        let mut state = StageState::default();
        for event in happy_path().into_iter().take(cut) {
            state = transition(&state, Event::Stream(event)).unwrap().new_state;
        }
        prop_assert!(state.loading().count() <= 1);
    }

    // Invariant 3: arbitrary sequences never reach an invalid combination
    #[test]
    fn prop_arbitrary_events_keep_state_consistent(
        events in proptest::collection::vec(arb_event(), 0..20)
    ) {
        let mut state = StageState::default();

        for event in events {
            let before = state.clone();
            match transition(&state, event) {
                Ok(result) => {
                    let closes = result.effects.contains(&Effect::CloseSession);
                    // Closing a session always leaves final data behind
                    prop_assert!(!closes || result.new_state.is_final());
                    // Stage data is only written for the stage that was pending
                    for effect in &result.effects {
                        if let Effect::StoreStage { stage, .. } = effect {
                            prop_assert_eq!(Some(*stage), before.pending_stage());
                        }
                    }
                    state = result.new_state;
                }
                Err(_) => { /* Rejected events leave the state untouched */ }
            }
            prop_assert!(state.loading().count() <= 1, "state: {:?}", state);
        }
    }

    // Invariant 4: an error event keeps whatever arrived and clears all flags
    #[test]
    fn prop_error_clears_flags(cut in 0usize..6, message in "[a-z ]{1,20}") {
        let mut state = StageState::default();
        for event in happy_path().into_iter().take(cut) {
            state = transition(&state, Event::Stream(event)).unwrap().new_state;
        }

        let result = transition(&state, Event::Stream(StageEvent::Error { message: message.clone() })).unwrap();
        prop_assert!(!result.new_state.loading().any());
        let expected = Effect::SurfaceError { message };
        prop_assert!(result.effects.contains(&expected));
        prop_assert!(!result.effects.iter().any(Effect::targets_message));
    }

    // Invariant 5: nothing is accepted once aborted
    #[test]
    fn prop_aborted_is_absorbing(event in arb_event(), message in "[a-z]{1,10}") {
        let aborted = StageState::Aborted { cause: AbortCause::Error { message } };
        let is_already_finished = matches!(
            transition(&aborted, event),
            Err(TransitionError::AlreadyFinished { .. })
        );
        prop_assert!(is_already_finished);
    }
}
