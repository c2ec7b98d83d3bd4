use proptest::prelude::*;
use vs_core::{allowed_transitions, validate_transition, ProblemStatement, RunId, SolveRun, Stage};

#[test]
fn test_code_generated_transitions() {
    assert!(validate_transition(Stage::CodeGenerated, Stage::Validated).is_ok());
    assert!(validate_transition(Stage::CodeGenerated, Stage::CodeGenerated).is_ok());
    assert!(validate_transition(Stage::CodeGenerated, Stage::Failed).is_ok());

    // Invalid
    assert!(validate_transition(Stage::CodeGenerated, Stage::Executed).is_err());
    assert!(validate_transition(Stage::CodeGenerated, Stage::Understood).is_err());
}

#[test]
fn test_verified_cannot_skip_enrichment() {
    assert!(validate_transition(Stage::Verified, Stage::Explained).is_ok());
    assert!(validate_transition(Stage::Verified, Stage::Assembled).is_err());
}

fn any_stage() -> impl Strategy<Value = Stage> {
    prop_oneof![
        Just(Stage::Parsed),
        Just(Stage::Understood),
        Just(Stage::CodeGenerated),
        Just(Stage::Validated),
        Just(Stage::Executed),
        Just(Stage::Verified),
        Just(Stage::Explained),
        Just(Stage::Visualized),
        Just(Stage::Assembled),
        Just(Stage::Failed),
    ]
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_stage(), to in any_stage()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_transitions_never_go_backward(from in any_stage(), to in any_stage()) {
        if validate_transition(from, to).is_ok() {
            prop_assert!(to >= from);
        }
    }

    #[test]
    fn prop_runs_stay_monotonic(targets in proptest::collection::vec(any_stage(), 0..24)) {
        let mut run = SolveRun::new(RunId::new(), ProblemStatement::new("x"));
        let mut previous = run.stage();
        for target in targets {
            let before = run.stage();
            match run.advance(target) {
                Ok(()) => prop_assert_eq!(run.stage(), target),
                Err(_) => prop_assert_eq!(run.stage(), before),
            }
            prop_assert!(run.stage() >= previous);
            previous = run.stage();
        }
    }
}
