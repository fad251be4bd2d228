use std::collections::{HashMap, HashSet};

use dagweave::depends::{Outcome, Predicate, TaskCondition, parse, parse_optional};
use dagweave::errors::DagweaveError;

fn done(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn outcomes(pairs: &[(&str, Outcome)]) -> impl Fn(&str) -> Option<Outcome> {
    let map: HashMap<String, Outcome> = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    move |task: &str| map.get(task).copied()
}

#[test]
fn and_requires_both() {
    let p = parse("A && B").unwrap();
    assert!(!p.evaluate(&done(&[])));
    assert!(!p.evaluate(&done(&["A"])));
    assert!(p.evaluate(&done(&["A", "B"])));
}

#[test]
fn or_requires_either() {
    let p = parse("A || B").unwrap();
    assert!(!p.evaluate(&done(&[])));
    assert!(p.evaluate(&done(&["B"])));
    assert!(p.evaluate(&done(&["A", "B"])));
}

#[test]
fn and_binds_tighter_than_or() {
    // A || (B && C)
    let p = parse("A || B && C").unwrap();
    assert!(p.evaluate(&done(&["A"])));
    assert!(!p.evaluate(&done(&["B"])));
    assert!(p.evaluate(&done(&["B", "C"])));

    assert_eq!(p.to_string(), "(A || (B && C))");
}

#[test]
fn negation_binds_tightest_and_parentheses_group() {
    let p = parse("!A && B").unwrap();
    assert_eq!(p.to_string(), "(!A && B)");

    let q = parse("!(A && B)").unwrap();
    assert_eq!(q.to_string(), "!(A && B)");

    let r = parse("(A || B) && C").unwrap();
    assert!(!r.evaluate(&done(&["A"])));
    assert!(r.evaluate(&done(&["B", "C"])));
}

#[test]
fn qualifiers_parse() {
    let p = parse("A.Failed || B.Skipped || C.Completed || D.Succeeded").unwrap();
    let tasks: Vec<&str> = p.tasks().into_iter().collect();
    assert_eq!(tasks, vec!["A", "B", "C", "D"]);

    match parse("A.Failed").unwrap() {
        Predicate::Atom { task, condition } => {
            assert_eq!(task, "A");
            assert_eq!(condition, TaskCondition::Failed);
        }
        other => panic!("expected atom, got {other:?}"),
    }
}

#[test]
fn kleene_evaluation_waits_for_unfinished_tasks() {
    let p = parse("A && B").unwrap();

    assert_eq!(p.evaluate_with(&outcomes(&[])), None);
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Succeeded)])), None);
    // Decided early: B can no longer matter.
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Failed)])), Some(false));
    assert_eq!(
        p.evaluate_with(&outcomes(&[("A", Outcome::Succeeded), ("B", Outcome::Succeeded)])),
        Some(true)
    );
}

#[test]
fn kleene_or_is_satisfied_by_one_branch() {
    let p = parse("A || B").unwrap();

    assert_eq!(p.evaluate_with(&outcomes(&[("B", Outcome::Succeeded)])), Some(true));
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Skipped)])), None);
    assert_eq!(
        p.evaluate_with(&outcomes(&[("A", Outcome::Skipped), ("B", Outcome::Failed)])),
        Some(false)
    );
}

#[test]
fn negated_atom_needs_a_terminal_non_success() {
    let p = parse("!A").unwrap();

    assert_eq!(p.evaluate_with(&outcomes(&[])), None);
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Succeeded)])), Some(false));
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Failed)])), Some(true));
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Skipped)])), Some(true));
}

#[test]
fn completed_matches_success_and_failure_but_not_skip() {
    let p = parse("A.Completed").unwrap();

    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Succeeded)])), Some(true));
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Failed)])), Some(true));
    assert_eq!(p.evaluate_with(&outcomes(&[("A", Outcome::Skipped)])), Some(false));
}

#[test]
fn all_of_builds_a_conjunction() {
    let p = Predicate::all_of(["A", "B", "C"]).unwrap();
    assert_eq!(p, parse("A && B && C").unwrap());
    assert!(Predicate::all_of(Vec::<String>::new()).is_none());
}

#[test]
fn blank_depends_means_no_predicate() {
    assert!(parse_optional(None).unwrap().is_none());
    assert!(parse_optional(Some("   ")).unwrap().is_none());
    assert!(parse_optional(Some("A")).unwrap().is_some());
}

#[test]
fn syntax_errors_report_a_position() {
    let cases = [
        ("A &&", 4),
        ("A & B", 2),
        ("A | B", 2),
        ("(A || B", 7),
        ("A B", 2),
        ("&& A", 0),
        ("A.Done", 0),
        ("A + B", 2),
    ];

    for (expr, expected) in cases {
        match parse(expr) {
            Err(DagweaveError::DependencySyntax { position, expression, .. }) => {
                assert_eq!(expression, expr);
                assert_eq!(position, expected, "position for {expr:?}");
            }
            other => panic!("expected DependencySyntax for {expr:?}, got {other:?}"),
        }
    }
}

#[test]
fn empty_expression_is_a_syntax_error() {
    assert!(matches!(
        parse("  "),
        Err(DagweaveError::DependencySyntax { .. })
    ));
}
