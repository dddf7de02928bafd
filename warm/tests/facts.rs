use ::{failure::Error, warm::prelude::*};

mod common;
use common::*;

#[test]
fn ground_query_has_no_variables() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("p", vec![atom("a"), atom("b")]))?;

    let result = host.query(&[goal("p", vec![atom("a"), atom("b")])])?;
    assert!(result.success());
    assert!(result.variables().is_empty());

    Ok(())
}

#[test]
fn fact_binds_query_variable() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("p", vec![atom("a"), atom("b")]))?;

    let result = host.query(&[goal("p", vec![atom("a"), var("X")])])?;
    assert!(result.success());
    assert_eq!(result.variables(), &[Variable::new("X")]);
    assert_eq!(result.get_variable(&Variable::new("X")), Some(atom("b")));
    assert_eq!(result.get_variable(&Variable::new("Nope")), None);
    assert_eq!(result.bindings(), vec![(Variable::new("X"), atom("b"))]);

    Ok(())
}

#[test]
fn mismatched_constant_fails() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("p", vec![atom("a"), atom("b")]))?;

    let result = host.query(&[goal("p", vec![atom("b"), var("X")])])?;
    assert!(!result.success());
    assert!(!result.can_resume());
    assert_eq!(result.get_variable(&Variable::new("X")), None);

    Ok(())
}

#[test]
fn rule_body_reaches_facts() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("parent", vec![atom("cronus"), atom("zeus")]))?;
    host.add_rule(&rule(
        goal("isAncestor", vec![var("X"), var("Y")]),
        vec![goal("parent", vec![var("X"), var("Y")])],
    ))?;

    let mut result = host.query(&[goal("isAncestor", vec![atom("cronus"), var("Y")])])?;
    assert!(result.success());
    assert_eq!(result.get_variable(&Variable::new("Y")), Some(atom("zeus")));
    assert!(!result.resume()?);

    Ok(())
}

#[test]
fn undefined_predicate_fails() -> Result<(), Error> {
    let mut host = Host::new()?;
    let result = host.query(&[goal("nowhere", vec![var("X")])])?;
    assert!(!result.success());
    assert!(!result.can_resume());

    Ok(())
}

#[test]
fn structures_match_in_both_directions() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact(
        "wrap",
        vec![term(
            "f",
            vec![term("g", vec![atom("a")]), list(vec![atom("b"), atom("c")])],
        )],
    ))?;

    // Read mode: the query already has the structure, the head walks it.
    let pattern = term(
        "f",
        vec![
            term("g", vec![var("X")]),
            Term::list_with_tail(vec![var("Y")], var("T")),
        ],
    );
    let rows = solutions(&mut host, &[goal("wrap", vec![pattern])], &["X", "Y", "T"])?;
    assert_eq!(rows, vec![vec!["a", "b", "[c]"]]);

    // Write mode: the head builds the structure into an unbound argument.
    assert_eq!(
        values(&mut host, &[goal("wrap", vec![var("W")])], "W")?,
        vec!["f(g(a), [b, c])"]
    );

    // A mismatch deep inside fails the whole match.
    let wrong = term("f", vec![term("g", vec![atom("z")]), var("_")]);
    assert!(!holds(&mut host, &[goal("wrap", vec![wrong])])?);

    Ok(())
}

#[test]
fn repeated_head_variables_unify() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("same", vec![var("X"), var("X")]))?;

    assert!(holds(&mut host, &[goal("same", vec![atom("a"), atom("a")])])?);
    assert!(!holds(&mut host, &[goal("same", vec![atom("a"), atom("b")])])?);
    assert_eq!(
        values(
            &mut host,
            &[goal("same", vec![term("f", vec![var("Y")]), term("f", vec![atom("z")])])],
            "Y"
        )?,
        vec!["z"]
    );

    Ok(())
}

#[test]
fn unbound_variables_come_back_as_variables() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("same", vec![var("Z"), var("Z")]))?;

    let result = host.query(&[goal("same", vec![var("X"), var("Y")])])?;
    assert!(result.success());

    let x = result.get_variable(&Variable::new("X")).expect("X");
    let y = result.get_variable(&Variable::new("Y")).expect("Y");
    match &x {
        Term::Variable(_) => {}
        other => panic!("expected a variable, got {}", other),
    }
    assert_eq!(x, y);

    Ok(())
}

#[test]
fn anonymous_variables_never_share() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("pair", vec![var("_"), var("_")]))?;
    host.add_rule(&fact("p", vec![atom("a"), atom("b")]))?;

    assert!(holds(&mut host, &[goal("pair", vec![atom("a"), atom("b")])])?);

    let result = host.query(&[goal("p", vec![var("_"), var("X")])])?;
    assert!(result.success());
    assert_eq!(result.variables(), &[Variable::new("X")]);

    Ok(())
}

#[test]
fn lists_built_in_bodies() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact(
        "first",
        vec![Term::list_with_tail(vec![var("H")], var("_")), var("H")],
    ))?;
    host.add_rule(&rule(
        goal("go", vec![var("X")]),
        vec![goal("first", vec![list(vec![atom("a"), atom("b")]), var("X")])],
    ))?;

    assert_eq!(values(&mut host, &[goal("go", vec![var("X")])], "X")?, vec!["a"]);
    assert!(!holds(&mut host, &[goal("first", vec![Term::empty_list(), var("X")])])?);

    Ok(())
}

#[test]
fn strings_are_code_lists() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("greeting", vec![Term::string("hi")]))?;

    assert_eq!(
        values(&mut host, &[goal("greeting", vec![var("S")])], "S")?,
        vec!["\"hi\""]
    );

    Ok(())
}

#[test]
fn malformed_list_is_rejected() -> Result<(), Error> {
    let mut host = Host::new()?;
    let bad = fact("p", vec![term("_list", vec![atom("a"), atom("b"), atom("c")])]);

    match host.add_rule(&bad) {
        Err(warm::Error::MalformedTerm(_)) => Ok(()),
        other => panic!("expected a malformed term error, got {:?}", other),
    }
}
