use ::{failure::Error, warm::prelude::*};

mod common;
use common::*;

fn findall(template: Term, goal: Term, result: Term) -> CompoundTerm {
    CompoundTerm::new("findall", vec![template, goal, result])
}

fn member(x: Term, items: Term) -> Term {
    term("member", vec![x, items])
}

fn with_facts() -> Result<Host, Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("a", vec![atom("c"), atom("c")]))?;
    host.add_rule(&fact("a", vec![atom("c"), atom("d")]))?;
    Ok(host)
}

#[test]
fn findall_collects_every_solution() -> Result<(), Error> {
    let mut host = with_facts()?;

    let goals = [findall(var("X"), term("a", vec![atom("c"), var("X")]), var("L"))];
    assert_eq!(values(&mut host, &goals, "L")?, vec!["[c, d]"]);

    let goals = [findall(var("X"), atom("fail"), var("L"))];
    assert_eq!(values(&mut host, &goals, "L")?, vec!["[]"]);

    let goals = [findall(
        term("pair", vec![var("X"), var("Y")]),
        term("a", vec![var("X"), var("Y")]),
        var("L"),
    )];
    assert_eq!(values(&mut host, &goals, "L")?, vec!["[pair(c, c), pair(c, d)]"]);

    Ok(())
}

#[test]
fn findall_result_can_be_matched_against() -> Result<(), Error> {
    let mut host = with_facts()?;

    let matching = [findall(
        var("X"),
        term("a", vec![atom("c"), var("X")]),
        list(vec![atom("c"), atom("d")]),
    )];
    assert!(holds(&mut host, &matching)?);

    let wrong = [findall(
        var("X"),
        term("a", vec![atom("c"), var("X")]),
        list(vec![atom("d"), atom("c")]),
    )];
    assert!(!holds(&mut host, &wrong)?);

    Ok(())
}

#[test]
fn findall_leaves_template_variables_unbound() -> Result<(), Error> {
    let mut host = with_facts()?;

    let goals = [
        findall(var("X"), term("a", vec![atom("c"), var("X")]), var("L")),
        goal("var", vec![var("X")]),
    ];
    assert!(holds(&mut host, &goals)?);

    Ok(())
}

#[test]
fn collected_terms_survive_later_heap_work() -> Result<(), Error> {
    let mut host = Host::new()?;
    let items = list(vec![int(1), int(2), int(3)]);

    let goals = [
        findall(var("X"), member(var("X"), items), var("L")),
        goal("append", vec![var("L"), list(vec![int(4)]), var("M")]),
        goal("member", vec![var("Y"), var("M")]),
    ];
    assert_eq!(values(&mut host, &goals, "Y")?, vec!["1", "2", "3", "4"]);
    assert_eq!(values(&mut host, &goals, "L")?, vec!["[1, 2, 3]"; 4]);

    Ok(())
}

#[test]
fn findall_nests() -> Result<(), Error> {
    let mut host = Host::new()?;

    let inner = term(
        "findall",
        vec![var("X"), member(var("_"), list(vec![atom("a"), atom("b")])), var("L")],
    );
    let generator = term(",", vec![member(var("X"), list(vec![int(1), int(2)])), inner]);
    let goals = [findall(var("L"), generator, var("R"))];

    assert_eq!(values(&mut host, &goals, "R")?, vec!["[[1, 1], [2, 2]]"]);

    Ok(())
}

#[test]
fn retained_variables_take_heap_values_by_copy() -> Result<(), Error> {
    let mut host = Host::new()?;

    // `R` ends up as a variable living in the retained segment; binding it to a heap
    // structure still has to see later bindings of that structure's variables.
    let goals = [
        findall(var("T"), member(var("T"), list(vec![var("V")])), list(vec![var("R")])),
        goal("=", vec![var("R"), term("f", vec![var("Q"), var("Q")])]),
        goal("=", vec![var("Q"), atom("a")]),
    ];

    assert_eq!(
        solutions(&mut host, &goals, &["R", "Q"])?,
        vec![vec!["f(a, a)", "a"]]
    );

    Ok(())
}

#[test]
fn each_query_starts_with_an_empty_retained_segment() -> Result<(), Error> {
    let config = MachineConfig::default().with_retained_size(64);
    let mut host = Host::with_config(config)?;
    let items = list((0..10).map(int).collect());

    // Each run retains well over half the segment.
    for _ in 0..4 {
        let goals = [findall(
            term("w", vec![var("X"), var("X")]),
            member(var("X"), items.clone()),
            var("L"),
        )];
        assert_eq!(count(&mut host, &goals)?, 1);
    }

    Ok(())
}
