use ::{failure::Error, warm::prelude::*};

mod common;
use common::*;

fn clauses_a(host: &mut Host) -> Result<(), Error> {
    host.add_rule(&fact("a", vec![atom("c"), atom("c")]))?;
    host.add_rule(&fact("a", vec![atom("c"), atom("d")]))?;
    Ok(())
}

#[test]
fn clauses_are_tried_in_definition_order() -> Result<(), Error> {
    let mut host = Host::new()?;
    clauses_a(&mut host)?;

    let x = Variable::new("X");
    let mut result = host.query(&[goal("a", vec![atom("c"), var("X")])])?;

    assert!(result.success());
    assert_eq!(result.get_variable(&x), Some(atom("c")));
    assert!(result.can_resume());

    assert!(result.resume()?);
    assert_eq!(result.get_variable(&x), Some(atom("d")));

    assert!(!result.resume()?);
    assert!(!result.resume()?);
    assert!(!result.can_resume());
    assert_eq!(result.get_variable(&x), None);

    Ok(())
}

#[test]
fn k_solutions_then_exhaustion() -> Result<(), Error> {
    for k in 0..5 {
        let mut host = Host::new()?;
        for i in 0..k {
            host.add_rule(&fact("n", vec![int(i)]))?;
        }

        let mut result = host.query(&[goal("n", vec![var("X")])])?;
        assert_eq!(result.success(), k > 0);

        for i in 1..k {
            assert!(result.resume()?, "solution {} of {}", i + 1, k);
            assert_eq!(result.get_variable(&Variable::new("X")), Some(int(i)));
        }

        assert!(!result.resume()?);
        assert!(!result.resume()?);
        assert!(!result.success());
    }

    Ok(())
}

#[test]
fn backtracking_undoes_bindings() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("color", vec![atom("red")]))?;
    host.add_rule(&fact("color", vec![atom("green")]))?;
    host.add_rule(&fact("color", vec![atom("blue")]))?;
    host.add_rule(&fact("likes", vec![atom("green")]))?;
    host.add_rule(&fact("likes", vec![atom("blue")]))?;

    let goals = [
        goal("color", vec![var("X")]),
        goal("likes", vec![var("X")]),
    ];
    assert_eq!(values(&mut host, &goals, "X")?, vec!["green", "blue"]);

    Ok(())
}

#[test]
fn cut_commits_to_the_first_solution() -> Result<(), Error> {
    let mut host = Host::new()?;
    clauses_a(&mut host)?;
    host.add_rule(&rule(
        goal("first", vec![var("X")]),
        vec![goal("a", vec![atom("c"), var("X")]), CompoundTerm::atom("!")],
    ))?;

    let result = host.query(&[goal("first", vec![var("X")])])?;
    assert!(result.success());
    assert_eq!(result.get_variable(&Variable::new("X")), Some(atom("c")));
    assert!(!result.can_resume());

    Ok(())
}

#[test]
fn cut_leaves_outer_alternatives() -> Result<(), Error> {
    let mut host = Host::new()?;
    clauses_a(&mut host)?;
    host.add_rule(&fact("b", vec![int(1)]))?;
    host.add_rule(&fact("b", vec![int(2)]))?;
    host.add_rule(&rule(
        goal("inner", vec![var("X")]),
        vec![goal("a", vec![atom("c"), var("X")]), CompoundTerm::atom("!")],
    ))?;

    let goals = [goal("b", vec![var("Y")]), goal("inner", vec![var("X")])];
    let mut result = host.query(&goals)?;
    assert!(result.success());
    assert!(result.can_resume());
    assert!(result.resume()?);
    assert_eq!(result.get_variable(&Variable::new("Y")), Some(int(2)));
    assert_eq!(result.get_variable(&Variable::new("X")), Some(atom("c")));
    assert!(!result.can_resume());
    drop(result);

    assert_eq!(
        solutions(&mut host, &goals, &["Y", "X"])?,
        vec![vec!["1", "c"], vec!["2", "c"]]
    );

    Ok(())
}

#[test]
fn cut_prunes_later_clauses() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&rule(
        goal("max", vec![var("X"), var("Y"), var("X")]),
        vec![goal(">=", vec![var("X"), var("Y")]), CompoundTerm::atom("!")],
    ))?;
    host.add_rule(&fact("max", vec![var("_"), var("Y"), var("Y")]))?;

    assert_eq!(values(&mut host, &[goal("max", vec![int(3), int(1), var("M")])], "M")?, vec!["3"]);
    assert_eq!(values(&mut host, &[goal("max", vec![int(1), int(3), var("M")])], "M")?, vec!["3"]);

    Ok(())
}

#[test]
fn cut_in_a_query() -> Result<(), Error> {
    let mut host = Host::new()?;
    clauses_a(&mut host)?;

    let goals = [goal("a", vec![atom("c"), var("X")]), CompoundTerm::atom("!")];
    assert_eq!(values(&mut host, &goals, "X")?, vec!["c"]);

    Ok(())
}

#[test]
fn forward_references_resolve_when_defined() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&rule(
        goal("top", vec![var("X")]),
        vec![goal("later", vec![var("X")])],
    ))?;

    assert!(!holds(&mut host, &[goal("top", vec![var("X")])])?);

    host.add_rule(&fact("later", vec![atom("ok")]))?;
    assert_eq!(values(&mut host, &[goal("top", vec![var("X")])], "X")?, vec!["ok"]);

    host.add_rule(&fact("later", vec![atom("again")]))?;
    assert_eq!(
        values(&mut host, &[goal("top", vec![var("X")])], "X")?,
        vec!["ok", "again"]
    );

    Ok(())
}

fn peano(n: usize) -> Term {
    (0..n).fold(atom("z"), |inner, _| term("s", vec![inner]))
}

#[test]
fn mutual_recursion() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rules(&[
        fact("even", vec![atom("z")]),
        rule(
            goal("even", vec![term("s", vec![var("X")])]),
            vec![goal("odd", vec![var("X")])],
        ),
        rule(
            goal("odd", vec![term("s", vec![var("X")])]),
            vec![goal("even", vec![var("X")])],
        ),
    ])?;

    for n in 0..8 {
        assert_eq!(holds(&mut host, &[goal("even", vec![peano(n)])])?, n % 2 == 0);
        assert_eq!(holds(&mut host, &[goal("odd", vec![peano(n)])])?, n % 2 == 1);
    }

    Ok(())
}

#[test]
fn infinite_generator_enumerates_lazily() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rule(&fact("nat", vec![atom("z")]))?;
    host.add_rule(&rule(
        goal("nat", vec![term("s", vec![var("X")])]),
        vec![goal("nat", vec![var("X")])],
    ))?;

    let n = Variable::new("N");
    let mut result = host.query(&[goal("nat", vec![var("N")])])?;
    for i in 0..5 {
        assert!(result.success());
        assert_eq!(result.get_variable(&n), Some(peano(i)));
        assert!(result.can_resume());
        result.resume()?;
    }

    Ok(())
}

#[test]
fn deterministic_recursion_under_a_choice_point_keeps_the_trail_small() -> Result<(), Error> {
    let mut host = Host::new()?;
    host.add_rules(&[
        rule(goal("down", vec![int(0)]), vec![CompoundTerm::atom("!")]),
        rule(
            goal("down", vec![var("N")]),
            vec![
                goal("is", vec![var("M"), term("-", vec![var("N"), int(1)])]),
                goal("down", vec![var("M")]),
            ],
        ),
    ])?;

    let goals = [
        goal("member", vec![var("X"), list(vec![atom("a"), atom("b")])]),
        goal("down", vec![int(500)]),
    ];
    let result = host.query(&goals)?;
    assert!(result.success());
    assert!(result.can_resume());

    let records = result.machine().trail_len();
    assert!(records < 64, "{} undo records", records);

    Ok(())
}

#[test]
fn long_lists_in_queries() -> Result<(), Error> {
    let mut host = Host::with_config(MachineConfig::default().with_stack_size(1 << 16))?;
    host.add_rules(&[
        fact("len", vec![Term::empty_list(), int(0)]),
        rule(
            goal("len", vec![Term::list_with_tail(vec![var("_")], var("T")), var("N")]),
            vec![
                goal("len", vec![var("T"), var("M")]),
                goal("is", vec![var("N"), term("+", vec![var("M"), int(1)])]),
            ],
        ),
    ])?;

    let items = list((0..1000).map(int).collect());
    assert_eq!(values(&mut host, &[goal("len", vec![items, var("N")])], "N")?, vec!["1000"]);

    Ok(())
}
