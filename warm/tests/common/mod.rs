#![allow(dead_code)]

use ::{
    failure::{err_msg, Error},
    warm::prelude::*,
};

pub fn atom(name: &str) -> Term {
    Term::atom(name)
}

pub fn int(value: i64) -> Term {
    Term::atom(value.to_string())
}

pub fn var(name: &str) -> Term {
    Term::var(name)
}

pub fn term(functor: &str, args: Vec<Term>) -> Term {
    Term::compound(functor, args)
}

pub fn list(items: Vec<Term>) -> Term {
    Term::list(items)
}

pub fn goal(functor: &str, args: Vec<Term>) -> CompoundTerm {
    CompoundTerm::new(functor, args)
}

pub fn fact(functor: &str, args: Vec<Term>) -> Rule {
    Rule::fact(goal(functor, args))
}

pub fn rule(head: CompoundTerm, goals: Vec<CompoundTerm>) -> Rule {
    Rule::new(head, goals)
}

/// Every solution of `goals`, as the rendered binding of each of `names`.
pub fn solutions(host: &mut Host, goals: &[CompoundTerm], names: &[&str]) -> Result<Vec<Vec<String>>, Error> {
    let mut result = host.query(goals)?;
    let mut all = Vec::new();

    while result.success() {
        let mut row = Vec::new();
        for name in names {
            let term = result
                .get_variable(&Variable::new(*name))
                .ok_or_else(|| err_msg(format!("no binding for {}", name)))?;
            row.push(term.to_string());
        }

        all.push(row);
        result.resume()?;
    }

    Ok(all)
}

/// The rendered bindings of a single variable across every solution.
pub fn values(host: &mut Host, goals: &[CompoundTerm], name: &str) -> Result<Vec<String>, Error> {
    Ok(solutions(host, goals, &[name])?
        .into_iter()
        .map(|mut row| row.remove(0))
        .collect())
}

pub fn count(host: &mut Host, goals: &[CompoundTerm]) -> Result<usize, Error> {
    Ok(solutions(host, goals, &[])?.len())
}

pub fn holds(host: &mut Host, goals: &[CompoundTerm]) -> Result<bool, Error> {
    Ok(host.query(goals)?.success())
}
