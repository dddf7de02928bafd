//! Predicates every host starts with.
//!
//! Type tests and `repeat/0` are assembled by hand, arithmetic and goal dispatch are
//! native callbacks, and the control constructs (`call/1` included) are ordinary
//! clauses compiled like any user rule.

use ::{
    lazy_static::lazy_static,
    num_integer::Integer,
    warm_ir::{Atom, CompoundTerm, Rule, Term, EMPTY_LIST},
};

use crate::{
    codegen::CodeGenerator,
    error::Error,
    functor::FunctorDescriptor,
    host::Host,
    machine::{CloneMode, Machine, Region},
    opcode::Opcode,
    word::{Address, Cell, Tag, Word},
};

pub(super) fn install(host: &mut Host) -> Result<(), Error> {
    install_assembled(host)?;
    install_natives(host)?;

    for rule in LIBRARY.iter() {
        host.add_clause(rule, false)?;
    }

    Ok(())
}

fn install_assembled(host: &mut Host) -> Result<(), Error> {
    let empty = CodeGenerator::new().generate(0)?;
    host.add_code(&descriptor("true", 0), &empty)?;
    host.add_code(&descriptor("!", 0), &empty)?;

    let mut fail = CodeGenerator::new();
    fail.emit(Opcode::Fail);
    host.add_code(&descriptor("fail", 0), &fail.generate(0)?)?;

    // Leaves a choice point that re-enters itself, then succeeds.
    let mut repeat = CodeGenerator::new();
    let again = repeat.label();
    repeat.mark(again);
    repeat.emit_branch(Opcode::ChoicePointRelative, again).emit(Opcode::Proceed);
    host.add_code(&descriptor("repeat", 0), &repeat.finish()?)?;

    let type_tests: [(&str, &[Tag], bool); 5] = [
        ("var", &[Tag::Ref], true),
        ("nonvar", &[Tag::Ref], false),
        ("atom", &[Tag::Con], true),
        ("atomic", &[Tag::Con, Tag::Non], true),
        ("compound", &[Tag::Str, Tag::Lis], true),
    ];

    for &(name, tags, accept) in type_tests.iter() {
        host.add_code(&descriptor(name, 1), &type_test(tags, accept)?)?;
    }

    Ok(())
}

/// Succeeds iff the tag of the dereferenced argument is among `tags` (or, with
/// `accept` unset, is not).
fn type_test(tags: &[Tag], accept: bool) -> Result<Vec<u32>, Error> {
    let mut gen = CodeGenerator::new();
    let tag = gen.local();
    let hit = gen.label();
    let done = gen.label();

    gen.emit_with(Opcode::LoadArgumentAddress, 0)
        .emit(Opcode::Deref)
        .emit(Opcode::Load)
        .emit(Opcode::GetTag)
        .emit_local(Opcode::StoreLocal, tag);

    for &t in tags {
        gen.emit_local(Opcode::LoadLocal, tag)
            .emit_with(Opcode::LoadConstant, t as u32)
            .emit_branch(Opcode::BranchEqual, hit);
    }

    if accept {
        gen.emit(Opcode::Fail);
        gen.mark(hit);
    } else {
        gen.emit_branch(Opcode::BranchAlways, done);
        gen.mark(hit);
        gen.emit(Opcode::Fail);
        gen.mark(done);
    }

    gen.generate(1)
}

fn install_natives(host: &mut Host) -> Result<(), Error> {
    host.define_native("$call_goal", 1, call_goal)?;
    host.define_native("$level", 1, |m| {
        let (target, level) = (m.argument(0), m.trail_level() as i64);
        let cell = number_cell(m, level);
        unify_with(m, Region::Heap, target, cell)
    })?;
    host.define_native("$cut", 1, |m| match number_at(m, m.argument(0))? {
        Some(level) if level >= 0 => {
            m.cut(level as usize);
            Ok(true)
        }
        _ => Ok(false),
    })?;
    host.define_native("number", 1, |m| Ok(number_at(m, m.argument(0))?.is_some()))?;
    host.define_native("is", 2, is)?;
    host.define_native("plus", 3, plus)?;
    host.define_native("copy_term", 2, copy_term)?;

    let comparisons: [(&str, fn(&i64, &i64) -> bool); 6] = [
        ("<", i64::lt),
        (">", i64::gt),
        ("=<", i64::le),
        (">=", i64::ge),
        ("=:=", i64::eq),
        ("=\\=", i64::ne),
    ];

    for &(name, test) in comparisons.iter() {
        host.define_native(name, 2, move |m| {
            let (left, right) = (m.argument(0), m.argument(1));
            Ok(match (evaluate(m, left)?, evaluate(m, right)?) {
                (Some(l), Some(r)) => test(&l, &r),
                _ => false,
            })
        })?;
    }

    host.define_native("$findall_begin", 0, |m| {
        m.begin_collect();
        Ok(true)
    })?;
    host.define_native("$findall_collect", 1, findall_collect)?;
    host.define_native("$findall_end", 1, findall_end)?;

    Ok(())
}

/// `'$call_goal'(Goal)`: pushes the goal's arguments and jumps to its predicate. The
/// goal runs once the callback returns, with a fresh cut barrier.
fn call_goal(machine: &mut Machine) -> Result<bool, Error> {
    let goal = machine.deref(machine.argument(0))?;
    let (descriptor, functor_cell) = match machine.load(goal)?.unpack() {
        Cell::Con(id) => (machine.functor(id)?, None),
        Cell::Str(p) => (machine.functor_at(p)?, Some(p)),
        _ => return Ok(false),
    };

    if let Some(p) = functor_cell {
        for i in (1..=descriptor.arity as i32).rev() {
            let arg = machine.load(p + i)?;
            machine.push(arg)?;
        }
    }

    let entry = machine.program_mut().rule_pointer(&descriptor)?;
    machine.call(entry);
    Ok(true)
}

/// The integer an atom cell spells, if it spells one.
fn number_at(machine: &Machine, address: Address) -> Result<Option<i64>, Error> {
    Ok(match machine.deref_load(address)?.unpack() {
        Cell::Con(id) => machine.functor(id)?.name.parse::<i64>().ok(),
        _ => None,
    })
}

/// Evaluates an arithmetic expression. `None` for anything that is not a ground integer
/// expression, including overflow and division by zero.
fn evaluate(machine: &Machine, address: Address) -> Result<Option<i64>, Error> {
    let p = match machine.deref_load(address)?.unpack() {
        Cell::Con(_) => return number_at(machine, address),
        Cell::Str(p) => p,
        _ => return Ok(None),
    };

    let descriptor = machine.functor_at(p)?;
    let mut args = Vec::with_capacity(descriptor.arity as usize);
    for i in 1..=descriptor.arity as i32 {
        match evaluate(machine, p + i)? {
            Some(value) => args.push(value),
            None => return Ok(None),
        }
    }

    Ok(match (&*descriptor.name, args.as_slice()) {
        ("-", &[x]) => x.checked_neg(),
        ("+", &[x]) => Some(x),
        ("abs", &[x]) => x.checked_abs(),
        ("+", &[x, y]) => x.checked_add(y),
        ("-", &[x, y]) => x.checked_sub(y),
        ("*", &[x, y]) => x.checked_mul(y),
        ("//", &[x, y]) => x.checked_div(y),
        ("div", &[x, y]) if y != 0 => Some(Integer::div_floor(&x, &y)),
        ("mod", &[x, y]) if y != 0 => Some(Integer::mod_floor(&x, &y)),
        ("min", &[x, y]) => Some(x.min(y)),
        ("max", &[x, y]) => Some(x.max(y)),
        _ => None,
    })
}

fn number_cell(machine: &mut Machine, value: i64) -> Word {
    let id = machine
        .program_mut()
        .intern(&FunctorDescriptor::constant(Atom::from(value.to_string())));
    Word::con(id)
}

/// Unifies the term at `address` with `value`, which is placed in a fresh cell of
/// `region` first.
fn unify_with(machine: &mut Machine, region: Region, address: Address, value: Word) -> Result<bool, Error> {
    let cell = machine.push_cells(region, &[value])?;
    machine.unify(address, cell)
}

fn is(machine: &mut Machine) -> Result<bool, Error> {
    let (result, expression) = (machine.argument(0), machine.argument(1));
    match evaluate(machine, expression)? {
        Some(value) => {
            let cell = number_cell(machine, value);
            unify_with(machine, Region::Heap, result, cell)
        }
        None => Ok(false),
    }
}

/// `plus(X, Y, Z)`: `Z = X + Y`, solved for whichever one argument is unbound.
fn plus(machine: &mut Machine) -> Result<bool, Error> {
    let args = [machine.argument(0), machine.argument(1), machine.argument(2)];
    let values = [
        number_at(machine, args[0])?,
        number_at(machine, args[1])?,
        number_at(machine, args[2])?,
    ];

    let (target, value) = match values {
        [Some(x), Some(y), _] => (args[2], x.checked_add(y)),
        [Some(x), None, Some(z)] => (args[1], z.checked_sub(x)),
        [None, Some(y), Some(z)] => (args[0], z.checked_sub(y)),
        _ => return Ok(false),
    };

    match value {
        Some(value) => {
            let cell = number_cell(machine, value);
            unify_with(machine, Region::Heap, target, cell)
        }
        None => Ok(false),
    }
}

fn copy_term(machine: &mut Machine) -> Result<bool, Error> {
    let (source, target) = (machine.argument(0), machine.argument(1));
    let root = machine.load(source)?;
    let copy = machine.clone_term(root, Region::Heap, CloneMode::Fresh)?;
    unify_with(machine, Region::Heap, target, copy)
}

/// Copies the template into the retained segment, where it outlives the backtracking
/// that drives `findall/3`.
fn findall_collect(machine: &mut Machine) -> Result<bool, Error> {
    let root = machine.load(machine.argument(0))?;
    let copy = machine.clone_term(root, Region::Retained, CloneMode::Fresh)?;
    Ok(machine.collect(copy))
}

fn findall_end(machine: &mut Machine) -> Result<bool, Error> {
    let results = match machine.end_collect() {
        Some(results) => results,
        None => return Ok(false),
    };

    let nil = machine
        .program_mut()
        .intern(&FunctorDescriptor::constant(EMPTY_LIST.clone()));

    let mut list = Word::con(nil);
    for item in results.into_iter().rev() {
        let pair = machine.push_cells(Region::Retained, &[item, list])?;
        list = Word::lis(pair);
    }

    let target = machine.argument(0);
    unify_with(machine, Region::Retained, target, list)
}

fn descriptor(name: &str, arity: u32) -> FunctorDescriptor {
    FunctorDescriptor::new(Atom::from(name), arity)
}

fn var(name: &str) -> Term {
    Term::var(name)
}

fn term(functor: &str, args: Vec<Term>) -> Term {
    Term::compound(functor, args)
}

fn goal(functor: &str, args: Vec<Term>) -> CompoundTerm {
    CompoundTerm::new(functor, args)
}

fn clause(head: CompoundTerm, goals: Vec<CompoundTerm>) -> Rule {
    Rule::new(head, goals)
}

fn list_cell(head: Term, tail: Term) -> Term {
    Term::list_with_tail(vec![head], tail)
}

lazy_static! {
    /// The control constructs and list basics, as clauses.
    static ref LIBRARY: Vec<Rule> = library();
}

fn library() -> Vec<Rule> {
    let (a, b, c, e, g, i, l, t, x, y) = (
        || var("A"),
        || var("B"),
        || var("C"),
        || var("E"),
        || var("G"),
        || var("I"),
        || var("L"),
        || var("T"),
        || var("X"),
        || var("Y"),
    );
    let any = || var("_");
    let call = |arg: Term| goal("call", vec![arg]);
    let call_at = |arg: Term| goal("$call", vec![arg, l()]);
    let level = || goal("$level", vec![l()]);
    let cut = || CompoundTerm::atom("!");
    let fail = || CompoundTerm::atom("fail");
    let nonvar = |arg: Term| goal("nonvar", vec![arg]);

    vec![
        Rule::fact(goal("=", vec![x(), x()])),
        clause(
            goal("\\=", vec![x(), y()]),
            vec![goal("\\+", vec![term("=", vec![x(), y()])])],
        ),
        // Conjuncts share the cut barrier of the `call/1` that runs them.
        clause(goal("call", vec![g()]), vec![level(), call_at(g())]),
        clause(
            goal("$call", vec![g(), any()]),
            vec![goal("var", vec![g()]), cut(), fail()],
        ),
        clause(
            goal("$call", vec![term(",", vec![a(), b()]), l()]),
            vec![cut(), call_at(a()), call_at(b())],
        ),
        clause(
            goal("$call", vec![Term::atom("!"), l()]),
            vec![cut(), goal("$cut", vec![l()])],
        ),
        clause(goal("$call", vec![g(), any()]), vec![goal("$call_goal", vec![g()])]),
        clause(
            goal(",", vec![a(), b()]),
            vec![level(), call_at(a()), call_at(b())],
        ),
        clause(
            goal(";", vec![i(), any()]),
            vec![
                nonvar(i()),
                goal("=", vec![i(), term("->", vec![c(), t()])]),
                call(c()),
                cut(),
                call(t()),
            ],
        ),
        clause(
            goal(";", vec![i(), e()]),
            vec![
                nonvar(i()),
                goal("=", vec![i(), term("->", vec![any(), any()])]),
                cut(),
                call(e()),
            ],
        ),
        clause(goal(";", vec![a(), any()]), vec![call(a())]),
        clause(goal(";", vec![any(), b()]), vec![call(b())]),
        clause(goal("->", vec![c(), t()]), vec![call(c()), cut(), call(t())]),
        clause(goal("\\+", vec![g()]), vec![call(g()), cut(), fail()]),
        Rule::fact(goal("\\+", vec![any()])),
        clause(goal("not", vec![g()]), vec![call(g()), cut(), fail()]),
        Rule::fact(goal("not", vec![any()])),
        clause(goal("once", vec![g()]), vec![call(g()), cut()]),
        clause(goal("ignore", vec![g()]), vec![call(g()), cut()]),
        Rule::fact(goal("ignore", vec![any()])),
        clause(
            goal("findall", vec![t(), g(), l()]),
            vec![
                CompoundTerm::atom("$findall_begin"),
                goal("$findall_run", vec![t(), g()]),
                goal("$findall_end", vec![l()]),
            ],
        ),
        clause(
            goal("$findall_run", vec![t(), g()]),
            vec![call(g()), goal("$findall_collect", vec![t()]), fail()],
        ),
        Rule::fact(goal("$findall_run", vec![any(), any()])),
        Rule::fact(goal("member", vec![x(), list_cell(x(), any())])),
        clause(
            goal("member", vec![x(), list_cell(any(), t())]),
            vec![goal("member", vec![x(), t()])],
        ),
        Rule::fact(goal("append", vec![Term::empty_list(), l(), l()])),
        clause(
            goal(
                "append",
                vec![list_cell(var("H"), t()), l(), list_cell(var("H"), var("R"))],
            ),
            vec![goal("append", vec![t(), l(), var("R")])],
        ),
    ]
}
