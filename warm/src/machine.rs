//! The bytecode interpreter.
//!
//! A `Machine` owns every segment (heap, operand stack, retained store, code) and the
//! register file, and runs a plain fetch-decode-execute loop over them. Nondeterminism
//! is layered on top through the trail: a choice point opens a trail frame recording the
//! registers, every store made afterwards records the value it overwrites, and
//! backtracking replays the newest frame in reverse.

use ::{
    itertools::Itertools,
    smallvec::SmallVec,
    std::fmt,
    tracing::{debug, trace},
    warm_ir::Term,
};

use crate::{
    config::MachineConfig,
    error::{Error, Segment},
    functor::{FunctorDescriptor, FunctorId},
    opcode::Opcode,
    program::Program,
    stack::BranchingStack,
    trail::{Boundary, Trail},
    word::{Address, Cell, GlobalRegister, Tag, Word},
};

mod clone;
mod unify;

pub use self::clone::{CloneMode, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy)]
struct Registers {
    /// Top of heap.
    h: Address,
    /// Instruction pointer.
    p: Address,
    /// Current environment (activation record).
    e: Address,
    /// Continuation pointer; `Code(-1)` when returning means the run succeeded.
    cp: Address,
    /// Trail level at the most recent `Call`.
    b0: Address,
    /// Next free retained cell. Deliberately absent from choice points.
    r: Address,
}

impl Registers {
    fn new() -> Self {
        Self {
            h: Address::Heap(0),
            p: Address::Code(0),
            e: Address::Blank(0),
            cp: Address::Code(-1),
            b0: Address::Blank(0),
            r: Address::Retained(0),
        }
    }

    fn get(&self, register: GlobalRegister) -> Address {
        match register {
            GlobalRegister::TopOfHeap => self.h,
            GlobalRegister::InstructionPointer => self.p,
            GlobalRegister::Environment => self.e,
            GlobalRegister::ContinuationPointer => self.cp,
            GlobalRegister::ChoicePointBase => self.b0,
            GlobalRegister::NextRetained => self.r,
            // Lives in the stack itself; see `Machine::register`.
            GlobalRegister::StackPointer => Address::Blank(0),
        }
    }

    fn set(&mut self, register: GlobalRegister, value: Address) {
        match register {
            GlobalRegister::TopOfHeap => self.h = value,
            GlobalRegister::InstructionPointer => self.p = value,
            GlobalRegister::Environment => self.e = value,
            GlobalRegister::ContinuationPointer => self.cp = value,
            GlobalRegister::ChoicePointBase => self.b0 = value,
            GlobalRegister::NextRetained => self.r = value,
            GlobalRegister::StackPointer => {}
        }
    }
}

pub struct Machine {
    config: MachineConfig,
    registers: Registers,
    heap: Vec<Word>,
    retained: Vec<Word>,
    stack: BranchingStack,
    trail: Trail,
    pdl: SmallVec<[(Address, Address); 32]>,
    program: Program,
    collectors: Vec<Vec<Word>>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Machine")
            .field("registers", &self.registers)
            .field("stack", &self.stack.as_slice())
            .field("trail_level", &self.trail.level())
            .field("program", &self.program)
            .finish()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            registers: Registers::new(),
            heap: vec![Word::ZERO; config.heap_size],
            retained: vec![Word::ZERO; config.retained_size],
            stack: BranchingStack::new(config.stack_size),
            trail: Trail::new(),
            pdl: SmallVec::new(),
            program: Program::new(config.code_size),
            collectors: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[inline]
    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    /// The heap cells allocated so far.
    pub fn heap(&self) -> &[Word] {
        &self.heap[..self.registers.h.offset().max(0) as usize]
    }

    /// The retained cells allocated so far.
    pub fn retained(&self) -> &[Word] {
        &self.retained[..self.registers.r.offset().max(0) as usize]
    }

    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    pub fn register(&self, register: GlobalRegister) -> Address {
        match register {
            GlobalRegister::StackPointer => Address::Stack(self.stack.pointer()),
            other => self.registers.get(other),
        }
    }

    #[inline]
    pub fn trail_level(&self) -> usize {
        self.trail.level()
    }

    /// Undo records held across all open choice points.
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    #[inline]
    pub fn is_backtrack_available(&self) -> bool {
        self.trail.is_backtrack_available()
    }

    fn reset(&mut self) {
        self.registers = Registers::new();
        self.trail.clear();
        self.stack.reset();
        self.pdl.clear();
        self.collectors.clear();
    }

    /// Runs the code at `entry` with `argc` fresh variables as its arguments. The
    /// variables occupy heap cells `0..argc`, in argument order.
    pub fn start(&mut self, entry: u32, argc: usize) -> Result<bool, Error> {
        debug!(target: "warm::machine", entry, argc, "start");
        self.reset();

        if argc > self.heap.len() {
            return Err(Error::Exhausted {
                segment: Segment::Heap,
                capacity: self.heap.len(),
            });
        }

        for i in 0..argc {
            self.heap[i] = Word::r#ref(Address::Heap(i as i32));
        }
        self.registers.h = Address::Heap(argc as i32);

        // Argument `i` sits at `E - i` once the entry allocates its frame.
        for i in (0..argc).rev() {
            self.stack
                .push(Word::r#ref(Address::Heap(i as i32)), &mut self.trail)?;
        }

        self.registers.p = Address::Code(entry as i32);
        self.run()
    }

    /// Backtracks into the newest choice point and runs to the next solution.
    pub fn resume(&mut self) -> Result<bool, Error> {
        if !self.backtrack()? {
            return Ok(false);
        }

        self.run()
    }

    pub fn run(&mut self) -> Result<bool, Error> {
        loop {
            match self.step()? {
                StepResult::Continue => {}
                StepResult::Success => return Ok(true),
                StepResult::Fail => return Ok(false),
            }
        }
    }

    fn fail(&mut self) -> Result<StepResult, Error> {
        if self.backtrack()? {
            Ok(StepResult::Continue)
        } else {
            Ok(StepResult::Fail)
        }
    }

    pub fn step(&mut self) -> Result<StepResult, Error> {
        let at = self.registers.p.offset();
        let word = self.program.fetch(at)?;
        let opcode = Opcode::decode(word).ok_or(Error::UnknownOpcode { word, at })?;
        let operand = if opcode.has_operand() {
            self.program.fetch(at + 1)?
        } else {
            0
        };

        self.registers.p = Address::Code(at + opcode.size());
        trace!(target: "warm::machine", at, ?opcode, operand, "step");

        match opcode {
            Opcode::Halt => return Ok(StepResult::Success),
            Opcode::Nop => {}
            Opcode::Fail => return self.fail(),

            Opcode::Duplicate => {
                let top = self.stack.peek()?;
                self.push(top)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Load => {
                let address = self.pop()?.address();
                let value = self.load(address)?;
                self.push(value)?;
            }
            Opcode::Store => {
                let value = self.pop()?;
                let address = self.pop()?.address();
                self.store(address, value)?;
            }
            Opcode::LoadConstant => self.push(Word::raw(u64::from(operand)))?,
            Opcode::LoadLocal => {
                let value = self.load(self.local(operand))?;
                self.push(value)?;
            }
            Opcode::StoreLocal => {
                let value = self.pop()?;
                self.store(self.local(operand), value)?;
            }
            Opcode::LoadLocalAddress => self.push(self.local(operand).pack())?,
            Opcode::LoadArgumentAddress => self.push(self.argument(operand).pack())?,

            Opcode::Deref => {
                let address = self.pop()?.address();
                let resolved = self.deref(address)?;
                self.push(resolved.pack())?;
            }
            Opcode::GetTag => {
                let value = self.pop()?;
                self.push(Word::raw(value.get_tag() as u64))?;
            }
            Opcode::GetAddress => {
                let value = self.pop()?;
                self.push(value.address().pack())?;
            }
            Opcode::ApplyTagRef => self.apply_tag(Tag::Ref)?,
            Opcode::ApplyTagStr => self.apply_tag(Tag::Str)?,
            Opcode::ApplyTagFun => self.apply_tag(Tag::Fun)?,
            Opcode::ApplyTagCon => self.apply_tag(Tag::Con)?,
            Opcode::ApplyTagLis => self.apply_tag(Tag::Lis)?,
            Opcode::Bind => {
                let first = self.pop()?.address();
                let second = self.pop()?.address();
                self.bind(first, second)?;
            }
            Opcode::Unify => {
                let first = self.pop()?.address();
                let second = self.pop()?.address();
                if !self.unify(first, second)? {
                    return self.fail();
                }
            }

            Opcode::LoadGlobalRegisterH => self.push(self.registers.h.pack())?,
            Opcode::StoreGlobalRegisterH => {
                let h = self.pop()?.address();
                match h {
                    Address::Heap(_) => self.registers.h = h,
                    other => return Err(Error::InvalidAddress(other)),
                }
            }
            Opcode::LoadGlobalRegisterB0 => self.push(self.registers.b0.pack())?,
            Opcode::StoreGlobalRegisterB0 => self.registers.b0 = self.pop()?.address(),

            Opcode::Increment => {
                let value = self.pop()?;
                self.push(Word::raw(value.0.wrapping_add(1)))?;
            }
            Opcode::Add => {
                let value = self.pop()?;
                let operand = self.pop()?;
                self.push(Word::raw(value.0.wrapping_add(operand.0)))?;
            }

            Opcode::Allocate => self.allocate(operand)?,
            Opcode::Deallocate => self.deallocate(operand)?,
            Opcode::Call => self.call(operand),
            Opcode::Proceed => {
                if !self.proceed() {
                    return Ok(StepResult::Success);
                }
            }

            Opcode::BranchEqual | Opcode::BranchNotEqual => {
                let a = self.pop()?;
                let b = self.pop()?;
                if (a == b) == (opcode == Opcode::BranchEqual) {
                    self.registers.p = Address::Code(at + operand as i32);
                }
            }
            Opcode::BranchAlways => self.registers.p = Address::Code(at + operand as i32),
            Opcode::BranchAbsolute => self.registers.p = Address::Code(operand as i32),

            Opcode::ChoicePoint => self.choice_point(operand)?,
            Opcode::ChoicePointRelative => self.choice_point((at + operand as i32) as u32)?,
            Opcode::GetLevel => self.push(Word::raw(self.trail.level() as u64))?,
            Opcode::Cut => {
                let level = self.pop()?.address().offset().max(0) as usize;
                self.cut(level);
            }

            Opcode::Callback => {
                let callback = self
                    .program
                    .callback(operand as usize)
                    .ok_or(Error::UnknownCallback(operand as usize))?;

                if !(*callback)(self)? {
                    return self.fail();
                }
            }
            Opcode::Trace | Opcode::EndTrace => {
                let functor = FunctorId(operand);
                let port = if opcode == Opcode::Trace { "enter" } else { "exit" };
                debug!(
                    target: "warm::trace",
                    predicate = %self.display_functor(functor),
                    args = %DisplayArguments { machine: self, functor },
                    depth = self.trail.level(),
                    port
                );
            }
        }

        Ok(StepResult::Continue)
    }

    #[inline]
    fn apply_tag(&mut self, tag: Tag) -> Result<(), Error> {
        let value = self.pop()?;
        self.push(value.with_tag(tag))
    }

    #[inline]
    pub fn push(&mut self, value: Word) -> Result<(), Error> {
        self.stack.push(value, &mut self.trail)
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Word, Error> {
        self.stack.pop()
    }

    /// Slot `index` of the current activation record.
    #[inline]
    pub fn local(&self, index: u32) -> Address {
        self.registers.e + (3 + index as i32)
    }

    /// Argument `index` of the current activation record.
    #[inline]
    pub fn argument(&self, index: u32) -> Address {
        self.registers.e - index as i32
    }

    /// Saves `E` and `CP` above the caller's arguments, then reserves `locals` slots.
    fn allocate(&mut self, locals: u32) -> Result<(), Error> {
        let e = self.registers.e;
        self.registers.e = Address::Stack(self.stack.pointer());
        self.stack.push(e.pack(), &mut self.trail)?;
        self.stack.push(self.registers.cp.pack(), &mut self.trail)?;
        self.stack.allocate(locals, &mut self.trail)
    }

    /// Restores `E` and `CP` and drops the frame along with its `argc` arguments.
    fn deallocate(&mut self, argc: u32) -> Result<(), Error> {
        let e = self.registers.e;
        self.registers.cp = self.load(e + 2)?.address();
        self.registers.e = self.load(e + 1)?.address();
        self.stack.set_pointer(e.offset(), &mut self.trail)?;
        self.stack.deallocate(argc)
    }

    /// Jumps to `entry`, returning to the current instruction pointer on `Proceed`.
    pub fn call(&mut self, entry: u32) {
        self.registers.cp = self.registers.p;
        self.registers.p = Address::Code(entry as i32);
        self.registers.b0 = Address::Blank(self.trail.level() as i32);
    }

    fn proceed(&mut self) -> bool {
        self.registers.p = self.registers.cp;
        self.registers.p.offset() >= 0
    }

    /// Opens a trail frame that resumes at `next` with the current registers.
    fn choice_point(&mut self, next: u32) -> Result<(), Error> {
        let boundary = self.boundary();
        self.trail.push(boundary);
        debug!(target: "warm::machine", level = self.trail.level(), next, "choice point");

        let registers = [
            (GlobalRegister::InstructionPointer, Address::Code(next as i32)),
            (GlobalRegister::ContinuationPointer, self.registers.cp),
            (GlobalRegister::Environment, self.registers.e),
            (GlobalRegister::TopOfHeap, self.registers.h),
            (GlobalRegister::StackPointer, Address::Stack(self.stack.pointer())),
            (GlobalRegister::ChoicePointBase, self.registers.b0),
        ];

        for &(register, value) in registers.iter() {
            self.trail.add_item(Address::Register(register), value.pack());
        }

        Ok(())
    }

    /// The cells a choice point made now would have to restore.
    fn boundary(&self) -> Boundary {
        Boundary::new(self.registers.h.offset(), self.stack.pointer())
    }

    /// Pops the newest trail frame and undoes it, newest record first. Returns `false`
    /// when there is no choice point left.
    pub fn backtrack(&mut self) -> Result<bool, Error> {
        let frame = match self.trail.pop_backtrack_items() {
            Some(frame) => frame,
            None => return Ok(false),
        };

        debug!(target: "warm::machine", level = self.trail.level(), records = frame.len(), "backtrack");

        for item in frame.iter().rev() {
            match item.address {
                Address::Register(GlobalRegister::StackPointer) => {
                    self.stack.backtrack_pointer(item.value.address().offset())
                }
                Address::Register(register) => self.registers.set(register, item.value.address()),
                Address::Heap(i) => *slot(&mut self.heap, i, item.address)? = item.value,
                Address::Retained(i) => *slot(&mut self.retained, i, item.address)? = item.value,
                Address::Stack(i) => self.stack.backtrack(i, item.value)?,
                other => return Err(Error::InvalidAddress(other)),
            }
        }

        Ok(true)
    }

    /// Commits every choice point opened above `level`.
    pub fn cut(&mut self, level: usize) {
        debug!(target: "warm::machine", from = self.trail.level(), to = level, "cut");
        self.trail.cut(level);
    }

    pub fn load(&self, address: Address) -> Result<Word, Error> {
        let word = match address {
            Address::Heap(i) => self.heap.get(i as usize),
            Address::Retained(i) => self.retained.get(i as usize),
            Address::Stack(i) => return self.stack.get(i),
            _ => None,
        };

        word.cloned().ok_or(Error::InvalidAddress(address))
    }

    /// A trailed store.
    pub fn store(&mut self, address: Address, value: Word) -> Result<(), Error> {
        match address {
            Address::Heap(i) => {
                let cell = slot(&mut self.heap, i, address)?;
                self.trail.add_item(address, *cell);
                *cell = value;
            }
            Address::Retained(i) => {
                let cell = slot(&mut self.retained, i, address)?;
                self.trail.add_item(address, *cell);
                *cell = value;
            }
            Address::Stack(i) => self.stack.set(i, value, &mut self.trail)?,
            other => return Err(Error::InvalidAddress(other)),
        }

        Ok(())
    }

    /// An untrailed store, for cells allocated after the newest choice point was made.
    /// Backtracking reclaims them by resetting the allocation register instead.
    fn store_fresh(&mut self, address: Address, value: Word) -> Result<(), Error> {
        match address {
            Address::Heap(i) => *slot(&mut self.heap, i, address)? = value,
            Address::Retained(i) => *slot(&mut self.retained, i, address)? = value,
            other => return self.store(other, value),
        }

        Ok(())
    }

    /// Follows `Ref` links until reaching a non-`Ref` cell or an unbound variable.
    pub fn deref(&self, mut address: Address) -> Result<Address, Error> {
        loop {
            match self.load(address)?.unpack() {
                Cell::Ref(next) if next != address => address = next,
                _ => return Ok(address),
            }
        }
    }

    #[inline]
    pub fn deref_load(&self, address: Address) -> Result<Word, Error> {
        self.load(self.deref(address)?)
    }

    /// The functor heading the structure whose `Fun` cell is at `address`.
    pub fn functor_at(&self, address: Address) -> Result<FunctorDescriptor, Error> {
        match self.load(address)?.unpack() {
            Cell::Fun(id) => self.functor(id),
            other => Err(Error::MalformedTerm(format!(
                "expected a functor cell at {}, found {:?}",
                address, other
            ))),
        }
    }

    pub fn functor(&self, id: FunctorId) -> Result<FunctorDescriptor, Error> {
        self.program
            .functor(id)
            .cloned()
            .ok_or_else(|| Error::MalformedTerm(format!("unknown functor index {}", id)))
    }

    /// Claims `count` consecutive cells in `region`.
    pub fn allocate_cells(&mut self, region: Region, count: u32) -> Result<Address, Error> {
        let (register, capacity, segment) = match region {
            Region::Heap => (&mut self.registers.h, self.heap.len(), Segment::Heap),
            Region::Retained => (&mut self.registers.r, self.retained.len(), Segment::Retained),
        };

        let start = *register;
        let end = start.offset() as usize + count as usize;
        if end > capacity {
            return Err(Error::Exhausted { segment, capacity });
        }

        *register = start + count as i32;
        Ok(start)
    }

    /// Claims cells in `region` and fills them with `cells`. The cells are new, so the
    /// writes are not trailed.
    pub fn push_cells(&mut self, region: Region, cells: &[Word]) -> Result<Address, Error> {
        let start = self.allocate_cells(region, cells.len() as u32)?;
        for (i, &cell) in cells.iter().enumerate() {
            self.store_fresh(start + i as i32, cell)?;
        }

        Ok(start)
    }

    /// Rebuilds the term stored at `address`.
    pub fn term_at(&self, address: Address) -> Result<Term, Error> {
        crate::query::rebuild_term(self, address)
    }

    /// Opens a new solution collector (for `findall/3`).
    pub fn begin_collect(&mut self) {
        self.collectors.push(Vec::new());
    }

    /// Adds a root cell to the innermost collector. Returns `false` if none is open.
    pub fn collect(&mut self, root: Word) -> bool {
        match self.collectors.last_mut() {
            Some(collector) => {
                collector.push(root);
                true
            }
            None => false,
        }
    }

    pub fn end_collect(&mut self) -> Option<Vec<Word>> {
        self.collectors.pop()
    }

    fn display_functor(&self, id: FunctorId) -> String {
        self.program
            .functor(id)
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("#{}", id))
    }
}

#[inline]
fn slot(segment: &mut [Word], index: i32, address: Address) -> Result<&mut Word, Error> {
    if index < 0 {
        return Err(Error::InvalidAddress(address));
    }

    let capacity = segment.len();
    segment.get_mut(index as usize).ok_or(match address {
        Address::Heap(_) => Error::Exhausted {
            segment: Segment::Heap,
            capacity,
        },
        Address::Retained(_) => Error::Exhausted {
            segment: Segment::Retained,
            capacity,
        },
        other => Error::InvalidAddress(other),
    })
}

/// Renders the dereferenced arguments of the current activation record.
struct DisplayArguments<'m> {
    machine: &'m Machine,
    functor: FunctorId,
}

impl<'m> fmt::Display for DisplayArguments<'m> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let arity = self.machine.functor(self.functor).map(|d| d.arity).unwrap_or(0);
        let rendered = (0..arity).map(|i| {
            self.machine
                .term_at(self.machine.argument(i))
                .map(|term| term.to_string())
                .unwrap_or_else(|err| format!("<{}>", err))
        });

        write!(f, "({})", rendered.format(", "))
    }
}
