use ::serde::{Deserialize, Serialize};

/// Segment capacities, in words, plus compiler switches. Every segment is allocated
/// once at construction and never grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub heap_size: usize,
    pub stack_size: usize,
    pub retained_size: usize,
    pub code_size: usize,
    /// Emit `Trace`/`EndTrace` around every compiled clause body.
    pub trace: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            heap_size: 1 << 16,
            stack_size: 1 << 14,
            retained_size: 1 << 14,
            code_size: 1 << 16,
            trace: false,
        }
    }
}

impl MachineConfig {
    pub fn with_heap_size(mut self, heap_size: usize) -> Self {
        self.heap_size = heap_size;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_retained_size(mut self, retained_size: usize) -> Self {
        self.retained_size = retained_size;
        self
    }

    pub fn with_code_size(mut self, code_size: usize) -> Self {
        self.code_size = code_size;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
