use serde_json::{json, Value};

/// Bookkeeping for one active loop.
///
/// Counts are unavailable when the length of the iteratee is unknown,
/// such as a `@while` driven by a condition.
#[derive(Debug, PartialEq)]
pub struct LoopContext {
    /// One based count of completed advances.
    pub iteration: usize,
    /// Zero based position, always `iteration - 1`.
    pub index: usize,
    /// Items left after the current one, when known.
    pub remaining: Option<usize>,
    /// Total number of items, when known.
    pub count: Option<usize>,
    /// True during the first pass of the loop body.
    pub first: bool,
    /// True during the final pass of the loop body, when known.
    pub last: Option<bool>,
    /// One based nesting depth.
    pub depth: usize,
}

/// The stack of active loops, innermost last.
pub struct LoopStack {
    stack: Vec<LoopContext>,
}

impl LoopStack {
    /// Create a new, empty LoopStack.
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Open a loop, optionally with a known item count.
    pub fn push(&mut self, count: Option<usize>) {
        self.stack.push(LoopContext {
            iteration: 0,
            index: 0,
            remaining: count,
            count,
            first: true,
            last: count.map(|count| count == 1),
            depth: self.stack.len() + 1,
        });
    }

    /// Advance the innermost loop by one pass.
    pub fn advance(&mut self) {
        let Some(context) = self.stack.last_mut() else {
            return;
        };
        context.iteration += 1;
        context.index = context.iteration - 1;
        context.first = context.iteration == 1;
        if let Some(count) = context.count {
            context.remaining = context.remaining.map(|r| r.saturating_sub(1));
            context.last = Some(context.iteration == count);
        }
    }

    /// Close the innermost loop.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Return the innermost loop as a value a template can read, with
    /// each enclosing loop reachable through `parent`.
    pub fn value(&self) -> Option<Value> {
        self.stack
            .iter()
            .fold(None, |parent, context| Some(describe(context, parent)))
    }
}

impl Default for LoopStack {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(context: &LoopContext, parent: Option<Value>) -> Value {
    json!({
        "iteration": context.iteration,
        "index": context.index,
        "remaining": context.remaining,
        "count": context.count,
        "first": context.first,
        "last": context.last,
        "depth": context.depth,
        "parent": parent,
    })
}
