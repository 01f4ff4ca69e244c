//! Normalized exception regions: one entry per try block, carrying every
//! catch handler attached to it.

use declass_ir::instruction::RawHandler;

/// One catch handler of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub pc: u32,
    /// Caught class name; `None` is the universal (catch-any) handler.
    pub caught_type: Option<String>,
}

/// A try block `[start_pc, end_pc)` and its handlers, in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    start_pc: u32,
    end_pc: u32,
    /// End pc as persisted, before handler-adjacency normalization. Raw
    /// entries are merged on (start_pc, raw_end_pc) so that an adjusted end
    /// does not split one try block into two regions.
    raw_end_pc: u32,
    handlers: Vec<Handler>,
}

impl ExceptionRegion {
    fn new(raw: &RawHandler) -> Self {
        let mut region = ExceptionRegion {
            start_pc: raw.start_pc,
            end_pc: raw.end_pc,
            raw_end_pc: raw.end_pc,
            handlers: Vec::new(),
        };
        region.add_handler(raw);
        region
    }

    /// Same logical try block: identical raw (start, end) pair.
    fn same_try_block(&self, raw: &RawHandler) -> bool {
        self.start_pc == raw.start_pc && self.raw_end_pc == raw.end_pc
    }

    fn add_handler(&mut self, raw: &RawHandler) {
        // Known compiler-emission quirk: one toolchain ends the try block on
        // the handler's pc, the other one instruction before it. Fold the
        // exactly-one gap onto the handler pc so both spellings structure
        // identically; any larger gap is left untouched.
        if raw.handler_pc == self.raw_end_pc + 1 {
            self.end_pc = raw.handler_pc;
        }
        self.handlers.push(Handler {
            pc: raw.handler_pc,
            caught_type: raw.caught_type.clone(),
        });
    }

    pub fn start_pc(&self) -> u32 {
        self.start_pc
    }

    pub fn end_pc(&self) -> u32 {
        self.end_pc
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Whether `pc` lies inside the guarded range.
    pub fn contains(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }

    /// At least one handler catches the universal type.
    pub fn is_catch_any(&self) -> bool {
        self.handlers.iter().any(|h| h.caught_type.is_none())
    }
}

/// Normalize raw exception-table entries, in encounter order, into regions.
/// Entries sharing a raw (start, end) pair collapse into one region with
/// several handlers.
pub fn normalize_regions(raw: &[RawHandler]) -> Vec<ExceptionRegion> {
    let mut regions: Vec<ExceptionRegion> = Vec::new();
    for entry in raw {
        if entry.start_pc >= entry.end_pc {
            log::warn!(
                "dropping degenerate exception-table entry [{:#x}, {:#x})",
                entry.start_pc,
                entry.end_pc
            );
            continue;
        }
        match regions.iter_mut().find(|r| r.same_try_block(entry)) {
            Some(region) => region.add_handler(entry),
            None => regions.push(ExceptionRegion::new(entry)),
        }
    }
    regions
}

/// Regions whose guarded range brackets `pc`.
pub fn regions_at<'a>(regions: &'a [ExceptionRegion], pc: u32) -> Vec<&'a ExceptionRegion> {
    regions.iter().filter(|r| r.contains(pc)).collect()
}
