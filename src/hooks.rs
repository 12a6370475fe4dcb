//! Ordered hook lists for code and memory-access interception, Unicorn-style
//! per spec.md §4.6.
//!
//! A fast path backs each hook kind with an address->hook map whenever every
//! registered hook of that kind covers a single address and addresses are
//! unique; the first hook that breaks the invariant (a ranged hook, or a
//! second hook on an already-used address) discards the map for that kind
//! and falls back to a linear scan, exactly as spec.md describes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;

use crate::emulator::Emulator;

bitflags! {
    pub struct HookKind: u32 {
        const CODE       = 4;
        const MEM_READ   = 1024;
        const MEM_WRITE  = 2048;
    }
}

/// Access kind reported to memory hook callbacks, per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read = 16,
    Write = 17,
}

#[derive(Debug, Clone)]
pub enum HookEvent {
    Code { pc: u16, length: u8 },
    Mem { kind: AccessKind, addr: u16, len: usize, value: Option<Vec<u8>> },
}

pub type HookCallback = Rc<RefCell<dyn FnMut(&mut Emulator, HookEvent)>>;

pub struct Hook {
    id: u64,
    kinds: HookKind,
    /// Half-open `[begin, end)`, per spec.md §4.6.
    begin: u32,
    end: u32,
    callback: HookCallback,
}

impl Hook {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.begin && addr < self.end
    }

    fn is_unit_range(&self) -> bool {
        self.end == self.begin + 1
    }

    pub fn fire(&self, emu: &mut Emulator, event: HookEvent) {
        (self.callback.borrow_mut())(emu, event);
    }
}

/// Opaque handle returned by `hook_add`, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle(u64);

#[derive(Default)]
struct HookBucket {
    hooks: Vec<Rc<Hook>>,
    /// Some(map) when the fast-path invariant holds for this bucket.
    fast: Option<HashMap<u32, Rc<Hook>>>,
}

impl HookBucket {
    fn recompute_fast_path(&mut self) {
        let mut map = HashMap::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            if !hook.is_unit_range() || map.contains_key(&hook.begin) {
                self.fast = None;
                return;
            }
            map.insert(hook.begin, hook.clone());
        }
        self.fast = Some(map);
    }

    fn add(&mut self, hook: Rc<Hook>) {
        self.hooks.push(hook);
        self.recompute_fast_path();
    }

    fn remove(&mut self, id: u64) {
        self.hooks.retain(|h| h.id != id);
        self.recompute_fast_path();
    }

    /// Snapshot of the hooks covering `addr`, cloned out so the caller can
    /// fire them while mutably holding the rest of the emulator.
    fn snapshot_for(&self, addr: u32) -> Vec<Rc<Hook>> {
        if let Some(map) = &self.fast {
            map.get(&addr).cloned().into_iter().collect()
        } else {
            self.hooks.iter().filter(|h| h.contains(addr)).cloned().collect()
        }
    }

    /// Snapshot of every hook intersecting `[addr, addr+len)`, used for bulk
    /// memory transfers.
    fn snapshot_for_range(&self, addr: u32, len: usize) -> Vec<Rc<Hook>> {
        if len == 0 {
            return Vec::new();
        }
        let end = addr + len as u32;
        if let Some(map) = &self.fast {
            (addr..end).filter_map(|a| map.get(&a).cloned()).collect::<Vec<_>>().into_iter().fold(
                Vec::new(),
                |mut acc, h| {
                    if !acc.iter().any(|existing: &Rc<Hook>| Rc::ptr_eq(existing, &h)) {
                        acc.push(h);
                    }
                    acc
                },
            )
        } else {
            self.hooks.iter().filter(|h| h.begin < end && h.end > addr).cloned().collect()
        }
    }
}

#[derive(Default)]
pub struct HookTable {
    code: HookBucket,
    mem_read: HookBucket,
    mem_write: HookBucket,
    next_id: u64,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_add(
        &mut self,
        kinds: HookKind,
        begin: u32,
        end: u32,
        callback: impl FnMut(&mut Emulator, HookEvent) + 'static,
    ) -> HookHandle {
        self.next_id += 1;
        let id = self.next_id;
        let hook = Rc::new(Hook {
            id,
            kinds,
            begin,
            end,
            callback: Rc::new(RefCell::new(callback)),
        });
        if kinds.contains(HookKind::CODE) {
            self.code.add(hook.clone());
        }
        if kinds.contains(HookKind::MEM_READ) {
            self.mem_read.add(hook.clone());
        }
        if kinds.contains(HookKind::MEM_WRITE) {
            self.mem_write.add(hook);
        }
        HookHandle(id)
    }

    pub fn hook_del(&mut self, handle: HookHandle) {
        self.code.remove(handle.0);
        self.mem_read.remove(handle.0);
        self.mem_write.remove(handle.0);
    }

    pub fn code_hooks_at(&self, pc: u16) -> Vec<Rc<Hook>> {
        self.code.snapshot_for(pc as u32)
    }

    pub fn read_hooks_for(&self, addr: u16, len: usize) -> Vec<Rc<Hook>> {
        self.mem_read.snapshot_for_range(addr as u32, len)
    }

    pub fn write_hooks_for(&self, addr: u16, len: usize) -> Vec<Rc<Hook>> {
        self.mem_write.snapshot_for_range(addr as u32, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    #[test]
    fn fast_path_holds_for_unique_unit_hooks_and_breaks_on_overlap() {
        let mut table = HookTable::new();
        let hit = StdRc::new(Cell::new(0));
        let hit2 = hit.clone();
        table.hook_add(HookKind::CODE, 0x100, 0x101, move |_emu, _ev| {
            hit2.set(hit2.get() + 1);
        });
        assert!(table.code.fast.is_some());

        // A second unit hook at a different address keeps the fast path.
        table.hook_add(HookKind::CODE, 0x200, 0x201, |_emu, _ev| {});
        assert!(table.code.fast.is_some());

        // A ranged hook breaks the invariant.
        table.hook_add(HookKind::CODE, 0x300, 0x310, |_emu, _ev| {});
        assert!(table.code.fast.is_none());

        assert_eq!(table.code_hooks_at(0x100).len(), 1);
        assert_eq!(table.code_hooks_at(0x305).len(), 1);
        assert_eq!(table.code_hooks_at(0x999).len(), 0);
    }

    #[test]
    fn removing_a_hook_restores_prior_observed_behaviour() {
        let mut table = HookTable::new();
        let handle = table.hook_add(HookKind::MEM_WRITE, 0x10, 0x20, |_emu, _ev| {});
        assert_eq!(table.write_hooks_for(0x15, 1).len(), 1);
        table.hook_del(handle);
        assert_eq!(table.write_hooks_for(0x15, 1).len(), 0);
    }
}
