//! Page table entries and the page table walk of the supported paging schemes.
//!
//! > The page tables are organized as a multi-level tree; the root page table is located at the
//! > physical page number held in satp.

use super::translate::{AccessType, MmuMode};
use super::{Exception, Hart};
use crate::unit::PAGE;
use crate::PrivilegeLevel;
use bitvec::{order::Lsb0, view::BitView};

/// A paging scheme: how virtual addresses are split and how large page table entries are.
///
/// [`Baremetal`] is the scheme with zero levels, mapping every address onto itself.
pub trait PagingScheme: 'static {
    const MODE: MmuMode;
    /// Number of page table levels.
    const LEVELS: u32;
    /// Width of each VPN field.
    const VPN_BITS: u32;
    /// Size of a page table entry in bytes.
    const PTE_SIZE: u64;
    /// Width of the PPN field of a page table entry.
    const PPN_BITS: u32;
    /// Number of significant virtual address bits.
    const VA_BITS: u32;
    /// Names of the instruction, load and store translation steps.
    const STEP_NAMES: [&'static str; 3];
}

#[derive(Debug, Copy, Clone)]
pub struct Baremetal;

#[derive(Debug, Copy, Clone)]
pub struct Sv32;

#[derive(Debug, Copy, Clone)]
pub struct Sv39;

impl PagingScheme for Baremetal {
    const MODE: MmuMode = MmuMode::Baremetal;
    const LEVELS: u32 = 0;
    const VPN_BITS: u32 = 0;
    const PTE_SIZE: u64 = 0;
    const PPN_BITS: u32 = 0;
    const VA_BITS: u32 = 64;
    const STEP_NAMES: [&'static str; 3] = [
        "baremetal_inst_translate",
        "baremetal_load_translate",
        "baremetal_store_translate",
    ];
}

impl PagingScheme for Sv32 {
    const MODE: MmuMode = MmuMode::Sv32;
    const LEVELS: u32 = 2;
    const VPN_BITS: u32 = 10;
    const PTE_SIZE: u64 = 4;
    const PPN_BITS: u32 = 22;
    const VA_BITS: u32 = 32;
    const STEP_NAMES: [&'static str; 3] = [
        "sv32_inst_translate",
        "sv32_load_translate",
        "sv32_store_translate",
    ];
}

impl PagingScheme for Sv39 {
    const MODE: MmuMode = MmuMode::Sv39;
    const LEVELS: u32 = 3;
    const VPN_BITS: u32 = 9;
    const PTE_SIZE: u64 = 8;
    const PPN_BITS: u32 = 44;
    const VA_BITS: u32 = 39;
    const STEP_NAMES: [&'static str; 3] = [
        "sv39_inst_translate",
        "sv39_load_translate",
        "sv39_store_translate",
    ];
}

/// A single page table entry, Sv32 entries zero-extended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageTableEntry(pub u64);

impl PageTableEntry {
    pub fn valid(&self) -> bool {
        self.bit(idx::V)
    }

    pub fn readable(&self) -> bool {
        self.bit(idx::R)
    }

    pub fn writable(&self) -> bool {
        self.bit(idx::W)
    }

    pub fn executable(&self) -> bool {
        self.bit(idx::X)
    }

    pub fn user(&self) -> bool {
        self.bit(idx::U)
    }

    pub fn accessed(&self) -> bool {
        self.bit(idx::A)
    }

    pub fn dirty(&self) -> bool {
        self.bit(idx::D)
    }

    /// A PTE is a leaf as soon as any of R, W or X is set.
    pub fn is_leaf(&self) -> bool {
        self.readable() || self.writable() || self.executable()
    }

    pub fn ppn<P: PagingScheme>(&self) -> u64 {
        (self.0 >> 10) & ((1 << P::PPN_BITS) - 1)
    }

    /// Bits that must be zero for the scheme: the Sv39 reserved field as well as the N and PBMT
    /// fields of extensions this hart doesn't implement.
    pub fn reserved_bits<P: PagingScheme>(&self) -> u64 {
        match P::PTE_SIZE {
            8 => self.0 >> 54,
            _ => 0,
        }
    }

    pub fn with_accessed(self, dirty: bool) -> Self {
        let mut raw = self.0;
        let bits = raw.view_bits_mut::<Lsb0>();
        bits.set(idx::A, true);
        if dirty {
            bits.set(idx::D, true);
        }
        Self(raw)
    }

    fn bit(&self, index: usize) -> bool {
        self.0.view_bits::<Lsb0>()[index]
    }
}

/// Bit indices into a page table entry.
mod idx {
    pub const V: usize = 0;
    pub const R: usize = 1;
    pub const W: usize = 2;
    pub const X: usize = 3;
    pub const U: usize = 4;
    pub const A: usize = 6;
    pub const D: usize = 7;
}

/// Translates `vaddr` for an access of type `access` performed at `privilege`.
///
/// Follows the virtual address translation process of the privileged specification, section
/// 4.3.2. Returns the physical address, or the page or access fault to raise.
pub fn walk<P: PagingScheme>(
    hart: &mut Hart,
    vaddr: u64,
    access: AccessType,
    privilege: PrivilegeLevel,
) -> Result<u64, Exception> {
    if P::LEVELS == 0 {
        return Ok(hart.config.xlen.truncate(vaddr));
    }
    if P::VA_BITS < 64 && hart.config.xlen.bits() == 64 {
        // Bits above the virtual address width must all equal its top bit.
        let upper = (vaddr as i64) >> (P::VA_BITS - 1);
        if upper != 0 && upper != -1 {
            return Err(access.page_fault());
        }
    }

    let status = &hart.csrs.status;
    let (mxr, sum) = (status.mxr(), status.sum());
    let mut table = hart.csrs.satp_root();
    let mut level = P::LEVELS - 1;
    let (pte, pte_address) = loop {
        let vpn = (vaddr >> (12 + level * P::VPN_BITS)) & ((1 << P::VPN_BITS) - 1);
        let pte_address = table + vpn * P::PTE_SIZE;
        let pte = read_pte::<P>(hart, pte_address).ok_or(access.access_fault())?;
        if !pte.valid() || (!pte.readable() && pte.writable()) || pte.reserved_bits::<P>() != 0 {
            return Err(access.page_fault());
        }
        if pte.is_leaf() {
            break (pte, pte_address);
        }
        if level == 0 {
            return Err(access.page_fault());
        }
        level -= 1;
        table = pte.ppn::<P>() * PAGE;
    };

    let permitted = match access {
        AccessType::Instruction => pte.executable(),
        AccessType::Load => pte.readable() || (mxr && pte.executable()),
        AccessType::Store => pte.writable(),
    };
    let privilege_ok = match privilege {
        PrivilegeLevel::User => pte.user(),
        PrivilegeLevel::Supervisor => !pte.user() || (sum && access != AccessType::Instruction),
        PrivilegeLevel::Machine => true,
    };
    if !permitted || !privilege_ok {
        return Err(access.page_fault());
    }

    // Superpages must be aligned to their own size.
    let low_ppn_bits = level * P::VPN_BITS;
    let ppn = pte.ppn::<P>();
    if ppn & ((1 << low_ppn_bits) - 1) != 0 {
        return Err(access.page_fault());
    }

    let store = access == AccessType::Store;
    if !pte.accessed() || (store && !pte.dirty()) {
        if !hart.config.hardware_ad_update {
            return Err(access.page_fault());
        }
        write_pte::<P>(hart, pte_address, pte.with_accessed(store))
            .ok_or(access.access_fault())?;
    }

    let offset_bits = 12 + low_ppn_bits;
    Ok(ppn << 12 | vaddr & ((1 << offset_bits) - 1))
}

fn read_pte<P: PagingScheme>(hart: &Hart, address: u64) -> Option<PageTableEntry> {
    let raw = match P::PTE_SIZE {
        4 => hart.memory.read_word(address).ok()? as u64,
        _ => hart.memory.read_doubleword(address).ok()?,
    };
    Some(PageTableEntry(raw))
}

fn write_pte<P: PagingScheme>(hart: &mut Hart, address: u64, pte: PageTableEntry) -> Option<()> {
    match P::PTE_SIZE {
        4 => hart.memory.write_word(address, pte.0 as u32).ok(),
        _ => hart.memory.write_doubleword(address, pte.0).ok(),
    }
}
