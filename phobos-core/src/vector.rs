//! Vector register file and configuration (`vtype`, `vl`, `vstart`).

use crate::xlen::WordWidth;
use bitvec::{order::Lsb0, view::BitView};

/// Number of vector registers.
pub const LEN: usize = 32;

/// Largest supported element width in bits.
pub const ELEN: u32 = 64;

/// Decoded `vtype` CSR.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VType {
    /// Selected element width in bits (8, 16, 32 or 64).
    pub sew: u32,
    /// Register group multiplier as `log2(LMUL)`, in `-3..=3`.
    pub lmul_log2: i8,
    /// Tail agnostic.
    pub vta: bool,
    /// Mask agnostic.
    pub vma: bool,
}

impl VType {
    /// Decodes the raw `vtype` bits, returning `None` for reserved encodings.
    pub fn decode(raw: u64) -> Option<Self> {
        let lmul_log2 = match raw & 0b111 {
            0b000 => 0,
            0b001 => 1,
            0b010 => 2,
            0b011 => 3,
            0b101 => -3,
            0b110 => -2,
            0b111 => -1,
            _ => return None,
        };
        let sew = match (raw >> 3) & 0b111 {
            0b000 => 8,
            0b001 => 16,
            0b010 => 32,
            0b011 => 64,
            _ => return None,
        };
        // Bits above vma are reserved and must be zero.
        if raw >> 8 != 0 {
            return None;
        }
        Some(Self {
            sew,
            lmul_log2,
            vta: raw & (1 << 6) != 0,
            vma: raw & (1 << 7) != 0,
        })
    }

    pub fn encode(&self) -> u64 {
        let vlmul = (self.lmul_log2 as u64) & 0b111;
        let vsew = self.sew.trailing_zeros() as u64 - 3;
        vlmul | vsew << 3 | (self.vta as u64) << 6 | (self.vma as u64) << 7
    }
}

/// The architectural vector state of a hart.
///
/// > VLMAX = LMUL*VLEN/SEW represents the maximum number of elements that can be operated on with
/// > a single vector instruction given the current SEW and LMUL settings.
#[derive(Debug, Clone)]
pub struct VectorState {
    vlen: u32,
    registers: Vec<u8>,
    /// `None` when `vill` is set.
    vtype: Option<VType>,
    vl: u64,
    vstart: u64,
    vxrm: u64,
    vxsat: bool,
}

impl VectorState {
    /// Creates a vector unit with `vlen`-bit registers. `vlen` must be a power of two of at least
    /// [`ELEN`] bits, which the simulator configuration validates.
    pub fn new(vlen: u32) -> Self {
        Self {
            vlen,
            registers: vec![0; LEN * (vlen as usize / 8)],
            vtype: None,
            vl: 0,
            vstart: 0,
            vxrm: 0,
            vxsat: false,
        }
    }

    pub fn vlen(&self) -> u32 {
        self.vlen
    }

    /// VLEN in bytes.
    pub fn vlenb(&self) -> usize {
        self.vlen as usize / 8
    }

    pub fn vtype(&self) -> Option<VType> {
        self.vtype
    }

    pub fn vl(&self) -> u64 {
        self.vl
    }

    pub fn vstart(&self) -> u64 {
        self.vstart
    }

    pub fn set_vstart(&mut self, vstart: u64) {
        self.vstart = vstart;
    }

    /// Returns `true` if `vtype.vill` is set, i.e. any vector operation is illegal.
    pub fn vill(&self) -> bool {
        self.vtype.is_none()
    }

    /// VLMAX for `vtype`, or `0` if the combination of SEW and LMUL is not supported.
    pub fn vlmax(&self, vtype: VType) -> u64 {
        let bits = if vtype.lmul_log2 >= 0 {
            (self.vlen as u64) << vtype.lmul_log2
        } else {
            (self.vlen as u64) >> -vtype.lmul_log2
        };
        bits / vtype.sew as u64
    }

    /// Applies a `vsetvl{i}` configuration and returns the new `vl`.
    ///
    /// `avl` is `None` when the instruction asks to keep the current `vl` (`rs1 == x0` and
    /// `rd == x0`), and `Some(u64::MAX)` when it asks for VLMAX.
    ///
    /// Unsupported configurations set `vill` and clear `vl`.
    pub fn configure(&mut self, raw_vtype: u64, avl: Option<u64>) -> u64 {
        self.vstart = 0;
        let vtype = VType::decode(raw_vtype).filter(|vtype| {
            // Fractional LMUL must still leave room for one SEW element of ELEN.
            let min_sew_room = (ELEN as i64) >> (-vtype.lmul_log2).max(0);
            vtype.sew as i64 <= min_sew_room && self.vlmax(*vtype) > 0
        });
        let Some(vtype) = vtype else {
            self.vtype = None;
            self.vl = 0;
            return 0;
        };
        let vlmax = self.vlmax(vtype);
        self.vl = match avl {
            None => self.vl.min(vlmax),
            Some(avl) => avl.min(vlmax),
        };
        self.vtype = Some(vtype);
        self.vl
    }

    /// Raw `vtype` CSR value as seen by software.
    pub fn read_vtype(&self, width: WordWidth) -> u64 {
        match self.vtype {
            Some(vtype) => vtype.encode(),
            None => 1 << (width.bits() - 1),
        }
    }

    pub fn vxrm(&self) -> u64 {
        self.vxrm
    }

    pub fn set_vxrm(&mut self, value: u64) {
        self.vxrm = value & 0b11;
    }

    pub fn vxsat(&self) -> bool {
        self.vxsat
    }

    pub fn set_vxsat(&mut self, value: bool) {
        self.vxsat = value;
    }

    /// Reads element `index` of width `sew` bits of the register group starting at `register`.
    ///
    /// Returns `None` if the element lies beyond the register file.
    pub fn element(&self, register: u8, index: u64, sew: u32) -> Option<u64> {
        let (offset, size) = self.element_offset(register, index, sew)?;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.registers[offset..offset + size]);
        Some(u64::from_le_bytes(buf))
    }

    /// Writes the low `sew` bits of `value` to element `index` of the group starting at
    /// `register`. Returns `false` if the element lies beyond the register file.
    pub fn set_element(&mut self, register: u8, index: u64, sew: u32, value: u64) -> bool {
        let Some((offset, size)) = self.element_offset(register, index, sew) else {
            return false;
        };
        self.registers[offset..offset + size].copy_from_slice(&value.to_le_bytes()[..size]);
        true
    }

    /// Returns mask bit `index` of `v0`.
    pub fn mask_bit(&self, index: u64) -> bool {
        let bits = self.registers[..self.vlenb()].view_bits::<Lsb0>();
        bits.get(index as usize).is_some_and(|bit| *bit)
    }

    /// The bytes of a single vector register.
    pub fn register(&self, register: u8) -> &[u8] {
        let vlenb = self.vlenb();
        let start = (register as usize % LEN) * vlenb;
        &self.registers[start..start + vlenb]
    }

    fn element_offset(&self, register: u8, index: u64, sew: u32) -> Option<(usize, usize)> {
        let size = sew as usize / 8;
        let offset = (register as usize)
            .checked_mul(self.vlenb())?
            .checked_add((index as usize).checked_mul(size)?)?;
        (offset + size <= self.registers.len()).then_some((offset, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vtype_decode() {
        let vtype = VType::decode(0b1_1_011_001).unwrap();
        assert_eq!(64, vtype.sew);
        assert_eq!(1, vtype.lmul_log2);
        assert!(vtype.vta);
        assert!(vtype.vma);
        assert_eq!(0b1_1_011_001, vtype.encode());
        assert_eq!(None, VType::decode(0b100));
        assert_eq!(None, VType::decode(0b100_000));
        assert_eq!(None, VType::decode(1 << 8));
        assert_eq!(-1, VType::decode(0b111).unwrap().lmul_log2);
    }

    #[test]
    fn test_configure() {
        let mut vector = VectorState::new(128);
        // e32, m1 -> VLMAX = 4
        assert_eq!(4, vector.configure(0b010_000, Some(10)));
        assert_eq!(3, vector.configure(0b010_000, Some(3)));
        // e8, m2 -> VLMAX = 32, keep current vl
        assert_eq!(3, vector.configure(0b000_001, None));
        assert_eq!(32, vector.configure(0b000_001, Some(u64::MAX)));
        assert!(!vector.vill());
        // e64 with LMUL=1/2 is not supported with ELEN=64.
        assert_eq!(0, vector.configure(0b011_111, Some(4)));
        assert!(vector.vill());
        assert_eq!(1 << 63, vector.read_vtype(WordWidth::W64));
        assert_eq!(1 << 31, vector.read_vtype(WordWidth::W32));
    }

    #[test]
    fn test_elements_span_register_groups() {
        let mut vector = VectorState::new(128);
        assert!(vector.set_element(2, 5, 32, 0xDEAD_BEEF_1234));
        // Element 5 of e32 lives in the second register of the group.
        assert_eq!(Some(0xBEEF_1234), vector.element(3, 1, 32));
        assert_eq!(Some(0xBEEF_1234), vector.element(2, 5, 32));
        assert_eq!(&[0x34, 0x12, 0xEF, 0xBE], &vector.register(3)[4..8]);
        assert!(!vector.set_element(31, 4, 32, 0));
        assert_eq!(None, vector.element(31, 2, 64));
    }

    #[test]
    fn test_mask_bits() {
        let mut vector = VectorState::new(128);
        vector.set_element(0, 0, 8, 0b1010_0101);
        assert!(vector.mask_bit(0));
        assert!(!vector.mask_bit(1));
        assert!(vector.mask_bit(7));
        assert!(!vector.mask_bit(200));
    }
}
