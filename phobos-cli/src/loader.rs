use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use log::debug;
use phobos_core::{SimError, Simulator};
use thiserror::Error;

/// The parts of an ELF file the simulator cares about.
#[derive(Debug)]
pub struct Image<'a> {
    pub is_64: bool,
    pub entry: u64,
    pub tohost: Option<u64>,
    /// `begin_signature..end_signature`, for riscv-arch-test programs.
    pub signature: Option<(u64, u64)>,
    segments: Vec<Segment<'a>>,
}

#[derive(Debug)]
struct Segment<'a> {
    paddr: u64,
    data: &'a [u8],
    /// Size in memory. Bytes past `data` are zero-filled.
    mem_size: u64,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("malformed ELF file: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("segment {index} extends beyond the end of the file")]
    SegmentOutOfFile { index: usize },
    #[error("cannot load segment: {0}")]
    Sim(#[from] SimError),
}

impl<'a> Image<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, LoadError> {
        let elf = Elf::parse(bytes)?;

        let mut segments = Vec::new();
        for (index, header) in elf.program_headers.iter().enumerate() {
            if header.p_type != PT_LOAD {
                continue;
            }
            let data = bytes
                .get(header.file_range())
                .ok_or(LoadError::SegmentOutOfFile { index })?;
            segments.push(Segment {
                paddr: header.p_paddr,
                data,
                mem_size: header.p_memsz,
            });
        }

        let symbol = |name: &str| {
            elf.syms
                .iter()
                .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
                .map(|sym| sym.st_value)
        };
        let signature = symbol("begin_signature").zip(symbol("end_signature"));

        Ok(Self {
            is_64: elf.is_64,
            entry: elf.entry,
            tohost: symbol("tohost"),
            signature,
            segments,
        })
    }

    /// Copies every loadable segment into physical memory.
    pub fn load(&self, simulator: &mut Simulator) -> Result<(), LoadError> {
        for segment in &self.segments {
            debug!(
                "Loading segment into [{:#010x}..{:#010x}]",
                segment.paddr,
                segment.paddr + segment.mem_size,
            );
            simulator.load_physical(segment.paddr, segment.data)?;
            let zeroed = segment.mem_size.saturating_sub(segment.data.len() as u64);
            if zeroed > 0 {
                let bss = vec![0; zeroed as usize];
                simulator.load_physical(segment.paddr + segment.data.len() as u64, &bss)?;
            }
        }
        Ok(())
    }
}
