//! Program loader: places an ELF image's `PT_LOAD` segments (or a raw binary) into a [`Hart`]'s
//! physical memory and resolves the `tohost`/`begin_signature`/`end_signature` symbols.

use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use log::{debug, warn};
use thiserror::Error;

use crate::hart::Hart;

const ELF_MAGIC: &[u8; 4] = b"\x7FELF";

/// The outcome of loading a program image: where to start execution, and any of the well-known
/// symbols this loader looks for.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadedImage {
    /// The entry point to seed `pc` with. For a raw binary this is always the RAM base.
    pub entry: u32,
    /// The `tohost` symbol's address, if the image defines one.
    pub tohost: Option<u32>,
    /// The `begin_signature` symbol's address, if the image defines one.
    pub begin_signature: Option<u32>,
    /// The `end_signature` symbol's address, if the image defines one.
    pub end_signature: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read program image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ELF image: {0}")]
    Elf(#[from] goblin::error::Error),
}

/// Loads `path` into `hart`'s physical memory, returning the resolved entry point and symbols.
///
/// A file beginning with the 4-byte ELF magic is parsed and its `PT_LOAD` segments are placed at
/// their physical addresses; otherwise the whole file is treated as a raw binary image loaded at
/// the memory window's base address.
pub fn load(hart: &mut Hart, mem_base: u32, path: &str) -> Result<LoadedImage, LoaderError> {
    let bytes = std::fs::read(path).map_err(|source| LoaderError::Io {
        path: path.to_string(),
        source,
    })?;

    if bytes.len() >= 4 && &bytes[..4] == ELF_MAGIC {
        load_elf(hart, &bytes)
    } else {
        debug!("{path} is not an ELF image, loading as raw binary at {mem_base:#010x}");
        hart.memory_mut().load(mem_base, &bytes);
        hart.set_reset_pc(mem_base);
        hart.set_pc(mem_base);
        Ok(LoadedImage {
            entry: mem_base,
            ..Default::default()
        })
    }
}

fn load_elf(hart: &mut Hart, bytes: &[u8]) -> Result<LoadedImage, LoaderError> {
    let elf = Elf::parse(bytes)?;

    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        let file_range = header.file_range();
        let Some(segment) = bytes.get(file_range.clone()) else {
            warn!(
                "PT_LOAD segment file range {:#x?} is out of bounds, skipping",
                file_range
            );
            continue;
        };
        debug!(
            "loading PT_LOAD segment: file[{:#x?}] -> paddr {:#010x}..{:#010x} (filesz {:#x}, memsz {:#x})",
            file_range, header.p_paddr, header.p_paddr + header.p_memsz, header.p_filesz, header.p_memsz,
        );
        hart.memory_mut().load(header.p_paddr as u32, segment);
        // Zero-fill [p_filesz, p_memsz) -- RAM starts zeroed, so this only matters for a reset
        // or a re-load over previously-written memory, but it costs nothing to always do it.
        if header.p_memsz > header.p_filesz {
            let bss_len = (header.p_memsz - header.p_filesz) as usize;
            let zeroes = vec![0u8; bss_len];
            let bss_addr = (header.p_paddr + header.p_filesz) as u32;
            hart.memory_mut().load(bss_addr, &zeroes);
        }
    }

    let mut image = LoadedImage {
        entry: elf.entry as u32,
        ..Default::default()
    };

    for sym in elf.syms.iter() {
        let Some(name) = elf.strtab.get_at(sym.st_name) else {
            continue;
        };
        match name {
            "tohost" => image.tohost = Some(sym.st_value as u32),
            "begin_signature" => image.begin_signature = Some(sym.st_value as u32),
            "end_signature" => image.end_signature = Some(sym.st_value as u32),
            _ => {}
        }
    }

    if let Some(tohost) = image.tohost {
        hart.set_tohost_addr(tohost);
    }
    hart.set_reset_pc(image.entry);
    hart.set_pc(image.entry);

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_MEM_BASE;

    #[test]
    fn raw_binary_loads_at_mem_base() {
        let mut hart = Hart::new(DEFAULT_MEM_BASE, 0x1000, DEFAULT_MEM_BASE);
        let dir = tempfile_dir();
        let path = dir.join("raw.bin");
        std::fs::write(&path, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        let image = load(&mut hart, DEFAULT_MEM_BASE, path.to_str().unwrap()).unwrap();
        assert_eq!(DEFAULT_MEM_BASE, image.entry);
        assert_eq!(0xEFBE_ADDE, hart.memory_mut().read_word(DEFAULT_MEM_BASE));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut hart = Hart::new(DEFAULT_MEM_BASE, 0x1000, DEFAULT_MEM_BASE);
        let err = load(&mut hart, DEFAULT_MEM_BASE, "/nonexistent/path/for/rvsim-tests").unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rvsim-loader-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
