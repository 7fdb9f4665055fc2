//! Architectural-test signature extraction (§4.8): dumps `[begin_signature, end_signature)` as
//! one lowercase hex line per `granularity`-byte word, for comparison against a reference model.

use std::io::Write;

use thiserror::Error;

use crate::hart::Hart;

/// Bytes per signature word; the only values the format supports.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Granularity {
    Byte,
    Halfword,
    Word,
}

impl Granularity {
    pub fn bytes(self) -> u32 {
        match self {
            Granularity::Byte => 1,
            Granularity::Halfword => 2,
            Granularity::Word => 4,
        }
    }

    pub fn from_bytes(value: u32) -> Option<Self> {
        match value {
            1 => Some(Granularity::Byte),
            2 => Some(Granularity::Halfword),
            4 => Some(Granularity::Word),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("begin_signature ({begin:#010x}) is not before end_signature ({end:#010x})")]
    EmptyRange { begin: u32, end: u32 },
    #[error("failed to write signature file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the signature file at `path`, reading `[begin, end)` from `hart`'s memory in
/// `granularity`-byte, little-endian chunks and formatting each as lowercase zero-padded hex.
pub fn write_signature(
    hart: &mut Hart,
    path: &str,
    begin: u32,
    end: u32,
    granularity: Granularity,
) -> Result<(), SignatureError> {
    if begin >= end {
        return Err(SignatureError::EmptyRange { begin, end });
    }

    let mut file = std::fs::File::create(path).map_err(|source| SignatureError::Io {
        path: path.to_string(),
        source,
    })?;

    let step = granularity.bytes();
    let digits = (step * 2) as usize;
    let mut addr = begin;
    while addr < end {
        let mut value: u32 = 0;
        for i in 0..step {
            value |= u32::from(hart.read_byte(addr + i)) << (8 * i);
        }
        writeln!(file, "{value:0digits$x}").map_err(|source| SignatureError::Io {
            path: path.to_string(),
            source,
        })?;
        addr += step;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_MEM_BASE;

    #[test]
    fn four_byte_granularity_is_little_endian_per_word() {
        let mut hart = Hart::new(DEFAULT_MEM_BASE, 0x1000, DEFAULT_MEM_BASE);
        let bytes = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let base = DEFAULT_MEM_BASE;
        for (i, &b) in bytes.iter().enumerate() {
            hart.write_byte(base + i as u32, b);
        }
        let path = std::env::temp_dir().join(format!("rvsim-sig-test-{}.txt", std::process::id()));
        write_signature(
            &mut hart,
            path.to_str().unwrap(),
            base,
            base + 16,
            Granularity::Word,
        )
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            "33221100\n77665544\nbbaa9988\nffeeddcc\n",
            contents
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut hart = Hart::new(DEFAULT_MEM_BASE, 0x1000, DEFAULT_MEM_BASE);
        let err = write_signature(&mut hart, "/dev/null", 0x100, 0x100, Granularity::Word)
            .unwrap_err();
        assert!(matches!(err, SignatureError::EmptyRange { .. }));
    }
}
