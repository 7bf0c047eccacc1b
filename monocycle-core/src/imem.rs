//! Word-addressed instruction memory.
//!
//! The memory is read-only while the core executes. Populating it is up to whoever constructs the
//! core; the loaders offered here are conveniences for tooling.

use crate::unit::WORD;
use thiserror::Error;

/// Number of 32-bit words in the instruction memory.
pub const LEN: usize = 256;

/// Size in bytes of the instruction memory.
pub const SIZE: u32 = LEN as u32 * WORD;

const_assert!(LEN.is_power_of_two());
const_assert_eq!(SIZE, 1024);

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum LoadError {
    #[error("{len} bytes at {address:#010x} do not fit in instruction memory")]
    OutOfRange { address: u32, len: usize },
    #[error("invalid instruction word on line {line}: {text:?}")]
    InvalidHexWord { line: usize, text: String },
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum AccessError {
    #[error("address {0:#010x} is outside of instruction memory")]
    OutOfRange(u32),
}

/// Fixed-size instruction memory of [`LEN`] little-endian words.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstructionMemory {
    words: Box<[u32; LEN]>,
}

impl Default for InstructionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionMemory {
    /// Returns an instruction memory filled with zero words.
    pub fn new() -> Self {
        Self {
            words: Box::new([0; LEN]),
        }
    }

    /// Creates an instruction memory holding `words`, starting at word index 0.
    pub fn from_words(words: &[u32]) -> Result<Self, LoadError> {
        if words.len() > LEN {
            return Err(LoadError::OutOfRange {
                address: 0,
                len: words.len() * WORD as usize,
            });
        }
        let mut memory = Self::new();
        memory.words[..words.len()].copy_from_slice(words);
        Ok(memory)
    }

    /// Creates an instruction memory from a little-endian byte image, starting at address 0.
    ///
    /// A trailing partial word is zero-padded.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut memory = Self::new();
        memory.load(0, bytes)?;
        Ok(memory)
    }

    /// Parses a text image with one hexadecimal word per line, in the style of `$readmemh`.
    ///
    /// Blank lines are skipped, as is everything after `//` or `#`. Words may carry a `0x` prefix
    /// and `_` separators.
    pub fn from_hex(text: &str) -> Result<Self, LoadError> {
        let mut words = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let content = line
                .split("//")
                .next()
                .and_then(|s| s.split('#').next())
                .unwrap_or_default()
                .trim();
            if content.is_empty() {
                continue;
            }
            let digits = content
                .strip_prefix("0x")
                .or_else(|| content.strip_prefix("0X"))
                .unwrap_or(content)
                .replace('_', "");
            let word =
                u32::from_str_radix(&digits, 16).map_err(|_| LoadError::InvalidHexWord {
                    line: index + 1,
                    text: content.to_owned(),
                })?;
            words.push(word);
        }
        Self::from_words(&words)
    }

    /// Copies a little-endian byte image into memory at byte `address`.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), LoadError> {
        let out_of_range = LoadError::OutOfRange {
            address,
            len: bytes.len(),
        };
        let end = (address as usize)
            .checked_add(bytes.len())
            .ok_or(out_of_range.clone())?;
        if end > SIZE as usize {
            return Err(out_of_range);
        }
        for (offset, byte) in bytes.iter().enumerate() {
            self.set_byte(address as usize + offset, *byte);
        }
        Ok(())
    }

    /// Fetches the word addressed by `pc`.
    ///
    /// Only bits `[9:2]` of `pc` select the word; higher bits wrap around and the two low bits
    /// are ignored.
    pub fn fetch(&self, pc: u32) -> u32 {
        self.words[(pc >> 2) as usize % LEN]
    }

    /// Copies bytes starting at `address` into `buf`, stopping at the end of memory.
    /// Returns the number of bytes read.
    pub fn read_bytes(&self, address: u32, buf: &mut [u8]) -> Result<usize, AccessError> {
        let start = address as usize;
        if start >= SIZE as usize {
            return Err(AccessError::OutOfRange(address));
        }
        let len = buf.len().min(SIZE as usize - start);
        for (offset, byte) in buf[..len].iter_mut().enumerate() {
            *byte = self.byte(start + offset);
        }
        Ok(len)
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..]
    }

    fn byte(&self, address: usize) -> u8 {
        self.words[address / 4].to_le_bytes()[address % 4]
    }

    fn set_byte(&mut self, address: usize, value: u8) {
        let word = &mut self.words[address / 4];
        let mut bytes = word.to_le_bytes();
        bytes[address % 4] = value;
        *word = u32::from_le_bytes(bytes);
    }
}
