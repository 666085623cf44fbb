//! # Byte and word swapping for register pairs
//!
//! Devices disagree on how a 32-bit quantity is laid across two 16-bit registers. The
//! wire always carries each register big-endian; what varies is whether the bytes inside
//! each register and/or the two registers themselves are exchanged.
//!
//! ## Naming Convention
//!
//! ABCD notation, A = most significant byte of the value. For `0x12345678` read as
//! registers `[0x1234, 0x5678]`:
//!
//! | Mode | Pattern | Bytes |
//! |------|---------|-------|
//! | `None` | ABCD | \[0x12, 0x34, 0x56, 0x78\] |
//! | `SwapBytes` | BADC | \[0x34, 0x12, 0x78, 0x56\] |
//! | `SwapWords` | CDAB | \[0x56, 0x78, 0x12, 0x34\] |
//! | `SwapBoth` | DCBA | \[0x78, 0x56, 0x34, 0x12\] |

use std::fmt;

/// One of the four independently selectable swap configurations.
///
/// # Example
///
/// ```rust
/// use modbus_station::SwapMode;
///
/// let mode = SwapMode::from_str("CDAB").unwrap();
/// assert_eq!(mode, SwapMode::SwapWords);
/// assert!(mode.swaps_words());
/// assert!(!mode.swaps_bytes());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapMode {
    /// ABCD, registers taken as they arrive
    #[default]
    None,
    /// BADC, bytes exchanged inside each register
    SwapBytes,
    /// CDAB, the two registers exchanged
    SwapWords,
    /// DCBA, both exchanges applied
    SwapBoth,
}

impl SwapMode {
    pub const ALL: [SwapMode; 4] = [
        SwapMode::None,
        SwapMode::SwapBytes,
        SwapMode::SwapWords,
        SwapMode::SwapBoth,
    ];

    pub fn from_flags(swap_bytes: bool, swap_words: bool) -> Self {
        match (swap_bytes, swap_words) {
            (false, false) => Self::None,
            (true, false) => Self::SwapBytes,
            (false, true) => Self::SwapWords,
            (true, true) => Self::SwapBoth,
        }
    }

    #[inline]
    pub fn swaps_bytes(self) -> bool {
        matches!(self, Self::SwapBytes | Self::SwapBoth)
    }

    #[inline]
    pub fn swaps_words(self) -> bool {
        matches!(self, Self::SwapWords | Self::SwapBoth)
    }

    /// Parse a byte pattern or mode name.
    ///
    /// - "ABCD", "NONE" → None
    /// - "BADC", "SWAP_BYTES", "BYTE_SWAP" → SwapBytes
    /// - "CDAB", "SWAP_WORDS", "WORD_SWAP" → SwapWords
    /// - "DCBA", "SWAP_BOTH", "BOTH" → SwapBoth
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_' && *c != ' ')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "ABCD" | "NONE" | "NOSWAP" => Some(Self::None),
            "BADC" | "SWAPBYTES" | "BYTESWAP" => Some(Self::SwapBytes),
            "CDAB" | "SWAPWORDS" | "WORDSWAP" => Some(Self::SwapWords),
            "DCBA" | "SWAPBOTH" | "BOTH" => Some(Self::SwapBoth),
            _ => None,
        }
    }

    pub fn pattern(self) -> &'static str {
        match self {
            Self::None => "ABCD",
            Self::SwapBytes => "BADC",
            Self::SwapWords => "CDAB",
            Self::SwapBoth => "DCBA",
        }
    }

    #[inline]
    pub fn apply(self, bytes: [u8; 4]) -> [u8; 4] {
        apply_swap(bytes, self.swaps_bytes(), self.swaps_words())
    }
}

impl fmt::Display for SwapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "no swap",
            Self::SwapBytes => "swap bytes",
            Self::SwapWords => "swap words",
            Self::SwapBoth => "swap both",
        };
        write!(f, "{} ({})", self.pattern(), name)
    }
}

/// Permute a 4-byte buffer.
///
/// `swap_bytes` exchanges bytes 0↔1 and 2↔3; `swap_words` exchanges bytes 0↔2 and 1↔3.
/// The two permutations commute and each is its own inverse, so applying the same
/// configuration twice restores the input.
#[inline]
pub fn apply_swap(bytes: [u8; 4], swap_bytes: bool, swap_words: bool) -> [u8; 4] {
    let [a, b, c, d] = bytes;
    let [a, b, c, d] = if swap_bytes { [b, a, d, c] } else { [a, b, c, d] };
    if swap_words {
        [c, d, a, b]
    } else {
        [a, b, c, d]
    }
}

/// Two registers as they arrive on the wire, big-endian each.
#[inline]
pub fn regs_to_bytes(regs: [u16; 2]) -> [u8; 4] {
    let [h0, h1] = [regs[0].to_be_bytes(), regs[1].to_be_bytes()];
    [h0[0], h0[1], h1[0], h1[1]]
}

#[inline]
pub fn bytes_to_regs(bytes: [u8; 4]) -> [u16; 2] {
    [
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
    ]
}
