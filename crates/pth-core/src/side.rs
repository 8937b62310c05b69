//! Physical side of each key and the same-side rule.
//!
//! Every key carries a side byte. The low nibble holds two 2-bit atomic
//! sides: the role the key plays when it is the PTH (bits 2..3) and the
//! role it plays as any other key (bits 0..1). The high nibble is a free
//! user payload; the default prediction factor reads it as "make holds
//! 5/10/15 % harder".

use crate::error::LayoutError;
use crate::types::KeyPos;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AtomSide {
    Left = 0b00,
    Right = 0b01,
    /// Always on the other side of whatever it is compared with.
    Opposite = 0b10,
    /// Always on the same side as whatever it is compared with.
    Same = 0b11,
}

impl AtomSide {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => AtomSide::Left,
            0b01 => AtomSide::Right,
            0b10 => AtomSide::Opposite,
            _ => AtomSide::Same,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            AtomSide::Left => 'L',
            AtomSide::Right => 'R',
            AtomSide::Opposite => 'O',
            AtomSide::Same => 'S',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'L' => Some(AtomSide::Left),
            'R' => Some(AtomSide::Right),
            'O' => Some(AtomSide::Opposite),
            'S' => Some(AtomSide::Same),
            _ => None,
        }
    }
}

/// Encoded side of a key, including the user payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SideByte(pub u8);

impl SideByte {
    pub const L: SideByte = SideByte::encode(AtomSide::Left, AtomSide::Left);
    pub const LR: SideByte = SideByte::encode(AtomSide::Left, AtomSide::Right);
    pub const LO: SideByte = SideByte::encode(AtomSide::Left, AtomSide::Opposite);
    pub const LS: SideByte = SideByte::encode(AtomSide::Left, AtomSide::Same);
    pub const RL: SideByte = SideByte::encode(AtomSide::Right, AtomSide::Left);
    pub const R: SideByte = SideByte::encode(AtomSide::Right, AtomSide::Right);
    pub const RO: SideByte = SideByte::encode(AtomSide::Right, AtomSide::Opposite);
    pub const RS: SideByte = SideByte::encode(AtomSide::Right, AtomSide::Same);
    pub const OL: SideByte = SideByte::encode(AtomSide::Opposite, AtomSide::Left);
    pub const OR: SideByte = SideByte::encode(AtomSide::Opposite, AtomSide::Right);
    pub const O: SideByte = SideByte::encode(AtomSide::Opposite, AtomSide::Opposite);
    pub const OS: SideByte = SideByte::encode(AtomSide::Opposite, AtomSide::Same);
    pub const SL: SideByte = SideByte::encode(AtomSide::Same, AtomSide::Left);
    pub const SR: SideByte = SideByte::encode(AtomSide::Same, AtomSide::Right);
    pub const SO: SideByte = SideByte::encode(AtomSide::Same, AtomSide::Opposite);
    pub const S: SideByte = SideByte::encode(AtomSide::Same, AtomSide::Same);

    /// User payloads understood by the default prediction factor.
    pub const H5: u8 = 1 << 4;
    pub const H10: u8 = 2 << 4;
    pub const H15: u8 = 3 << 4;

    pub const fn encode(pth_role: AtomSide, other_role: AtomSide) -> Self {
        SideByte(((pth_role as u8 & 0b11) << 2) | (other_role as u8 & 0b11))
    }

    /// Same sides with the user payload `value` (0..=15) in the high nibble.
    pub const fn with_user_value(self, value: u8) -> Self {
        SideByte((self.0 & 0x0F) | ((value & 0x0F) << 4))
    }

    pub const fn pth_role(self) -> AtomSide {
        AtomSide::from_bits(self.0 >> 2)
    }

    pub const fn other_role(self) -> AtomSide {
        AtomSide::from_bits(self.0)
    }

    /// Payload bits in place (`0bvvvv_0000`).
    pub const fn user_bits(self) -> u8 {
        self.0 & 0xF0
    }

    pub const fn user_value(self) -> u8 {
        (self.0 >> 4) & 0x0F
    }

    pub const fn without_user_bits(self) -> Self {
        SideByte(self.0 & 0x0F)
    }
}

impl fmt::Display for SideByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pth = self.pth_role();
        let other = self.other_role();
        if pth == other {
            write!(f, "{}", pth.letter())?;
        } else {
            write!(f, "{}{}", pth.letter(), other.letter())?;
        }
        if self.user_value() != 0 {
            write!(f, "+{}", self.user_value())?;
        }
        Ok(())
    }
}

// Bit `(pth << 2) | other` is set when the two roles count as the same side.
const SAME_SIDE_TABLE: u16 = 0b1011_1000_1010_1001;

/// Resolves the roles of the PTH and another key. An opposite or same tag on
/// the other key wins over the PTH's tag; two absolute sides are compared.
pub const fn is_same_side(pth: AtomSide, other: AtomSide) -> bool {
    let index = ((pth as u8) << 2) | other as u8;
    (SAME_SIDE_TABLE >> index) & 1 == 1
}

/// Dense row-major side table. Built once, never resized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SideLayout {
    rows: u8,
    cols: u8,
    cells: Vec<SideByte>,
}

fn parse_cell(cell: &str, line: usize) -> Result<SideByte, LayoutError> {
    let (sides, value) = match cell.split_once('+') {
        Some((sides, value)) => {
            let value = value
                .parse::<u8>()
                .ok()
                .filter(|v| *v <= 15)
                .ok_or_else(|| LayoutError::InvalidUserValue {
                    line,
                    cell: cell.to_string(),
                })?;
            (sides, value)
        }
        None => (cell, 0),
    };

    let unknown = || LayoutError::UnknownSide {
        line,
        cell: cell.to_string(),
    };
    let mut letters = sides.chars().map(AtomSide::from_letter);
    let pth = letters.next().flatten().ok_or_else(unknown)?;
    let other = match letters.next() {
        None => pth,
        Some(side) => side.ok_or_else(unknown)?,
    };
    if letters.next().is_some() {
        return Err(unknown());
    }
    Ok(SideByte::encode(pth, other).with_user_value(value))
}

impl SideLayout {
    /// Parses one matrix row per line. Cells are separated by commas or
    /// whitespace; `;` and `#` start a comment.
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        let mut cells = Vec::new();
        let mut cols: Option<usize> = None;
        let mut rows = 0usize;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let content = raw.split([';', '#']).next().unwrap_or("");
            let row: Vec<&str> = content
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect();
            if row.is_empty() {
                continue;
            }
            match cols {
                None => cols = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(LayoutError::RaggedRow {
                        line: line_no,
                        expected,
                        found: row.len(),
                    })
                }
                _ => {}
            }
            for cell in row {
                cells.push(parse_cell(cell, line_no)?);
            }
            rows += 1;
        }

        let cols = cols.ok_or(LayoutError::Empty)?;
        if rows > u8::MAX as usize || cols > u8::MAX as usize {
            return Err(LayoutError::TooLarge);
        }
        Ok(Self {
            rows: rows as u8,
            cols: cols as u8,
            cells,
        })
    }

    /// Convenience for a layout given as one string per row.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self, LayoutError> {
        let text: Vec<&str> = lines.iter().map(|l| l.as_ref()).collect();
        Self::parse(&text.join("\n"))
    }

    pub const fn rows(&self) -> u8 {
        self.rows
    }

    pub const fn cols(&self) -> u8 {
        self.cols
    }

    pub fn get(&self, pos: KeyPos) -> Option<SideByte> {
        if pos.row >= self.rows || pos.col >= self.cols {
            return None;
        }
        self.cells
            .get(pos.row as usize * self.cols as usize + pos.col as usize)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(SideByte::L.0, 0b0000);
        assert_eq!(SideByte::LR.0, 0b0001);
        assert_eq!(SideByte::OS.0, 0b1011);
        assert_eq!(SideByte::S.0, 0b1111);
        let b = SideByte::RO.with_user_value(2);
        assert_eq!(b.0, SideByte::RO.0 | SideByte::H10);
        assert_eq!(b.pth_role(), AtomSide::Right);
        assert_eq!(b.other_role(), AtomSide::Opposite);
        assert_eq!(b.user_value(), 2);
        assert_eq!(b.user_bits(), 0x20);
        assert_eq!(b.without_user_bits(), SideByte::RO);
    }

    #[test]
    fn test_same_side_rules() {
        use AtomSide::*;
        assert!(is_same_side(Left, Left));
        assert!(!is_same_side(Left, Right));
        assert!(is_same_side(Right, Right));
        // other key's relative tag wins
        assert!(!is_same_side(Left, Opposite));
        assert!(is_same_side(Right, Same));
        assert!(!is_same_side(Same, Opposite));
        assert!(is_same_side(Opposite, Same));
        // then the PTH's relative tag
        assert!(!is_same_side(Opposite, Left));
        assert!(is_same_side(Same, Left));
        assert!(is_same_side(Same, Right));
        assert!(!is_same_side(Opposite, Opposite));
        assert!(is_same_side(Same, Same));
    }

    #[test]
    fn test_display() {
        assert_eq!(SideByte::L.to_string(), "L");
        assert_eq!(SideByte::LR.to_string(), "LR");
        assert_eq!(SideByte::S.with_user_value(3).to_string(), "S+3");
    }

    #[test]
    fn test_parse_layout() {
        let layout = SideLayout::parse(
            "# split 2x3\n\
             L, L+1, R ; thumbs follow\n\
             LO  S   R+15\n",
        )
        .unwrap();
        assert_eq!(layout.rows(), 2);
        assert_eq!(layout.cols(), 3);
        assert_eq!(layout.get(KeyPos::new(0, 1)), Some(SideByte::L.with_user_value(1)));
        assert_eq!(layout.get(KeyPos::new(1, 0)), Some(SideByte::LO));
        assert_eq!(layout.get(KeyPos::new(1, 2)), Some(SideByte::R.with_user_value(15)));
        assert_eq!(layout.get(KeyPos::new(2, 0)), None);
        assert_eq!(layout.get(KeyPos::new(0, 3)), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            SideLayout::parse("L, X"),
            Err(LayoutError::UnknownSide {
                line: 1,
                cell: "X".into()
            })
        );
        assert_eq!(
            SideLayout::parse("L, LRO"),
            Err(LayoutError::UnknownSide {
                line: 1,
                cell: "LRO".into()
            })
        );
        assert_eq!(
            SideLayout::parse("L+16"),
            Err(LayoutError::InvalidUserValue {
                line: 1,
                cell: "L+16".into()
            })
        );
        assert_eq!(
            SideLayout::parse("L R\n\nL"),
            Err(LayoutError::RaggedRow {
                line: 3,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(SideLayout::parse("; nothing\n"), Err(LayoutError::Empty));
    }
}
