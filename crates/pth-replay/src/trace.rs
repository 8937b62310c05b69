use anyhow::{bail, Context, Result};
use pth_core::keycodes::{self, KC_NO, KC_TRNS};
use pth_core::{KeyPos, SideLayout};
use serde::Deserialize;
use std::path::Path;

/// A recorded typing session plus the keyboard it was typed on.
#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    /// Side layout text, one matrix row per line.
    pub layout: Vec<String>,
    /// Layers, each a list of rows of keycode expressions.
    pub keymap: Vec<Vec<Vec<String>>>,
    pub events: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TraceEvent {
    /// Milliseconds since the start of the trace.
    pub t: u32,
    pub row: u8,
    pub col: u8,
    pub down: bool,
}

impl TraceEvent {
    pub fn pos(&self) -> KeyPos {
        KeyPos::new(self.row, self.col)
    }
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let trace: Trace = serde_json::from_str(text)?;
        let mut last = 0;
        for (i, event) in trace.events.iter().enumerate() {
            if event.t < last {
                bail!("event {} at {} ms goes back in time (previous at {} ms)", i, event.t, last);
            }
            last = event.t;
        }
        Ok(trace)
    }

    pub fn side_layout(&self) -> Result<SideLayout> {
        SideLayout::from_lines(&self.layout).context("side layout")
    }

    pub fn parse_keymap(&self) -> Result<Keymap> {
        let mut layers = Vec::with_capacity(self.keymap.len());
        for (l, layer) in self.keymap.iter().enumerate() {
            let mut rows = Vec::with_capacity(layer.len());
            for (r, row) in layer.iter().enumerate() {
                let codes = row
                    .iter()
                    .enumerate()
                    .map(|(c, expr)| {
                        parse_cell(expr).with_context(|| format!("keymap layer {} row {} col {}", l, r, c))
                    })
                    .collect::<Result<Vec<u16>>>()?;
                rows.push(codes);
            }
            layers.push(rows);
        }
        if layers.is_empty() {
            bail!("keymap has no layers");
        }
        Ok(Keymap { layers })
    }
}

fn parse_cell(expr: &str) -> Result<u16> {
    match expr.trim() {
        "_______" => Ok(KC_TRNS),
        "XXXXXXX" => Ok(KC_NO),
        other => Ok(keycodes::parse_keycode(other)?),
    }
}

#[derive(Debug, Clone)]
pub struct Keymap {
    layers: Vec<Vec<Vec<u16>>>,
}

impl Keymap {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// `KC_NO` outside the defined area.
    pub fn get(&self, layer: u8, pos: KeyPos) -> u16 {
        self.layers
            .get(layer as usize)
            .and_then(|rows| rows.get(pos.row as usize))
            .and_then(|row| row.get(pos.col as usize))
            .copied()
            .unwrap_or(KC_NO)
    }
}
