use crate::host::{HidAction, SimHost};
use crate::trace::Trace;
use anyhow::Result;
use pth_core::{AltTab, Engine, Host, KeyAction, KeyPos, KeyRecord, Settings};
use std::collections::HashMap;
use tracing::{debug, info};

/// Engine decisions keep running for this long after the last event so
/// that trailing timeouts fire.
const TAIL_MS: u32 = 1000;

/// Runs a trace through a fresh engine and returns the HID actions in order.
pub fn run(trace: &Trace, settings: Settings) -> Result<Vec<HidAction>> {
    let sides = trace.side_layout()?;
    let keymap = trace.parse_keymap()?;
    let alt_tab = settings.alt_tab_layer.map(AltTab::new);
    let mut engine = Engine::new(SimHost::new(sides, keymap, alt_tab), settings);
    engine.post_init();

    let mut clock: u32 = 0;
    // keycode each held position was pressed with, like the firmware's
    // source-layer cache
    let mut pressed_with: HashMap<KeyPos, u16> = HashMap::new();

    for event in &trace.events {
        advance(&mut engine, &mut clock, event.t);
        let pos = event.pos();
        let record = if event.down {
            let keycode = engine.host().resolve(pos);
            pressed_with.insert(pos, keycode);
            KeyRecord::press(pos, keycode, clock as u16)
        } else {
            let keycode = pressed_with.remove(&pos).unwrap_or_else(|| engine.host().resolve(pos));
            KeyRecord::release(pos, keycode, clock as u16)
        };

        let action = engine.on_event(record);
        debug!("{} -> {:?} ({})", record.pos, action, engine.status());
        if action == KeyAction::Pass {
            engine.host_mut().process_record(&record);
        }
    }

    let end = clock.saturating_add(TAIL_MS);
    advance(&mut engine, &mut clock, end);
    info!("replayed {} events, engine ended {}", trace.events.len(), engine.status());
    Ok(engine.into_host().take_actions())
}

fn advance(engine: &mut Engine<SimHost>, clock: &mut u32, until: u32) {
    while *clock < until {
        *clock += 1;
        engine.host_mut().set_now(*clock as u16);
        engine.housekeeping_tick();
    }
}
