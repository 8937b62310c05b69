//! The predictive tap-hold state machine.
//!
//! A tap-hold key pressed while idle becomes the PTH. Subsequent events are
//! held back (releases) or deferred (presses) until the engine commits to
//! tap or hold, then replayed to the host in an order consistent with that
//! decision.

use crate::config::Settings;
use crate::deferred_taps::DeferredTapSet;
use crate::hooks::Hooks;
use crate::host::Host;
use crate::keycodes::{self, KC_NO};
use crate::predictor::PredictionInputs;
use crate::release_buffer::{ReleaseBuffer, ReleaseTime};
use crate::side::{self, AtomSide, SideByte};
use crate::timing::{Timer, TimingLedger, MAX_DUR};
use crate::types::{EventKind, KeyAction, KeyRecord, Status};
use tracing::{debug, trace, warn};

/// How a stored record is re-tagged before being submitted.
#[derive(Debug, Clone, Copy)]
enum Emit {
    Tap,
    Hold,
    AsIs,
}

fn prepare(record: &mut KeyRecord, pressed: bool, emit: Emit) -> KeyRecord {
    match emit {
        Emit::Tap => record.set_tap(),
        Emit::Hold => record.set_hold(),
        Emit::AsIs => {}
    }
    record.pressed = pressed;
    *record
}

#[derive(Debug, Clone, Copy, Default)]
struct PthState {
    keycode: u16,
    record: KeyRecord,
    timer: Timer,
    side: SideByte,
    substitute: u16,
    held_instantly: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct SecondState {
    present: bool,
    keycode: u16,
    record: KeyRecord,
    timer: Timer,
    is_tap_hold: bool,
    same_side: bool,
    to_be_released: bool,
    held_instantly: bool,
}

pub struct Engine<H: Host> {
    host: H,
    settings: Settings,
    hooks: Hooks<H>,

    status: Status,
    prev_status: Status,
    ledger: TimingLedger,
    releases: ReleaseBuffer,
    deferred: DeferredTapSet,

    pth: PthState,
    second: SecondState,
    inputs: PredictionInputs,

    timeout_for_forcing_choice: u16,
    has_chosen_after_timeout: bool,
    min_overlap_for_hold: u16,
    instant_layer_active: bool,
    layer_before_instant_layer_tap: u8,

    prev_press_keycode: u16,
    cur_press_keycode: u16,
    processing_internal: bool,
}

impl<H: Host> Engine<H> {
    pub fn new(host: H, settings: Settings) -> Self {
        Self {
            host,
            settings,
            hooks: Hooks::default(),
            status: Status::Idle,
            prev_status: Status::Idle,
            ledger: TimingLedger::new(),
            releases: ReleaseBuffer::new(),
            deferred: DeferredTapSet::new(),
            pth: PthState::default(),
            second: SecondState::default(),
            inputs: PredictionInputs::default(),
            timeout_for_forcing_choice: 0,
            has_chosen_after_timeout: false,
            min_overlap_for_hold: 0,
            instant_layer_active: false,
            layer_before_instant_layer_tap: 0,
            prev_press_keycode: KC_NO,
            cur_press_keycode: KC_NO,
            processing_internal: false,
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks<H>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Seeds the timing history as if nothing had been typed for a while.
    /// Call once before the first event.
    pub fn post_init(&mut self) {
        let now = self.host.timer_read();
        self.ledger.seed(now);
        debug!("engine initialised at {} ms", now);
    }

    /// Entry point for every key event. `Pass` tells the host to continue
    /// processing the record itself; `Block` means the engine consumed it.
    pub fn on_event(&mut self, mut record: KeyRecord) -> KeyAction {
        let keycode = record.keycode;
        if self.processing_internal
            || record.kind == EventKind::Combo
            || keycodes::is_tap_dance(keycode)
            || self.host.tapping_term(keycode, &record) != 0
        {
            return KeyAction::Pass;
        }

        let now = self.host.timer_read();
        let pressed = record.pressed;
        self.ledger.observe(pressed, now);

        if self.settings.debug {
            debug!(
                "{} {} at {} [{}] status={}",
                if pressed { "press" } else { "release" },
                keycodes::keycode_name(keycode),
                record.pos,
                now,
                self.status
            );
        }

        if pressed {
            self.prev_press_keycode = self.cur_press_keycode;
            self.cur_press_keycode = keycode;
        } else if self.deferred.take(record.pos) {
            if self.status.is_undecided() {
                record.set_tap();
            } else {
                trace!("deferred tap release at {}", record.pos);
                self.submit(prepare(&mut record, false, Emit::Tap));
                return KeyAction::Block;
            }
        }

        let is_tap_hold = keycodes::is_tap_hold(keycode);
        let is_pth = record.pos == self.pth.record.pos;
        match self.status {
            Status::Idle => {
                if pressed && is_tap_hold {
                    return self.on_pth_press(record, now);
                }
            }
            Status::Pressed => {
                return if pressed {
                    self.on_second_press(record, is_tap_hold, now)
                } else {
                    self.on_release_before_second(record)
                };
            }
            Status::SecondPressed => {
                return if pressed {
                    self.on_third_press(record, is_tap_hold, now)
                } else {
                    self.on_release_after_second(record, now)
                };
            }
            Status::DecidedTap => {
                if pressed && is_tap_hold {
                    self.press_as_deferred_tap(record);
                    return KeyAction::Block;
                }
                if !pressed && is_pth {
                    self.host.send_report_and_wait();
                    self.emit_pth(false, Emit::Tap);
                    self.reset();
                    return KeyAction::Block;
                }
            }
            Status::DecidedHold => {
                if pressed && is_tap_hold {
                    self.press_during_hold(record);
                    return KeyAction::Block;
                }
                if !pressed && is_pth {
                    self.unregister_pth_hold();
                    self.reset();
                    return KeyAction::Block;
                }
            }
        }

        // the second's press may have been replayed just now
        if !pressed && !self.second.held_instantly && record.pos == self.second.record.pos {
            self.host.send_report_and_wait();
        }
        KeyAction::Pass
    }

    /// Saturates timers and fires time-based decisions. Call every scan.
    pub fn housekeeping_tick(&mut self) {
        let now = self.host.timer_read();
        self.ledger.tick(now);

        if !self.status.is_undecided() {
            return;
        }

        if self.status == Status::SecondPressed && !self.second.timer.max_reached() {
            let held = self.second.timer.raw_elapsed(now);
            if self.min_overlap_for_hold > 0 && held >= self.min_overlap_for_hold {
                debug!("overlap of {} ms reached, hold", held);
                self.make_decision_hold();
                return;
            }
            self.second.timer.saturate_if_due(now);
        }

        if !self.pth.timer.max_reached() {
            let elapsed = self.pth.timer.raw_elapsed(now);
            if elapsed >= MAX_DUR {
                self.pth.timer.saturate_if_due(now);
            } else if !self.has_chosen_after_timeout
                && self.timeout_for_forcing_choice > 0
                && elapsed >= self.timeout_for_forcing_choice
            {
                debug!("PTH held for {} ms, forcing a choice", elapsed);
                self.apply_forced_choice();
            }
        }
    }

    fn on_pth_press(&mut self, record: KeyRecord, now: u16) -> KeyAction {
        self.status = Status::Pressed;
        self.pth.timer.restart(now);
        self.pth.keycode = record.keycode;
        self.pth.record = record;
        self.pth.side = (self.hooks.side_of)(self, &record);

        let snapshot = self.ledger.snapshot_for_pth(now);
        self.inputs = PredictionInputs::from_snapshot(&snapshot);
        self.pth.substitute = (self.hooks.code_to_be_registered_instead_when_hold_chosen)(self);
        self.timeout_for_forcing_choice = (self.hooks.timeout_for_forcing_choice)(self);
        debug!(
            "PTH {} at {} side={} p2p={}",
            keycodes::keycode_name(record.keycode),
            record.pos,
            self.pth.side,
            snapshot.prev_press_to_pth_press_dur
        );

        if self.timeout_for_forcing_choice == 0 {
            self.apply_forced_choice();
            if self.status != Status::Pressed {
                return KeyAction::Block;
            }
        }

        if self.settings.fast_streak_tap_enable && (self.hooks.predict_fast_streak_tap)(self) {
            debug!("fast streak, tap");
            if self.settings.fast_streak_tap_reset_immediately {
                self.emit_pth(true, Emit::Tap);
                self.deferred.add(self.pth.record.pos);
                self.reset();
            } else {
                self.make_decision_tap();
            }
            return KeyAction::Block;
        }

        self.pth.held_instantly = self.pth.substitute == KC_NO
            && (self.hooks.should_hold_instantly)(self, record.keycode, &record);
        if self.pth.held_instantly {
            if keycodes::is_layer_tap(record.keycode) {
                self.instant_layer_active = true;
                self.layer_before_instant_layer_tap = self.host.layer_for_position(record.pos);
            }
            trace!("holding PTH instantly");
            self.emit_pth(true, Emit::Hold);
        }
        KeyAction::Block
    }

    fn on_second_press(&mut self, record: KeyRecord, is_tap_hold: bool, now: u16) -> KeyAction {
        self.status = Status::SecondPressed;
        self.second = SecondState {
            present: true,
            keycode: record.keycode,
            record,
            timer: Timer::started_at(now),
            is_tap_hold,
            ..SecondState::default()
        };
        self.second.same_side = self.is_same_side_as_pth(&record);
        self.inputs.pth_press_to_second_press_dur = self.pth.timer.elapsed(now);
        debug!(
            "second {} after {} ms, same side: {}",
            keycodes::keycode_name(record.keycode),
            self.inputs.pth_press_to_second_press_dur,
            self.second.same_side
        );

        // nothing mapped on the instantly activated layer
        if self.pth.held_instantly && self.instant_layer_active && record.keycode == KC_NO {
            self.choose_tap();
            return KeyAction::Block;
        }

        if is_tap_hold || !self.second.same_side {
            let predicted = (self.hooks.predict_min_overlap_for_hold_ms)(self);
            self.min_overlap_for_hold = self.settings.clamp_overlap(predicted);
            trace!("min overlap for hold {} ms (predicted {})", self.min_overlap_for_hold, predicted);
        }

        if !self.second.same_side {
            return KeyAction::Block;
        }

        if (self.hooks.should_choose_tap_when_second_is_same_side_press)(self) {
            self.choose_tap();
            return KeyAction::Block;
        }

        // an earlier release of this position must reach the host first
        if is_tap_hold
            && !self.releases.contains(record.pos)
            && (self.hooks.second_should_hold_instantly)(self, record.keycode, &record)
        {
            if !self.instant_layer_active && keycodes::is_layer_tap(record.keycode) {
                self.layer_before_instant_layer_tap = self.host.layer_for_position(record.pos);
                self.instant_layer_active = true;
            }
            self.second.held_instantly = true;
            self.emit_second(true, Emit::Hold);
        }
        KeyAction::Block
    }

    fn on_release_before_second(&mut self, record: KeyRecord) -> KeyAction {
        if record.pos == self.pth.record.pos {
            debug!("PTH released alone, tap");
            self.make_decision_tap();
            self.host.send_report_and_wait();
            self.emit_pth(false, Emit::Tap);
            self.reset();
        } else {
            self.cache_release(record, ReleaseTime::BeforeSecond);
        }
        KeyAction::Block
    }

    fn on_third_press(&mut self, mut record: KeyRecord, is_tap_hold: bool, now: u16) -> KeyAction {
        self.inputs.second_press_to_third_press_dur = self.second.timer.elapsed(now);
        let hold = (self.hooks.predict_hold_when_third_press)(self);
        debug!(
            "third {} after {} ms, prediction: {}",
            keycodes::keycode_name(record.keycode),
            self.inputs.second_press_to_third_press_dur,
            if hold { "hold" } else { "tap" }
        );

        let mut third_is_tap_hold = is_tap_hold;
        if hold {
            self.make_decision_hold();
        } else {
            self.make_decision_tap();
            if self.instant_layer_active {
                record.keycode = self.host.keycode_at(self.layer_before_instant_layer_tap, record.pos);
                third_is_tap_hold = keycodes::is_tap_hold(record.keycode);
            }
        }

        if !third_is_tap_hold {
            self.submit(record);
        } else if hold {
            self.press_during_hold(record);
        } else {
            self.press_as_deferred_tap(record);
        }

        if self.settings.reset_immediately_when_tap_chosen && !hold {
            self.deferred.add(self.pth.record.pos);
            self.reset();
        }
        KeyAction::Block
    }

    fn on_release_after_second(&mut self, record: KeyRecord, now: u16) -> KeyAction {
        if record.pos == self.pth.record.pos {
            self.inputs.second_to_be_released = self.second.to_be_released;
            let hold = if self.second.same_side {
                false
            } else if self.second.to_be_released {
                (self.hooks.predict_hold_when_pth_release_after_second_release)(self)
            } else {
                (self.hooks.predict_hold_when_pth_release_after_second_press)(self)
            };
            debug!("PTH released after second, prediction: {}", if hold { "hold" } else { "tap" });

            if hold {
                self.make_decision_hold();
                self.unregister_pth_hold();
            } else {
                self.make_decision_tap();
                self.host.send_report_and_wait();
                self.emit_pth(false, Emit::Tap);
            }
            self.reset();
            return KeyAction::Block;
        }

        if record.pos == self.second.record.pos {
            self.second.to_be_released = true;
            self.inputs.second_to_be_released = true;

            if self.second.same_side && (self.hooks.should_choose_tap_when_second_is_same_side_release)(self) {
                self.choose_tap();
                return KeyAction::Block;
            }

            self.inputs.pth_press_to_second_release_dur = self.pth.timer.elapsed(now);
            self.inputs.second_dur = self.second.timer.elapsed(now);
            trace!(
                "second released after {} ms, {} ms after PTH press",
                self.inputs.second_dur,
                self.inputs.pth_press_to_second_release_dur
            );
            return KeyAction::Block;
        }

        self.cache_release(record, ReleaseTime::AfterSecond);
        KeyAction::Block
    }

    /// Commits to tap and, when configured, returns to idle right away.
    fn choose_tap(&mut self) {
        self.make_decision_tap();
        if self.settings.reset_immediately_when_tap_chosen {
            self.deferred.add(self.pth.record.pos);
            self.reset();
        }
    }

    fn apply_forced_choice(&mut self) {
        self.has_chosen_after_timeout = true;
        match (self.hooks.forced_choice_after_timeout)(self) {
            Status::DecidedHold => {
                debug!("forced choice: hold");
                self.make_decision_hold();
            }
            Status::DecidedTap => {
                debug!("forced choice: tap");
                self.choose_tap();
            }
            _ => trace!("forced choice: none"),
        }
    }

    fn needs_neutralizing(&self, held_instantly: bool, keycode: u16) -> bool {
        held_instantly
            && keycodes::is_mod_tap(keycode)
            && (self.hooks.should_neutralize_mods)(self, keycodes::mod_tap_mods(keycode))
    }

    fn make_decision_tap(&mut self) {
        if self.status.is_decided() {
            return;
        }
        self.status = Status::DecidedTap;
        debug!("decided tap for {}", keycodes::keycode_name(self.pth.keycode));

        if self.needs_neutralizing(self.pth.held_instantly, self.pth.keycode)
            || self.needs_neutralizing(self.second.held_instantly, self.second.keycode)
        {
            self.host.tap_code(self.settings.instant_mod_tap_suppression_key);
        }

        if self.pth.held_instantly {
            if keycodes::is_layer_tap(self.pth.keycode) && self.second.present {
                self.resolve_second_on(self.layer_before_instant_layer_tap);
            }
            self.emit_pth(false, Emit::Hold);
        }
        if self.second.held_instantly {
            self.emit_second(false, Emit::Hold);
        }

        self.emit_pth(true, Emit::Tap);
        self.flush_releases(ReleaseTime::BeforeSecond, true);

        if !self.second.present {
            return;
        }
        if self.second.is_tap_hold {
            if !self.second.to_be_released {
                self.deferred.add(self.second.record.pos);
            }
            self.second.record.set_tap();
        }
        self.replay_second();
    }

    fn make_decision_hold(&mut self) {
        if self.status.is_decided() {
            return;
        }
        self.status = Status::DecidedHold;
        debug!("decided hold for {}", keycodes::keycode_name(self.pth.keycode));

        if !self.pth.held_instantly {
            self.register_pth_hold();
        }
        self.flush_releases(ReleaseTime::BeforeSecond, self.pth.held_instantly);

        if !self.second.present {
            return;
        }
        if !self.second.held_instantly {
            if self.second.is_tap_hold {
                let record = self.second.record;
                if self.second.same_side
                    && (self.hooks.should_register_as_hold_when_same_side)(self, self.second.keycode, &record)
                {
                    self.second.record.set_hold();
                } else {
                    if !self.second.to_be_released {
                        self.deferred.add(self.second.record.pos);
                    }
                    self.second.record.set_tap();
                }
            }
            self.emit_second(true, Emit::AsIs);
        }
        let waited = self.flush_releases(ReleaseTime::AfterSecond, self.second.held_instantly);
        if self.second.to_be_released {
            if !waited {
                self.host.send_report_and_wait();
            }
            self.emit_second(false, Emit::AsIs);
        }
    }

    /// Presses the second as already tagged, replays what was released after
    /// it, and releases it if it is already up.
    fn replay_second(&mut self) {
        self.emit_second(true, Emit::AsIs);
        let waited = self.flush_releases(ReleaseTime::AfterSecond, true);
        if self.second.to_be_released {
            if !waited {
                self.host.send_report_and_wait();
            }
            self.emit_second(false, Emit::AsIs);
        }
    }

    fn register_pth_hold(&mut self) {
        if self.pth.substitute != KC_NO {
            self.host.register_code(self.pth.substitute);
            return;
        }
        self.emit_pth(true, Emit::Hold);
        if self.second.present && !self.second.held_instantly && keycodes::is_layer_tap(self.pth.keycode) {
            self.resolve_second_on(keycodes::layer_tap_layer(self.pth.keycode));
        }
    }

    fn unregister_pth_hold(&mut self) {
        if self.pth.substitute != KC_NO {
            self.host.unregister_code(self.pth.substitute);
        } else {
            self.emit_pth(false, Emit::Hold);
        }
    }

    /// Looks the second key up again once the active layer is known.
    fn resolve_second_on(&mut self, layer: u8) {
        let keycode = self.host.keycode_at(layer, self.second.record.pos);
        trace!(
            "second re-resolved on layer {}: {}",
            layer,
            keycodes::keycode_name(keycode)
        );
        self.second.keycode = keycode;
        self.second.record.keycode = keycode;
        self.second.is_tap_hold = keycodes::is_tap_hold(keycode);
    }

    fn press_as_deferred_tap(&mut self, mut record: KeyRecord) {
        self.deferred.add(record.pos);
        self.submit(prepare(&mut record, true, Emit::Tap));
    }

    /// A tap-hold pressed while the PTH is held: same-side keys may hold too
    /// (stacked modifiers), the rest tap.
    fn press_during_hold(&mut self, mut record: KeyRecord) {
        if self.is_same_side_as_pth(&record)
            && (self.hooks.should_register_as_hold_when_same_side)(self, record.keycode, &record)
        {
            self.submit(prepare(&mut record, true, Emit::Hold));
        } else {
            self.press_as_deferred_tap(record);
        }
    }

    fn cache_release(&mut self, record: KeyRecord, when: ReleaseTime) {
        if let Err(record) = self.releases.cache(record, when) {
            warn!("release buffer full, replaying {} immediately", record.pos);
            self.submit(record);
        }
    }

    /// Replays cached releases of one group. Returns whether a report gap
    /// separates the last emitted press from what follows.
    fn flush_releases(&mut self, when: ReleaseTime, wait_before_first: bool) -> bool {
        if self.releases.count(when) == 0 {
            return false;
        }
        let mut waited = !wait_before_first;
        for record in self.releases.drain(when) {
            if !waited {
                self.host.send_report_and_wait();
                waited = true;
            }
            self.submit(record);
        }
        waited
    }

    fn emit_pth(&mut self, pressed: bool, emit: Emit) {
        let record = prepare(&mut self.pth.record, pressed, emit);
        self.submit(record);
    }

    fn emit_second(&mut self, pressed: bool, emit: Emit) {
        let record = prepare(&mut self.second.record, pressed, emit);
        self.submit(record);
    }

    fn submit(&mut self, mut record: KeyRecord) {
        record.time = self.host.timer_read();
        self.processing_internal = true;
        self.host.process_record(&record);
        self.processing_internal = false;
    }

    fn is_same_side_as_pth(&self, record: &KeyRecord) -> bool {
        let other = (self.hooks.side_of)(self, record);
        side::is_same_side(self.pth.side.pth_role(), other.other_role())
    }

    fn reset(&mut self) {
        trace!("reset from {}", self.status);
        self.prev_status = self.status;
        self.status = Status::Idle;
        self.pth = PthState::default();
        self.second = SecondState::default();
        self.has_chosen_after_timeout = false;
        self.min_overlap_for_hold = 0;
        self.instant_layer_active = false;
        self.layer_before_instant_layer_tap = 0;
        self.timeout_for_forcing_choice = 0;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Status at the moment of the last reset.
    pub fn prev_status(&self) -> Status {
        self.prev_status
    }

    pub fn has_second(&self) -> bool {
        self.second.present
    }

    pub fn prev_press_to_pth_press_dur(&self) -> i16 {
        self.inputs.prev_press_to_pth_press_dur
    }

    pub fn pth_atomic_side(&self) -> AtomSide {
        self.pth.side.pth_role()
    }

    /// High nibble of the PTH's side byte, unshifted.
    pub fn pth_side_user_bits(&self) -> u8 {
        self.pth.side.user_bits()
    }

    pub fn is_second_same_side_as_pth(&self) -> bool {
        self.second.same_side
    }

    pub fn pth_record(&self) -> &KeyRecord {
        &self.pth.record
    }

    pub fn second_record(&self) -> &KeyRecord {
        &self.second.record
    }

    pub fn pth_keycode(&self) -> u16 {
        self.pth.keycode
    }

    pub fn second_keycode(&self) -> u16 {
        self.second.keycode
    }

    pub fn prev_press_keycode(&self) -> u16 {
        self.prev_press_keycode
    }

    /// The second key as it would resolve without the PTH's layer. `KC_NO`
    /// unless the PTH is an instantly held layer-tap.
    pub fn second_keycode_on_same_layer_as_pth(&self) -> u16 {
        if self.pth.held_instantly
            && keycodes::is_layer_tap(self.pth.keycode)
            && self.instant_layer_active
            && self.second.present
        {
            self.host
                .keycode_at(self.layer_before_instant_layer_tap, self.second.record.pos)
        } else {
            KC_NO
        }
    }

    pub fn is_second_tap_hold(&self) -> bool {
        self.second.is_tap_hold
    }

    pub fn is_processing_internal(&self) -> bool {
        self.processing_internal
    }

    pub fn down_count(&self) -> u8 {
        self.ledger.down_count()
    }

    pub fn min_overlap_for_hold(&self) -> u16 {
        self.min_overlap_for_hold
    }

    /// Current predictor inputs with the live down count.
    pub fn prediction_inputs(&self) -> PredictionInputs {
        PredictionInputs {
            down_count: self.ledger.down_count(),
            ..self.inputs
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn hooks(&self) -> &Hooks<H> {
        &self.hooks
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }
}

impl<H: Host + std::fmt::Debug> std::fmt::Debug for Engine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status)
            .field("pth", &self.pth)
            .field("second", &self.second)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
