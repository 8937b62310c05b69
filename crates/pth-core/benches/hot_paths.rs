use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pth_core::engine::Engine;
use pth_core::keycodes::{mt, KC_A, KC_K, MOD_LCTL};
use pth_core::predictor::{self, PredictionInputs};
use pth_core::{Host, KeyPos, KeyRecord, Settings, SideByte};

const PTH: KeyPos = KeyPos::new(0, 1);
const OTHER: KeyPos = KeyPos::new(0, 7);

struct NullHost {
    now: u16,
}

impl Host for NullHost {
    fn process_record(&mut self, record: &KeyRecord) {
        black_box(record);
    }
    fn register_code(&mut self, keycode: u16) {
        black_box(keycode);
    }
    fn unregister_code(&mut self, keycode: u16) {
        black_box(keycode);
    }
    fn send_report_and_wait(&mut self) {}
    fn timer_read(&self) -> u16 {
        self.now
    }
    fn side_at(&self, pos: KeyPos) -> SideByte {
        if pos.col < 5 {
            SideByte::L
        } else {
            SideByte::R
        }
    }
    fn keycode_at(&self, _layer: u8, _pos: KeyPos) -> u16 {
        KC_K
    }
    fn layer_for_position(&self, _pos: KeyPos) -> u8 {
        0
    }
    fn mods(&self) -> u8 {
        0
    }
}

fn make_engine() -> Engine<NullHost> {
    let mut engine = Engine::new(NullHost { now: 0 }, Settings::default());
    engine.post_init();
    engine
}

fn step(engine: &mut Engine<NullHost>, dt: u16, record: impl Fn(u16) -> KeyRecord) {
    let now = engine.host().now.wrapping_add(dt);
    engine.host_mut().now = now;
    engine.housekeeping_tick();
    black_box(engine.on_event(record(now)));
}

fn bench_solo_tap(c: &mut Criterion) {
    let mut engine = make_engine();
    let pth = mt(MOD_LCTL, KC_A);
    c.bench_function("engine/solo_tap", |b| {
        b.iter(|| {
            step(&mut engine, 200, |t| KeyRecord::press(PTH, pth, t));
            step(&mut engine, 60, |t| KeyRecord::release(PTH, pth, t));
        });
    });
}

fn bench_plain_passthrough(c: &mut Criterion) {
    let mut engine = make_engine();
    c.bench_function("engine/plain_key_passthrough", |b| {
        b.iter(|| {
            step(&mut engine, 100, |t| KeyRecord::press(OTHER, KC_K, t));
            step(&mut engine, 50, |t| KeyRecord::release(OTHER, KC_K, t));
        });
    });
}

fn bench_opposite_side_chord(c: &mut Criterion) {
    let mut engine = make_engine();
    let pth = mt(MOD_LCTL, KC_A);
    c.bench_function("engine/opposite_side_chord", |b| {
        b.iter(|| {
            step(&mut engine, 300, |t| KeyRecord::press(PTH, pth, t));
            step(&mut engine, 90, |t| KeyRecord::press(OTHER, KC_K, t));
            step(&mut engine, 40, |t| KeyRecord::release(OTHER, KC_K, t));
            step(&mut engine, 30, |t| KeyRecord::release(PTH, pth, t));
        });
    });
}

fn bench_trees(c: &mut Criterion) {
    let inputs = PredictionInputs {
        prev_press_to_pth_press_dur: 180,
        press_to_press_w_avg: 170.0,
        key_release_before_pth_to_pth_press_dur: 60,
        pth_press_to_second_press_dur: 90,
        second_press_to_third_press_dur: 70,
        down_count: 2,
        ..PredictionInputs::default()
    };
    c.bench_function("predictor/third_press", |b| {
        b.iter(|| predictor::hold_probability_when_third_press(black_box(&inputs)));
    });
    c.bench_function("predictor/min_overlap", |b| {
        b.iter(|| predictor::min_overlap_for_hold_ms(black_box(&inputs), 1.0, false));
    });
}

criterion_group!(
    benches,
    bench_solo_tap,
    bench_plain_passthrough,
    bench_opposite_side_chord,
    bench_trees
);
criterion_main!(benches);
