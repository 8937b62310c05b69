pub mod alt_tab;
pub mod config;
pub mod deferred_taps;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod keycodes;
pub mod predictor;
pub mod release_buffer;
pub mod side;
pub mod timing;
pub mod types;

pub use alt_tab::AltTab;
pub use config::Settings;
pub use engine::Engine;
pub use error::{ConfigError, KeycodeError, LayoutError};
pub use hooks::Hooks;
pub use host::Host;
pub use side::{AtomSide, SideByte, SideLayout};
pub use types::{EventKind, KeyAction, KeyPos, KeyRecord, Status};
