pub mod locale_handlers;

pub use locale_handlers::{add_missing, get_bundle, health, reload_bundle, translate};
