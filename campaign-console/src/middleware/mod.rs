pub mod guard;

pub use guard::{route_guard, GuardState};
