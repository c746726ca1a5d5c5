pub mod health;

pub use health::{router, AppState};
