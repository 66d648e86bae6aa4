pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod polling;
pub mod progress;
pub mod traits;
