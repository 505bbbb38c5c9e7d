pub use early_stopping::*;
pub use store::*;

pub mod early_stopping;
pub mod store;
