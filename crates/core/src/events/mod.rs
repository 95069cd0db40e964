pub mod bus;
pub mod event;
pub mod reporter;

pub use bus::*;
pub use event::*;
pub use reporter::*;
