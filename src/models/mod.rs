pub mod enums;
pub mod log_entry;
pub mod patient;
pub mod user;
pub mod visit;

pub use enums::*;
pub use log_entry::*;
pub use patient::*;
pub use user::*;
pub use visit::*;
