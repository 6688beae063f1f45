pub mod fund;
pub mod progress;
pub mod response;

pub use fund::*;
pub use progress::*;
pub use response::*;
