pub mod completion;
pub mod dispatch;
pub mod route_stop;

pub use completion::*;
pub use dispatch::*;
pub use route_stop::*;
