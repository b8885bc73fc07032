pub mod alert;
pub mod opportunity;
pub mod quote;

pub use alert::*;
pub use opportunity::*;
pub use quote::*;
