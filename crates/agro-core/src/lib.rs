pub mod error;
pub mod features;
pub mod forecast;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use features::*;
pub use forecast::*;
pub use traits::*;
pub use types::*;
