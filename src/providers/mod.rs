pub mod ecb;
pub mod util;

pub use ecb::EcbArchiveProvider;
