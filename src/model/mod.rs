pub mod alert;
pub mod sample;
pub mod tick;

pub use alert::Alert;
pub use sample::Sample;
pub use tick::PriceUpdate;
