#[cfg(feature = "parking_lot")]
pub use parking_lot::Mutex;
#[cfg(not(feature = "parking_lot"))]
mod native;

#[cfg(not(feature = "parking_lot"))]
pub use native::Mutex;
