pub mod device;
pub mod dtype;
pub mod layout;
pub mod shape;

pub use device::Device;
pub use dtype::DType;
pub use layout::Layout;
pub use shape::Shape;
