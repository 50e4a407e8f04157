//! Element types

pub mod value;
pub mod window;

pub use value::{StructuralKey, Value};
pub use window::{BoundedWindow, KeyedWorkItem, PaneInfo, WindowedValue};
