pub mod to_value;

pub use to_value::ToValue;
