pub mod input;
pub mod keys;

pub use input::{EnigoDriver, InputDriver, MouseButton, ScrollDirection};
