pub mod locate;
pub mod matching;
pub mod template;

pub use locate::{LocateMethod, Locator, LocatorResult, SearchArea};
